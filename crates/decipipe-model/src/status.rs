// crates/decipipe-model/src/status.rs
// ============================================================================
// Module: Status Enumerations
// Description: Closed enumerations for run status, step type, and decision
//              outcome.
// Purpose: Give the wire and the analytical store a single stable set of
//          string labels for these three dimensions.
// Dependencies: serde
// ============================================================================

use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// A stored label did not match any known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown label `{0}`")]
pub struct UnknownLabel(String);

/// Lifecycle status of a [`crate::Run`].
///
/// # Invariants
/// - `Failed` is the only status paired with a non-null `error`.
/// - `Completed`, `Failed`, and `Cancelled` are terminal; once reached they
///   are never mutated by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not yet running.
    Pending,
    /// Actively executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Terminated before completion without an error.
    Cancelled,
}

impl RunStatus {
    /// Returns `true` for any of the three terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Stable lowercase label, used by the "bad filter" query predicate.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RunStatus {
    type Err = UnknownLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// The kind of pipeline node a [`crate::Step`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Keeps or drops items against a predicate.
    Filter,
    /// Reorders items, typically by a score.
    Rank,
    /// Calls a language model to transform or judge items.
    Llm,
    /// Maps items to a different shape without dropping any.
    Transform,
    /// Attaches a numeric score to each item.
    Score,
}

impl StepType {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Rank => "rank",
            Self::Llm => "llm",
            Self::Transform => "transform",
            Self::Score => "score",
        }
    }
}

impl FromStr for StepType {
    type Err = UnknownLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "filter" => Ok(Self::Filter),
            "rank" => Ok(Self::Rank),
            "llm" => Ok(Self::Llm),
            "transform" => Ok(Self::Transform),
            "score" => Ok(Self::Score),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// The disposition of one item at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The item survived the step unchanged in identity.
    Kept,
    /// The item did not appear in the step's output.
    Eliminated,
    /// The item survived and was assigned a numeric score.
    Scored,
}

impl Outcome {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kept => "kept",
            Self::Eliminated => "eliminated",
            Self::Scored => "scored",
        }
    }
}

impl FromStr for Outcome {
    type Err = UnknownLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "kept" => Ok(Self::Kept),
            "eliminated" => Ok(Self::Eliminated),
            "scored" => Ok(Self::Scored),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_its_label() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(RunStatus::from_str(status.as_str()).map_err(|_| ()), Ok(status));
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(RunStatus::from_str("bogus").is_err());
        assert!(StepType::from_str("bogus").is_err());
        assert!(Outcome::from_str("bogus").is_err());
    }
}
