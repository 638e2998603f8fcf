// crates/decipipe-model/src/ids.rs
// ============================================================================
// Module: Opaque Identifiers
// Description: Newtype wrappers for the opaque string identifiers that flow
//              end-to-end through the pipeline.
// Purpose: Prevent accidental mixing of run/step/event/pipeline identifiers
//          at call sites while keeping the wire representation a plain
//          string.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Run, step, event, and pipeline identifiers are opaque strings on the
//! wire. These newtypes exist so call sites cannot accidentally pass a
//! `StepId` where a `RunId` is expected; they carry no validation beyond
//! non-emptiness, since identifiers are caller-supplied opaque tokens.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw string as this identifier, unvalidated beyond
            /// this type's invariant.
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Returns the identifier's string representation.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the owned string.
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(RunId, "Identity of one pipeline execution.");
opaque_id!(StepId, "Identity of one node within a run.");
opaque_id!(EventId, "Identity of one decision about one item at one step.");
opaque_id!(PipelineId, "Identity of the pipeline definition a run executes.");
opaque_id!(ItemId, "Identity of an item, stable across steps within a run.");
