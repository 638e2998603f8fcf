// crates/decipipe-config/src/env.rs
// ============================================================================
// Module: Environment Variable Helpers
// Description: Strict parsing helpers shared by every config loader.
// Purpose: Fail closed on a malformed value instead of silently falling
//          back to a default.
// ============================================================================

use std::env::VarError;

/// Errors loading service configuration from the environment.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable `{0}`")]
    Missing(String),
    /// An environment variable was set but could not be parsed.
    #[error("environment variable `{key}` has invalid value `{value}`: {reason}")]
    Invalid {
        /// The offending variable's name.
        key: String,
        /// The raw value that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

pub(crate) fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|err| match err {
        VarError::NotPresent => ConfigError::Missing(key.to_string()),
        VarError::NotUnicode(_) => ConfigError::Invalid {
            key: key.to_string(),
            value: "<non-utf8>".to_string(),
            reason: "value is not valid UTF-8".to_string(),
        },
    })
}

pub(crate) fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub(crate) fn env_u16(key: &str) -> Result<Option<u16>, ConfigError> {
    parse_optional(key)
}

pub(crate) fn env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    parse_optional(key)
}

pub(crate) fn env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    parse_optional(key)
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = optional(key) else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|err: T::Err| ConfigError::Invalid { key: key.to_string(), value, reason: err.to_string() })
}

#[cfg(test)]
mod tests {
    #![allow(
        unsafe_code,
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Tests serialize env var mutation under a lock and use expect/unwrap for clarity."
    )]

    use std::sync::Mutex;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_required_var_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::remove_var("DECIPIPE_TEST_MISSING") };
        assert_eq!(required("DECIPIPE_TEST_MISSING"), Err(ConfigError::Missing("DECIPIPE_TEST_MISSING".to_string())));
    }

    #[test]
    fn malformed_numeric_var_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::set_var("DECIPIPE_TEST_PORT", "not-a-number") };
        let result = env_u16("DECIPIPE_TEST_PORT");
        assert!(result.is_err());
        // SAFETY: tests run serialized under `ENV_LOCK`.
        unsafe { std::env::remove_var("DECIPIPE_TEST_PORT") };
    }
}
