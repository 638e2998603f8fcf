// crates/decipipe-model/src/timestamp.rs
// ============================================================================
// Module: Timestamp
// Description: UTC, millisecond-precision timestamp accepted from the wire
//              as either an ISO-8601 string or epoch milliseconds.
// Purpose: Give every service a single timestamp type that round-trips
//          through JSON regardless of which shape the sender used.
// Dependencies: time, serde
// ============================================================================

//! ## Overview
//! Dates are accepted both as ISO-8601 strings and as epoch-millisecond
//! timestamps and are always emitted as ISO-8601. [`Timestamp`] hides that
//! asymmetry behind one type.

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as DeError;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A UTC timestamp truncated to millisecond precision.
///
/// # Invariants
/// - Always UTC.
/// - Sub-millisecond precision is discarded on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Builds a timestamp from epoch milliseconds.
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Self {
        let nanos = i128::from(millis) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_or_else(|_| Self(OffsetDateTime::UNIX_EPOCH), Self)
    }

    /// Returns the timestamp as epoch milliseconds.
    #[must_use]
    pub fn as_unix_millis(&self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Returns the `(year, month, day)` of this timestamp, used to build
    /// date-partitioned blob keys.
    #[must_use]
    pub fn date_parts(&self) -> (i32, u8, u8) {
        let date = self.0.date();
        (date.year(), date.month() as u8, date.day())
    }

    /// Returns the `YYYY-MM` partition label used by the analytical store.
    #[must_use]
    pub fn partition_month(&self) -> String {
        let (year, month, _) = self.date_parts();
        format!("{year:04}-{month:02}")
    }

    /// Returns the underlying [`OffsetDateTime`].
    #[must_use]
    pub const fn inner(&self) -> OffsetDateTime {
        self.0
    }

    /// Returns the current wall-clock time, truncated to millisecond
    /// precision. The only place in this crate that reads the system
    /// clock; every other constructor takes a caller-supplied timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self::from_unix_millis((OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.format(&Rfc3339).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = self
            .0
            .format(&Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

/// Wire shape accepted for a timestamp: either an RFC 3339 string or an
/// integer count of epoch milliseconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampWire {
    /// ISO-8601 / RFC 3339 string form.
    Text(String),
    /// Epoch milliseconds.
    Millis(i64),
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match TimestampWire::deserialize(deserializer)? {
            TimestampWire::Millis(millis) => Ok(Self::from_unix_millis(millis)),
            TimestampWire::Text(text) => OffsetDateTime::parse(&text, &Rfc3339)
                .map(Self)
                .map_err(|err| DeError::custom(format!("invalid timestamp `{text}`: {err}"))),
        }
    }
}
