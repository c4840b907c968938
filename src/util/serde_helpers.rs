//! Serialization helpers for common types.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde serialization module for Duration as milliseconds.
///
/// Millisecond, not second, granularity: spec-level shutdown deadlines are
/// specified in milliseconds (e.g. a 0ms or 250ms deadline), and a
/// seconds-only round-trip would silently truncate those to zero.
pub mod duration_serde {
    use super::*;

    /// Serializes Duration as milliseconds (u64).
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    /// Deserializes Duration from milliseconds (u64).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
