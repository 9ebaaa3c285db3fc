//! Cache entry codec.
//!
//! Entries are stored as JSON `{"value": ..., "storedAt": ms, "expiresAt": ms}`.
//! Anything that does not decode under that schema is reported as
//! [`Decoded::Corrupt`] so the caller can delete it instead of failing.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use feedcache_core::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Shortest TTL an entry can carry; keeps `expires_at > stored_at`.
const MIN_TTL: Duration = Duration::from_millis(1);

/// A cached value with its write time and absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub value: T,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub stored_at: Timestamp,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: Timestamp,
}

impl<T> CacheEntry<T> {
    /// Stamp `value` at `now` with the given TTL.
    pub fn new(value: T, ttl: Duration, now: Timestamp) -> Self {
        Self {
            value,
            stored_at: now,
            expires_at: expiry(now, ttl),
        }
    }

    /// An entry is valid strictly before its expiry instant.
    pub fn is_valid(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: Timestamp) -> Duration {
        self.expires_at
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

fn expiry(now: Timestamp, ttl: Duration) -> Timestamp {
    // Stored timestamps are millisecond precision.
    let ttl = ttl.max(MIN_TTL);
    let delta = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    let expires_at = now
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    // Round-trip through millis so the in-memory entry equals the decoded one.
    DateTime::from_timestamp_millis(expires_at.timestamp_millis()).unwrap_or(expires_at)
}

/// Outcome of decoding a stored string.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Entry(CacheEntry<T>),
    /// Unparseable or schema-violating; the key should be deleted.
    Corrupt(String),
}

/// Serialize `value` as a new entry written at `now`.
pub fn encode_entry<T: Serialize>(
    value: &T,
    ttl: Duration,
    now: Timestamp,
) -> Result<String, serde_json::Error> {
    let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    serde_json::to_string(&CacheEntry::new(value, ttl, now))
}

/// Parse a stored string back into an entry.
pub fn decode_entry<T: DeserializeOwned>(serialized: &str) -> Decoded<T> {
    match serde_json::from_str::<CacheEntry<T>>(serialized) {
        Ok(entry) if entry.expires_at > entry.stored_at => Decoded::Entry(entry),
        Ok(_) => Decoded::Corrupt("expiresAt is not after storedAt".to_string()),
        Err(e) => Decoded::Corrupt(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_encode_shape() {
        let json = encode_entry(&vec![1, 2, 3], Duration::from_secs(60), now()).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(raw["value"], serde_json::json!([1, 2, 3]));
        assert_eq!(raw["storedAt"], serde_json::json!(1_700_000_000_000i64));
        assert_eq!(raw["expiresAt"], serde_json::json!(1_700_000_060_000i64));
    }

    #[test]
    fn test_validity_boundary() {
        let entry = CacheEntry::new("x", Duration::from_secs(10), now());
        assert!(entry.is_valid(now()));
        assert!(entry.is_valid(now() + TimeDelta::milliseconds(9_999)));
        assert!(!entry.is_valid(now() + TimeDelta::seconds(10)));
        assert_eq!(entry.remaining(now() + TimeDelta::seconds(4)), Duration::from_secs(6));
        assert_eq!(entry.remaining(now() + TimeDelta::seconds(40)), Duration::ZERO);
    }

    #[test]
    fn test_zero_ttl_still_orders_timestamps() {
        let entry = CacheEntry::new(1u8, Duration::ZERO, now());
        assert!(entry.expires_at > entry.stored_at);
    }

    #[test]
    fn test_decode_valid_entry() {
        let json = encode_entry(&"hello".to_string(), Duration::from_secs(5), now()).unwrap();
        match decode_entry::<String>(&json) {
            Decoded::Entry(entry) => {
                assert_eq!(entry.value, "hello");
                assert_eq!(entry.stored_at, now());
            }
            Decoded::Corrupt(reason) => panic!("unexpected corrupt entry: {reason}"),
        }
    }

    #[test]
    fn test_decode_garbage_is_corrupt() {
        assert!(matches!(decode_entry::<String>("not json"), Decoded::Corrupt(_)));
        assert!(matches!(decode_entry::<String>("{\"value\":\"x\"}"), Decoded::Corrupt(_)));
    }

    #[test]
    fn test_decode_wrong_value_type_is_corrupt() {
        let json = encode_entry(&42u32, Duration::from_secs(5), now()).unwrap();
        assert!(matches!(decode_entry::<Vec<String>>(&json), Decoded::Corrupt(_)));
    }

    #[test]
    fn test_decode_inverted_timestamps_is_corrupt() {
        let json = r#"{"value":1,"storedAt":2000,"expiresAt":1000}"#;
        assert!(matches!(decode_entry::<u32>(json), Decoded::Corrupt(_)));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every encoded entry decodes, expires exactly ttl after it was stored,
        /// and is valid until then.
        #[test]
        fn prop_ttl_window(
            start_ms in 0i64..4_000_000_000_000,
            ttl_ms in 1u64..86_400_000,
            payload in ".*",
        ) {
            let now = DateTime::from_timestamp_millis(start_ms).unwrap();
            let json = encode_entry(&payload, Duration::from_millis(ttl_ms), now).unwrap();
            let entry = match decode_entry::<String>(&json) {
                Decoded::Entry(entry) => entry,
                Decoded::Corrupt(reason) => return Err(TestCaseError::fail(reason)),
            };

            prop_assert_eq!(&entry.value, &payload);
            let expected = now + TimeDelta::milliseconds(ttl_ms as i64);
            prop_assert_eq!(entry.expires_at, expected);
            prop_assert!(entry.is_valid(expected - TimeDelta::milliseconds(1)));
            prop_assert!(!entry.is_valid(expected));
        }
    }
}
