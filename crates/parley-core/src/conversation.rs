//! Conversation identity.
//!
//! A conversation id is derived from the sender plus a coarse time bucket, so
//! all messages from one sender inside one bucket share a memory and a new
//! bucket starts a fresh conversation. The bucket width is configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BucketPolicy {
    /// One conversation per sender per UTC calendar day.
    #[default]
    Daily,
    /// One conversation per sender per UTC hour.
    Hourly,
    /// A single conversation per sender that never rotates.
    None,
}

impl BucketPolicy {
    /// Bucket label for `at`, or `None` when the policy does not rotate.
    pub fn bucket(&self, at: DateTime<Utc>) -> Option<String> {
        match self {
            BucketPolicy::Daily => Some(at.format("%Y-%m-%d").to_string()),
            BucketPolicy::Hourly => Some(at.format("%Y-%m-%dT%H").to_string()),
            BucketPolicy::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn for_sender(sender: &str, at: DateTime<Utc>, policy: BucketPolicy) -> Self {
        let sender = sender.trim();
        match policy.bucket(at) {
            Some(bucket) => Self(format!("{}_{}", sender, bucket)),
            None => Self(sender.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    #[test]
    fn test_daily_bucket_matches_sender_and_date() {
        let id = ConversationId::for_sender("+15551234567", at(2024, 5, 1, 9), BucketPolicy::Daily);
        assert_eq!(id.as_str(), "+15551234567_2024-05-01");
    }

    #[test]
    fn test_same_sender_same_bucket_is_stable() {
        let morning = ConversationId::for_sender("+1555", at(2024, 5, 1, 1), BucketPolicy::Daily);
        let evening = ConversationId::for_sender("+1555", at(2024, 5, 1, 23), BucketPolicy::Daily);
        assert_eq!(morning, evening);

        let next_day = ConversationId::for_sender("+1555", at(2024, 5, 2, 0), BucketPolicy::Daily);
        assert_ne!(morning, next_day);
    }

    #[test]
    fn test_hourly_and_unbucketed_policies() {
        let hourly = ConversationId::for_sender("+1555", at(2024, 5, 1, 9), BucketPolicy::Hourly);
        assert_eq!(hourly.as_str(), "+1555_2024-05-01T09");

        let first = ConversationId::for_sender(" +1555 ", at(2024, 5, 1, 9), BucketPolicy::None);
        let later = ConversationId::for_sender("+1555", at(2025, 1, 1, 0), BucketPolicy::None);
        assert_eq!(first.as_str(), "+1555");
        assert_eq!(first, later);
    }

    #[test]
    fn test_bucket_policy_deserializes_lowercase() {
        let policy: BucketPolicy = serde_yaml::from_str("hourly").unwrap();
        assert_eq!(policy, BucketPolicy::Hourly);
        let policy: BucketPolicy = serde_yaml::from_str("none").unwrap();
        assert_eq!(policy, BucketPolicy::None);
    }
}
