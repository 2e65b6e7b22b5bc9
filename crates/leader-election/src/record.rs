//! The leader election record shared by every lock implementation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lease duration assumed for records written by clients that never set one.
pub const DEFAULT_LEASE_DURATION_SECONDS: i32 = 15;

/// Who holds leadership, since when, and for how long.
///
/// The record is always written whole: a write supplies a complete new value,
/// never a partial mutation of the stored one. Annotation based locks store it
/// as JSON using the Kubernetes field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionRecord {
    /// Current holder; `None` or empty means the lease is unheld
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_identity: Option<String>,

    /// Validity window of a renewal
    #[serde(default)]
    pub lease_duration_seconds: i32,

    /// Set only when the holder changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_time: Option<DateTime<Utc>>,

    /// Refreshed on every successful renewal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_time: Option<DateTime<Utc>>,

    /// Number of times the holder changed to a different identity
    #[serde(default)]
    pub leader_transitions: i32,
}

impl LeaderElectionRecord {
    /// A record naming `holder` as freshly acquired at `now`.
    #[must_use]
    pub fn acquired(
        holder: &str,
        now: DateTime<Utc>,
        lease_duration_seconds: i32,
        leader_transitions: i32,
    ) -> Self {
        Self {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds,
            acquire_time: Some(now),
            renew_time: Some(now),
            leader_transitions,
        }
    }

    /// Holder identity, treating an empty string as unheld.
    #[must_use]
    pub fn holder(&self) -> Option<&str> {
        self.holder_identity.as_deref().filter(|h| !h.is_empty())
    }

    /// Whether `identity` is the recorded holder.
    #[must_use]
    pub fn is_held_by(&self, identity: &str) -> bool {
        self.holder() == Some(identity)
    }

    /// A record missing its holder or either timestamp was abandoned or
    /// corrupted and cannot be reasoned about.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.holder().is_some() && self.acquire_time.is_some() && self.renew_time.is_some()
    }

    /// Instant after which the lease is no longer valid.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.renew_time
            .map(|renewed| renewed + Duration::seconds(i64::from(self.lease_duration_seconds)))
    }

    /// A lease without a renewal time counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expiry| expiry <= now)
    }
}
