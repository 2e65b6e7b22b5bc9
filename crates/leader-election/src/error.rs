//! Error types for leader election.

use thiserror::Error;

/// Errors raised by a [`ResourceLock`](crate::ResourceLock).
///
/// Rejected creates and replaces are not errors: `create` and `update` report
/// them as `false` so the elector can simply retry.
#[derive(Error, Debug)]
pub enum LockError {
    /// The backing object does not exist yet
    #[error("Lock object {object} not found")]
    NotFound { object: String },

    /// Any other failure talking to the API server
    #[error("Kubernetes API request failed: {0}")]
    RequestFailed(#[from] kube::Error),

    /// `update` was called before any successful `get` or `create`
    #[error("Lock {object} is not initialized, call get or create first")]
    NotInitialized { object: String },

    /// The record could not be serialized into the backing object
    #[error("Failed to encode leader election record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LockError {
    /// Whether the backing object is simply absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Invalid or out-of-phase elector configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Leader election options require a resource lock")]
    MissingLock,

    #[error("Leader election options are sealed and can no longer be modified")]
    Sealed,

    #[error("{field} must be greater than zero")]
    InvalidDuration { field: &'static str },

    #[error("lease_duration must be at least one second, got {millis}ms")]
    LeaseTooShort { millis: u128 },
}

/// Errors that end [`LeaderElector::run`](crate::LeaderElector::run) or prevent
/// an elector from being built.
#[derive(Error, Debug)]
pub enum ElectionError {
    #[error("Invalid leader election configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Resource lock error: {0}")]
    Lock(#[from] LockError),
}

/// Result of [`LeaderElector::check_health`](crate::LeaderElector::check_health).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("Leader {identity} failed to renew its lease, expired {expired_for_secs}s ago")]
    LeaseExpired {
        identity: String,
        expired_for_secs: i64,
    },
}
