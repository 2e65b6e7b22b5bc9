//! # Resource Locks
//!
//! A resource lock maps a [`LeaderElectionRecord`] onto a single object stored
//! in the Kubernetes API server. Mutual exclusion comes entirely from the API
//! server: `create` fails when the object already exists, and `update` replaces
//! the object only if its `resourceVersion` still matches the one last read.
//!
//! Three encodings are provided:
//!
//! - **`LeaseLock`**: dedicated fields of a `coordination.k8s.io/v1` Lease
//! - **`ConfigMapLock`**: JSON in an annotation on a ConfigMap
//! - **`EndpointsLock`**: JSON in an annotation on an Endpoints object
//!
//! All of them share [`KubeLock`], which owns the cached object used for the
//! conditional replace; only the encode/decode hook differs.

pub mod annotation;
pub mod lease;
pub mod object;

pub use annotation::{ConfigMapLock, EndpointsLock, LEADER_ANNOTATION};
pub use lease::LeaseLock;
pub use object::{KubeLock, LockObject};

use async_trait::async_trait;

use crate::error::LockError;
use crate::record::LeaderElectionRecord;

/// Storage for the leader election record.
#[async_trait]
pub trait ResourceLock: Send + Sync {
    /// This candidate's name, fixed for the lifetime of the lock.
    fn identity(&self) -> &str;

    /// Fetch and decode the backing object.
    ///
    /// Fails with [`LockError::NotFound`] when the object does not exist and
    /// [`LockError::RequestFailed`] for any other API error.
    async fn get(&self) -> Result<LeaderElectionRecord, LockError>;

    /// Create the backing object holding `record`.
    ///
    /// Returns `false` when the API server rejects the create for any reason.
    async fn create(&self, record: &LeaderElectionRecord) -> bool;

    /// Replace the cached object with one holding `record`, conditional on the
    /// stored object still being at the cached version.
    ///
    /// Fails with [`LockError::NotInitialized`] if nothing has been fetched or
    /// created yet. Returns `false` when the replace is rejected.
    async fn update(&self, record: &LeaderElectionRecord) -> Result<bool, LockError>;

    /// `namespace/name` of the backing object, for logging.
    fn describe(&self) -> String;
}
