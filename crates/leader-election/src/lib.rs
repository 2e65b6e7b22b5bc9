//! Leader election over Kubernetes objects.
//!
//! Several replicas of a service run a [`LeaderElector`] against the same
//! backing object; at most one of them is told it leads at any time. The
//! arbitration itself is delegated to the API server's atomic create and
//! `resourceVersion`-conditional replace.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use leader_election::{LeaderElector, LeaderElectorOptions, LeaseLock};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let lock = LeaseLock::new(client, "cto", "agent-controller", "controller-0");
//!
//! let elector = LeaderElector::new(LeaderElectorOptions::new(Arc::new(lock)))?;
//! let cancel = CancellationToken::new();
//! elector.run(cancel.child_token()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`LeaderElectionRecord`] is the value stored in the backing object
//! - [`ResourceLock`] reads and writes it; [`LeaseLock`], [`ConfigMapLock`]
//!   and [`EndpointsLock`] are the Kubernetes implementations
//! - [`LeaderElector`] runs the acquire/renew loop and notifies
//!   [`LeadershipObserver`]s
//! - [`LeaderElectorOptions`] holds timings, the clock, and the jitter source

pub mod clock;
pub mod elector;
pub mod error;
pub mod lock;
pub mod options;
pub mod record;

pub use clock::{Clock, FixedJitter, JitterSource, SeededJitter, SystemClock, ThreadRngJitter};
pub use elector::{LeaderElector, LeadershipObserver};
pub use error::{ConfigError, ElectionError, HealthError, LockError};
pub use lock::{
    ConfigMapLock, EndpointsLock, KubeLock, LeaseLock, LockObject, ResourceLock, LEADER_ANNOTATION,
};
pub use options::LeaderElectorOptions;
pub use record::LeaderElectionRecord;
