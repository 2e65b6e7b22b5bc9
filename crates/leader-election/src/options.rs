//! Configuration for a [`LeaderElector`](crate::LeaderElector).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::clock::{Clock, JitterSource, SystemClock, ThreadRngJitter};
use crate::error::ConfigError;
use crate::lock::ResourceLock;

/// Default validity window of a lease
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);
/// Default cadence at which a leader renews
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);
/// Default base delay between failed acquisition attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);
/// Shortest lease a record can express
pub const MIN_LEASE_DURATION: Duration = Duration::from_secs(1);

/// Settings for one election.
///
/// Setters fail with [`ConfigError::Sealed`] once the options have been
/// sealed, which happens when they are handed to a [`LeaderElector`](crate::LeaderElector).
/// Clones keep the sealed flag.
#[derive(Clone)]
pub struct LeaderElectorOptions {
    lock: Option<Arc<dyn ResourceLock>>,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
    release_on_cancel: bool,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
    sealed: bool,
}

impl LeaderElectorOptions {
    /// Options with default timings for the given lock.
    #[must_use]
    pub fn new(lock: Arc<dyn ResourceLock>) -> Self {
        Self {
            lock: Some(lock),
            ..Self::default()
        }
    }

    pub fn set_lock(&mut self, lock: Arc<dyn ResourceLock>) -> Result<(), ConfigError> {
        self.ensure_unsealed()?;
        self.lock = Some(lock);
        Ok(())
    }

    pub fn set_lease_duration(&mut self, duration: Duration) -> Result<(), ConfigError> {
        self.ensure_unsealed()?;
        self.lease_duration = duration;
        Ok(())
    }

    pub fn set_renew_deadline(&mut self, deadline: Duration) -> Result<(), ConfigError> {
        self.ensure_unsealed()?;
        self.renew_deadline = deadline;
        Ok(())
    }

    pub fn set_retry_period(&mut self, period: Duration) -> Result<(), ConfigError> {
        self.ensure_unsealed()?;
        self.retry_period = period;
        Ok(())
    }

    /// Give the lease up explicitly when the election is cancelled while leading.
    pub fn set_release_on_cancel(&mut self, release: bool) -> Result<(), ConfigError> {
        self.ensure_unsealed()?;
        self.release_on_cancel = release;
        Ok(())
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) -> Result<(), ConfigError> {
        self.ensure_unsealed()?;
        self.clock = clock;
        Ok(())
    }

    pub fn set_jitter(&mut self, jitter: Arc<dyn JitterSource>) -> Result<(), ConfigError> {
        self.ensure_unsealed()?;
        self.jitter = jitter;
        Ok(())
    }

    #[must_use]
    pub fn lock(&self) -> Option<&Arc<dyn ResourceLock>> {
        self.lock.as_ref()
    }

    #[must_use]
    pub const fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Lease duration as written into the record, rounded up to whole seconds.
    #[must_use]
    pub fn lease_duration_seconds(&self) -> i32 {
        let partial = u64::from(self.lease_duration.subsec_nanos() > 0);
        let secs = self.lease_duration.as_secs().saturating_add(partial);
        i32::try_from(secs).unwrap_or(i32::MAX)
    }

    #[must_use]
    pub const fn renew_deadline(&self) -> Duration {
        self.renew_deadline
    }

    #[must_use]
    pub const fn retry_period(&self) -> Duration {
        self.retry_period
    }

    #[must_use]
    pub const fn release_on_cancel(&self) -> bool {
        self.release_on_cancel
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    #[must_use]
    pub fn jitter(&self) -> &dyn JitterSource {
        self.jitter.as_ref()
    }

    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Freeze the options; every later setter call fails.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Check the options can drive an election.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.is_none() {
            return Err(ConfigError::MissingLock);
        }

        for (field, value) in [
            ("lease_duration", self.lease_duration),
            ("renew_deadline", self.renew_deadline),
            ("retry_period", self.retry_period),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidDuration { field });
            }
        }

        // Records carry whole seconds; a zero-second lease reads as expired
        if self.lease_duration < MIN_LEASE_DURATION {
            return Err(ConfigError::LeaseTooShort {
                millis: self.lease_duration.as_millis(),
            });
        }

        if self.renew_deadline >= self.lease_duration {
            warn!(
                lease_duration = ?self.lease_duration,
                renew_deadline = ?self.renew_deadline,
                "Renew deadline is not shorter than the lease duration, the lease may expire between renewals"
            );
        }

        Ok(())
    }

    const fn ensure_unsealed(&self) -> Result<(), ConfigError> {
        if self.sealed {
            Err(ConfigError::Sealed)
        } else {
            Ok(())
        }
    }
}

impl Default for LeaderElectorOptions {
    fn default() -> Self {
        Self {
            lock: None,
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            release_on_cancel: false,
            clock: Arc::new(SystemClock),
            jitter: Arc::new(ThreadRngJitter),
            sealed: false,
        }
    }
}

impl fmt::Debug for LeaderElectorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderElectorOptions")
            .field("lock", &self.lock.as_ref().map(|lock| lock.describe()))
            .field("lease_duration", &self.lease_duration)
            .field("renew_deadline", &self.renew_deadline)
            .field("retry_period", &self.retry_period)
            .field("release_on_cancel", &self.release_on_cancel)
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockError;
    use crate::record::LeaderElectionRecord;
    use async_trait::async_trait;

    struct NoopLock;

    #[async_trait]
    impl ResourceLock for NoopLock {
        fn identity(&self) -> &str {
            "noop"
        }

        async fn get(&self) -> Result<LeaderElectionRecord, LockError> {
            Err(LockError::NotFound {
                object: self.describe(),
            })
        }

        async fn create(&self, _record: &LeaderElectionRecord) -> bool {
            false
        }

        async fn update(&self, _record: &LeaderElectionRecord) -> Result<bool, LockError> {
            Ok(false)
        }

        fn describe(&self) -> String {
            "test/noop".to_string()
        }
    }

    #[test]
    fn test_defaults() {
        let options = LeaderElectorOptions::default();
        assert_eq!(options.lease_duration(), Duration::from_secs(15));
        assert_eq!(options.renew_deadline(), Duration::from_secs(10));
        assert_eq!(options.retry_period(), Duration::from_secs(2));
        assert_eq!(options.lease_duration_seconds(), 15);
        assert!(!options.release_on_cancel());
        assert!(!options.is_sealed());
    }

    #[test]
    fn test_validate_requires_lock() {
        let options = LeaderElectorOptions::default();
        assert_eq!(options.validate(), Err(ConfigError::MissingLock));

        let options = LeaderElectorOptions::new(Arc::new(NoopLock));
        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let mut options = LeaderElectorOptions::new(Arc::new(NoopLock));
        options.set_retry_period(Duration::ZERO).unwrap();
        assert_eq!(
            options.validate(),
            Err(ConfigError::InvalidDuration {
                field: "retry_period"
            })
        );
    }

    #[test]
    fn test_validate_rejects_sub_second_lease() {
        let mut options = LeaderElectorOptions::new(Arc::new(NoopLock));
        options.set_lease_duration(Duration::from_millis(900)).unwrap();
        options.set_renew_deadline(Duration::from_millis(500)).unwrap();

        assert_eq!(
            options.validate(),
            Err(ConfigError::LeaseTooShort { millis: 900 })
        );
    }

    #[test]
    fn test_fractional_lease_rounds_up() {
        let mut options = LeaderElectorOptions::new(Arc::new(NoopLock));
        options.set_lease_duration(Duration::from_millis(1500)).unwrap();
        assert_eq!(options.validate(), Ok(()));
        assert_eq!(options.lease_duration_seconds(), 2);

        options.set_lease_duration(Duration::from_secs(1)).unwrap();
        assert_eq!(options.lease_duration_seconds(), 1);
    }

    #[test]
    fn test_sealed_options_reject_mutation() {
        let mut options = LeaderElectorOptions::new(Arc::new(NoopLock));
        options.set_lease_duration(Duration::from_secs(30)).unwrap();
        options.seal();

        assert_eq!(
            options.set_lease_duration(Duration::from_secs(60)),
            Err(ConfigError::Sealed)
        );
        assert_eq!(options.set_release_on_cancel(true), Err(ConfigError::Sealed));
        assert_eq!(options.lease_duration(), Duration::from_secs(30));

        let mut copy = options.clone();
        assert_eq!(copy.set_lock(Arc::new(NoopLock)), Err(ConfigError::Sealed));
    }
}
