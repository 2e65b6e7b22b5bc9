//! # Leader Elector
//!
//! Drives a [`ResourceLock`] to elect a single leader among candidates.
//!
//! The elector alternates between two phases on a single task:
//!
//! - **Acquiring**: after a jittered wait, read the record and either create
//!   it, take over an expired lease, or back off because someone else holds a
//!   valid one.
//! - **Leading**: every renew deadline, re-read the record and push its renew
//!   time forward. The first failed renewal ends leadership and the elector
//!   goes back to acquiring.
//!
//! Leadership changes are delivered to [`LeadershipObserver`]s, which are
//! awaited one after another before the loop continues.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ElectionError, HealthError, LockError};
use crate::lock::ResourceLock;
use crate::options::LeaderElectorOptions;
use crate::record::LeaderElectionRecord;

/// Multiplier applied to the retry period before adding random spread.
const JITTER_FACTOR: f64 = 1.2;

/// Receives leadership changes from a [`LeaderElector`].
///
/// Callbacks run on the election task and block it until they return, so
/// anything slow belongs on a separate task.
#[async_trait]
pub trait LeadershipObserver: Send + Sync {
    /// The believed leader changed, including changes between two other candidates.
    async fn on_new_leader(&self, _identity: &str) {}

    /// This candidate became leader.
    async fn on_started_leading(&self) {}

    /// This candidate is no longer leader.
    async fn on_stopped_leading(&self) {}
}

#[derive(Debug, Default)]
struct ObservedState {
    record: Option<LeaderElectionRecord>,
    reported_leader: Option<String>,
}

enum RenewOutcome {
    Lost,
    Cancelled,
}

/// Leader election state machine over a [`ResourceLock`].
pub struct LeaderElector {
    options: LeaderElectorOptions,
    lock: Arc<dyn ResourceLock>,
    state: RwLock<ObservedState>,
    observers: RwLock<Vec<Arc<dyn LeadershipObserver>>>,
    leader_tx: watch::Sender<Option<String>>,
}

impl LeaderElector {
    /// Validate and seal `options` and build an elector from them.
    pub fn new(mut options: LeaderElectorOptions) -> Result<Self, ElectionError> {
        options.validate()?;
        let lock = options.lock().cloned().ok_or(ConfigError::MissingLock)?;
        options.seal();

        let (leader_tx, _) = watch::channel(None);
        Ok(Self {
            options,
            lock,
            state: RwLock::new(ObservedState::default()),
            observers: RwLock::new(Vec::new()),
            leader_tx,
        })
    }

    /// Register an observer for leadership changes.
    pub fn subscribe(&self, observer: Arc<dyn LeadershipObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Channel mirroring every leader-changed notification.
    #[must_use]
    pub fn watch_leader(&self) -> watch::Receiver<Option<String>> {
        self.leader_tx.subscribe()
    }

    #[must_use]
    pub const fn options(&self) -> &LeaderElectorOptions {
        &self.options
    }

    /// Whether the last observed record names this candidate.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        let identity = self.lock.identity();
        self.state()
            .record
            .as_ref()
            .is_some_and(|record| record.is_held_by(identity))
    }

    /// Holder of the last observed record.
    #[must_use]
    pub fn leader_identity(&self) -> Option<String> {
        self.state()
            .record
            .as_ref()
            .and_then(LeaderElectionRecord::holder)
            .map(str::to_string)
    }

    /// Copy of the last observed record.
    #[must_use]
    pub fn observed_record(&self) -> Option<LeaderElectionRecord> {
        self.state().record.clone()
    }

    /// Report a leader that stopped renewing.
    ///
    /// Fails only when this candidate believes it leads and its observed lease
    /// expired more than `tolerance` ago, which means the run loop is stuck.
    pub fn check_health(&self, tolerance: Duration) -> Result<(), HealthError> {
        let identity = self.lock.identity();
        let Some(expiry) = self
            .state()
            .record
            .as_ref()
            .filter(|record| record.is_held_by(identity))
            .and_then(LeaderElectionRecord::expires_at)
        else {
            return Ok(());
        };

        let overdue = self.options.clock().now() - expiry;
        let tolerance = chrono::Duration::from_std(tolerance).unwrap_or(chrono::TimeDelta::MAX);
        if overdue > tolerance {
            return Err(HealthError::LeaseExpired {
                identity: identity.to_string(),
                expired_for_secs: overdue.num_seconds(),
            });
        }
        Ok(())
    }

    /// Take part in the election until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation. If this candidate is leading at that
    /// point, `on_stopped_leading` is delivered before returning.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ElectionError> {
        info!(
            lock = %self.lock.describe(),
            identity = %self.lock.identity(),
            "Starting leader election"
        );

        let result = self.run_until_cancelled(&cancel).await;

        // TODO: if cancellation lands right after a failed renewal the observed
        // record may still name us, so stopped-leading fires a second time.
        if self.is_leader() {
            if self.options.release_on_cancel() {
                self.release().await;
            }
            self.state_mut().record = None;
            self.notify_stopped_leading().await;
        }

        {
            let mut state = self.state_mut();
            state.record = None;
            state.reported_leader = None;
        }
        self.leader_tx.send_replace(None);

        info!(
            lock = %self.lock.describe(),
            identity = %self.lock.identity(),
            "Leader election stopped"
        );
        result
    }

    async fn run_until_cancelled(&self, cancel: &CancellationToken) -> Result<(), ElectionError> {
        while !cancel.is_cancelled() {
            if !self.acquire(cancel).await? {
                break;
            }

            self.notify_started_leading().await;

            match self.renew_until_lost(cancel).await? {
                RenewOutcome::Lost => self.notify_stopped_leading().await,
                RenewOutcome::Cancelled => break,
            }
        }
        Ok(())
    }

    /// Retry acquisition until it succeeds. Returns `false` if cancelled first.
    async fn acquire(&self, cancel: &CancellationToken) -> Result<bool, ElectionError> {
        loop {
            if !sleep_or_cancel(self.jittered_retry_period(), cancel).await {
                return Ok(false);
            }

            let acquired = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(false),
                result = self.try_acquire() => result?,
            };

            self.report_leader_change().await;

            if acquired {
                info!(
                    lock = %self.lock.describe(),
                    identity = %self.lock.identity(),
                    "Acquired leadership"
                );
                return Ok(true);
            }
        }
    }

    async fn try_acquire(&self) -> Result<bool, LockError> {
        let identity = self.lock.identity();

        let existing = match self.lock.get().await {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(
                    lock = %self.lock.describe(),
                    error = %e,
                    "Failed to read leader election record"
                );
                return Ok(false);
            }
        };

        let now = self.options.clock().now();
        let lease_seconds = self.options.lease_duration_seconds();

        let current = match existing {
            None => {
                let fresh = LeaderElectionRecord::acquired(identity, now, lease_seconds, 0);
                let created = self.lock.create(&fresh).await;
                return Ok(self.record_write(created, fresh));
            }
            Some(record) if !record.is_complete() => {
                // The object exists, so the fresh record has to replace it
                debug!(lock = %self.lock.describe(), "Replacing incomplete leader election record");
                let fresh = LeaderElectionRecord::acquired(identity, now, lease_seconds, 0);
                let updated = self.lock.update(&fresh).await?;
                return Ok(self.record_write(updated, fresh));
            }
            Some(record) => record,
        };

        self.observe(&current);

        if !current.is_held_by(identity) && !current.is_expired_at(now) {
            debug!(
                lock = %self.lock.describe(),
                holder = current.holder().unwrap_or_default(),
                "Lease is held by another candidate"
            );
            return Ok(false);
        }

        let next = LeaderElectionRecord::acquired(
            identity,
            now,
            lease_seconds,
            current.leader_transitions.saturating_add(1),
        );
        let updated = self.lock.update(&next).await?;
        Ok(self.record_write(updated, next))
    }

    /// Renew on a fixed cadence until a renewal fails or `cancel` fires.
    async fn renew_until_lost(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RenewOutcome, ElectionError> {
        loop {
            if !sleep_or_cancel(self.options.renew_deadline(), cancel).await {
                return Ok(RenewOutcome::Cancelled);
            }

            let renewed = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(RenewOutcome::Cancelled),
                result = self.try_renew() => result?,
            };

            if !renewed {
                warn!(
                    lock = %self.lock.describe(),
                    identity = %self.lock.identity(),
                    "Failed to renew lease, leadership lost"
                );
                return Ok(RenewOutcome::Lost);
            }
            debug!(lock = %self.lock.describe(), "Lease renewed");
        }
    }

    async fn try_renew(&self) -> Result<bool, LockError> {
        let identity = self.lock.identity();

        let mut record = match self.lock.get().await {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    lock = %self.lock.describe(),
                    error = %e,
                    "Failed to read leader election record during renewal"
                );
                return Ok(false);
            }
        };

        if !record.is_held_by(identity) {
            if record.is_complete() {
                self.observe(&record);
            }
            return Ok(false);
        }

        record.renew_time = Some(self.options.clock().now());
        let updated = self.lock.update(&record).await?;
        Ok(self.record_write(updated, record))
    }

    /// Hand the lease back so another candidate need not wait for it to expire.
    async fn release(&self) {
        let Some(observed) = self.observed_record() else {
            return;
        };

        let now = self.options.clock().now();
        let released = LeaderElectionRecord {
            holder_identity: None,
            lease_duration_seconds: 1,
            acquire_time: Some(now),
            renew_time: Some(now),
            leader_transitions: observed.leader_transitions,
        };

        match tokio::time::timeout(self.options.retry_period(), self.lock.update(&released)).await
        {
            Ok(Ok(true)) => info!(lock = %self.lock.describe(), "Released leadership"),
            Ok(Ok(false)) => warn!(lock = %self.lock.describe(), "Lease release was rejected"),
            Ok(Err(e)) => warn!(lock = %self.lock.describe(), error = %e, "Failed to release lease"),
            Err(_) => warn!(lock = %self.lock.describe(), "Timed out releasing lease"),
        }
    }

    /// `retry_period * 1.2 * (sample + 1)`, saturating instead of overflowing.
    fn jittered_retry_period(&self) -> Duration {
        let sample = self.options.jitter().sample();
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let secs = self.options.retry_period().as_secs_f64() * JITTER_FACTOR * (sample + 1.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    fn observe(&self, record: &LeaderElectionRecord) {
        let mut state = self.state_mut();
        if state.record.as_ref() != Some(record) {
            state.record = Some(record.clone());
        }
    }

    fn record_write(&self, written: bool, record: LeaderElectionRecord) -> bool {
        if written {
            self.state_mut().record = Some(record);
        }
        written
    }

    async fn report_leader_change(&self) {
        let changed = {
            let mut state = self.state_mut();
            let observed = state
                .record
                .as_ref()
                .and_then(LeaderElectionRecord::holder)
                .map(str::to_string);
            if observed.is_none() || observed == state.reported_leader {
                None
            } else {
                state.reported_leader.clone_from(&observed);
                observed
            }
        };

        let Some(leader) = changed else {
            return;
        };

        info!(lock = %self.lock.describe(), leader = %leader, "New leader observed");
        self.leader_tx.send_replace(Some(leader.clone()));
        for observer in self.observers() {
            observer.on_new_leader(&leader).await;
        }
    }

    async fn notify_started_leading(&self) {
        info!(identity = %self.lock.identity(), "Started leading");
        for observer in self.observers() {
            observer.on_started_leading().await;
        }
    }

    async fn notify_stopped_leading(&self) {
        info!(identity = %self.lock.identity(), "Stopped leading");
        for observer in self.observers() {
            observer.on_stopped_leading().await;
        }
    }

    fn observers(&self) -> Vec<Arc<dyn LeadershipObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn state(&self) -> RwLockReadGuard<'_, ObservedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, ObservedState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns `false` if `cancel` fired before `duration` elapsed.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
