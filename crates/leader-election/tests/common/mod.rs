//! Shared fixtures for the leader election integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use leader_election::{
    Clock, FixedJitter, LeaderElectionRecord, LeaderElector, LeaderElectorOptions,
    LeadershipObserver, LockError, ResourceLock,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

// =============================================================================
// In-memory backing store
// =============================================================================

#[derive(Debug, Clone)]
struct StoredRecord {
    version: u64,
    record: LeaderElectionRecord,
}

/// Versioned single-object store with create-if-absent and
/// replace-if-unchanged semantics.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Option<StoredRecord>>>,
}

impl MemoryStore {
    /// Current record, if the object exists.
    pub fn record(&self) -> Option<LeaderElectionRecord> {
        self.inner.lock().unwrap().as_ref().map(|s| s.record.clone())
    }

    /// Overwrite the object as an external writer would.
    pub fn put(&self, record: LeaderElectionRecord) {
        let mut inner = self.inner.lock().unwrap();
        let version = inner.as_ref().map_or(1, |s| s.version + 1);
        *inner = Some(StoredRecord { version, record });
    }

    pub fn lock(&self, identity: &str) -> MemoryLock {
        MemoryLock {
            store: self.clone(),
            identity: identity.to_string(),
            cached_version: Mutex::new(None),
            failing_gets: AtomicUsize::new(0),
        }
    }
}

pub struct MemoryLock {
    store: MemoryStore,
    identity: String,
    cached_version: Mutex<Option<u64>>,
    failing_gets: AtomicUsize,
}

impl MemoryLock {
    /// Make the next `count` reads fail as if the API server were unavailable.
    pub fn fail_next_gets(&self, count: usize) {
        self.failing_gets.store(count, Ordering::SeqCst);
    }
}

pub fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: "simulated failure".to_string(),
        reason: "InternalError".to_string(),
        code,
    })
}

#[async_trait]
impl ResourceLock for MemoryLock {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn get(&self) -> Result<LeaderElectionRecord, LockError> {
        let failing = self.failing_gets.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_gets.store(failing - 1, Ordering::SeqCst);
            return Err(LockError::RequestFailed(api_error(500)));
        }

        let stored = self.store.inner.lock().unwrap().clone();
        match stored {
            Some(stored) => {
                *self.cached_version.lock().unwrap() = Some(stored.version);
                Ok(stored.record)
            }
            None => Err(LockError::NotFound {
                object: self.describe(),
            }),
        }
    }

    async fn create(&self, record: &LeaderElectionRecord) -> bool {
        let mut inner = self.store.inner.lock().unwrap();
        if inner.is_some() {
            return false;
        }
        *inner = Some(StoredRecord {
            version: 1,
            record: record.clone(),
        });
        *self.cached_version.lock().unwrap() = Some(1);
        true
    }

    async fn update(&self, record: &LeaderElectionRecord) -> Result<bool, LockError> {
        let Some(cached) = *self.cached_version.lock().unwrap() else {
            return Err(LockError::NotInitialized {
                object: self.describe(),
            });
        };

        let mut inner = self.store.inner.lock().unwrap();
        match inner.as_mut() {
            Some(stored) if stored.version == cached => {
                stored.version += 1;
                stored.record = record.clone();
                *self.cached_version.lock().unwrap() = Some(stored.version);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn describe(&self) -> String {
        "memory/leader".to_string()
    }
}

// =============================================================================
// Clock and observer
// =============================================================================

/// Wall clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewLeader(String),
    Started,
    Stopped,
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

#[async_trait]
impl LeadershipObserver for RecordingObserver {
    async fn on_new_leader(&self, identity: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::NewLeader(identity.to_string()));
    }

    async fn on_started_leading(&self) {
        self.events.lock().unwrap().push(Event::Started);
    }

    async fn on_stopped_leading(&self) {
        self.events.lock().unwrap().push(Event::Stopped);
    }
}

/// Elector with default timings, `clock`, and a fixed jitter sample.
pub fn elector(
    lock: Arc<MemoryLock>,
    clock: Arc<ManualClock>,
    jitter: f64,
) -> (Arc<LeaderElector>, Arc<RecordingObserver>) {
    let mut options = LeaderElectorOptions::new(lock);
    options.set_clock(clock).unwrap();
    options.set_jitter(Arc::new(FixedJitter(jitter))).unwrap();
    configure_and_build(options)
}

pub fn configure_and_build(
    options: LeaderElectorOptions,
) -> (Arc<LeaderElector>, Arc<RecordingObserver>) {
    let elector = Arc::new(LeaderElector::new(options).unwrap());
    let observer = RecordingObserver::new();
    elector.subscribe(observer.clone());
    (elector, observer)
}
