//! Shared Kubernetes lock implementation.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Client, Error as KubeError, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::ResourceLock;
use crate::error::LockError;
use crate::record::LeaderElectionRecord;

/// A namespaced Kubernetes object that can carry a leader election record.
pub trait LockObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Default
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Read the record stored in this object.
    fn decode_record(&self) -> LeaderElectionRecord;

    /// Store `record` in this object, leaving unrelated fields untouched.
    fn encode_record(&mut self, record: &LeaderElectionRecord) -> Result<(), LockError>;
}

/// Resource lock over any [`LockObject`].
///
/// The last object read or written is kept so `update` can send it back with
/// its `resourceVersion`, turning the replace into a compare-and-swap.
pub struct KubeLock<K: LockObject> {
    api: Api<K>,
    namespace: String,
    name: String,
    identity: String,
    cached: Mutex<Option<K>>,
}

impl<K: LockObject> KubeLock<K> {
    /// Create a lock on object `name` in `namespace` for candidate `identity`.
    #[must_use]
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        name: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
            name: name.into(),
            identity: identity.into(),
            cached: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the last object read or written, if any.
    pub async fn cached_object(&self) -> Option<K> {
        self.cached.lock().await.clone()
    }

    fn new_object(&self) -> K {
        let mut object = K::default();
        let meta = object.meta_mut();
        meta.name = Some(self.name.clone());
        meta.namespace = Some(self.namespace.clone());
        object
    }
}

#[async_trait]
impl<K: LockObject> ResourceLock for KubeLock<K> {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn get(&self) -> Result<LeaderElectionRecord, LockError> {
        match self.api.get(&self.name).await {
            Ok(object) => {
                let record = object.decode_record();
                *self.cached.lock().await = Some(object);
                Ok(record)
            }
            Err(KubeError::Api(ae)) if ae.code == 404 => Err(LockError::NotFound {
                object: self.describe(),
            }),
            Err(e) => Err(LockError::RequestFailed(e)),
        }
    }

    async fn create(&self, record: &LeaderElectionRecord) -> bool {
        let mut object = self.new_object();
        if let Err(e) = object.encode_record(record) {
            warn!(lock = %self.describe(), error = %e, "Failed to encode lock object");
            return false;
        }

        match self.api.create(&PostParams::default(), &object).await {
            Ok(created) => {
                *self.cached.lock().await = Some(created);
                true
            }
            Err(KubeError::Api(ae)) if ae.code == 409 => {
                debug!(lock = %self.describe(), "Lock object already exists");
                false
            }
            Err(e) => {
                warn!(lock = %self.describe(), error = %e, "Failed to create lock object");
                false
            }
        }
    }

    async fn update(&self, record: &LeaderElectionRecord) -> Result<bool, LockError> {
        let Some(mut object) = self.cached.lock().await.clone() else {
            return Err(LockError::NotInitialized {
                object: self.describe(),
            });
        };
        if let Err(e) = object.encode_record(record) {
            warn!(lock = %self.describe(), error = %e, "Failed to encode lock object");
            return Ok(false);
        }

        match self
            .api
            .replace(&self.name, &PostParams::default(), &object)
            .await
        {
            Ok(replaced) => {
                *self.cached.lock().await = Some(replaced);
                Ok(true)
            }
            Err(KubeError::Api(ae)) if ae.code == 409 => {
                debug!(lock = %self.describe(), "Lock object changed since last read");
                Ok(false)
            }
            Err(e) => {
                warn!(lock = %self.describe(), error = %e, "Failed to replace lock object");
                Ok(false)
            }
        }
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
