//! Locks that keep the record as JSON in an object annotation.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Endpoints};
use kube::core::ObjectMeta;
use tracing::debug;

use super::object::{KubeLock, LockObject};
use crate::error::LockError;
use crate::record::LeaderElectionRecord;

/// Annotation key holding the serialized record.
pub const LEADER_ANNOTATION: &str = "control-plane.alpha.kubernetes.io/leader";

/// Lock stored in a ConfigMap annotation.
pub type ConfigMapLock = KubeLock<ConfigMap>;

/// Lock stored in an Endpoints annotation.
pub type EndpointsLock = KubeLock<Endpoints>;

/// A missing or unparsable annotation reads as an empty record.
fn decode_annotation(meta: &ObjectMeta) -> LeaderElectionRecord {
    let Some(raw) = meta
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(LEADER_ANNOTATION))
    else {
        return LeaderElectionRecord::default();
    };

    serde_json::from_str(raw).unwrap_or_else(|e| {
        debug!(
            object = meta.name.as_deref().unwrap_or_default(),
            error = %e,
            "Ignoring unparsable leader annotation"
        );
        LeaderElectionRecord::default()
    })
}

fn encode_annotation(meta: &mut ObjectMeta, record: &LeaderElectionRecord) -> Result<(), LockError> {
    let raw = serde_json::to_string(record)?;
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(LEADER_ANNOTATION.to_string(), raw);
    Ok(())
}

impl LockObject for ConfigMap {
    fn decode_record(&self) -> LeaderElectionRecord {
        decode_annotation(&self.metadata)
    }

    fn encode_record(&mut self, record: &LeaderElectionRecord) -> Result<(), LockError> {
        encode_annotation(&mut self.metadata, record)
    }
}

impl LockObject for Endpoints {
    fn decode_record(&self) -> LeaderElectionRecord {
        decode_annotation(&self.metadata)
    }

    fn encode_record(&mut self, record: &LeaderElectionRecord) -> Result<(), LockError> {
        encode_annotation(&mut self.metadata, record)
    }
}
