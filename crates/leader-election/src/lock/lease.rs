//! Lock backed by a `coordination.k8s.io/v1` Lease.

use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;

use super::object::{KubeLock, LockObject};
use crate::error::LockError;
use crate::record::{LeaderElectionRecord, DEFAULT_LEASE_DURATION_SECONDS};

/// Lock stored in the structured fields of a Lease.
pub type LeaseLock = KubeLock<Lease>;

impl LockObject for Lease {
    fn decode_record(&self) -> LeaderElectionRecord {
        let Some(spec) = &self.spec else {
            return LeaderElectionRecord {
                lease_duration_seconds: DEFAULT_LEASE_DURATION_SECONDS,
                ..Default::default()
            };
        };

        LeaderElectionRecord {
            holder_identity: spec.holder_identity.clone(),
            // Leases written by older clients may omit the duration
            lease_duration_seconds: spec
                .lease_duration_seconds
                .unwrap_or(DEFAULT_LEASE_DURATION_SECONDS),
            acquire_time: spec.acquire_time.as_ref().map(|t| t.0),
            renew_time: spec.renew_time.as_ref().map(|t| t.0),
            leader_transitions: spec.lease_transitions.unwrap_or_default(),
        }
    }

    fn encode_record(&mut self, record: &LeaderElectionRecord) -> Result<(), LockError> {
        let spec = self.spec.get_or_insert_with(LeaseSpec::default);
        spec.holder_identity.clone_from(&record.holder_identity);
        spec.lease_duration_seconds = Some(record.lease_duration_seconds);
        spec.acquire_time = record.acquire_time.map(MicroTime);
        spec.renew_time = record.renew_time.map(MicroTime);
        spec.lease_transitions = Some(record.leader_transitions);
        Ok(())
    }
}
