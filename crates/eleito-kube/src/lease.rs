//! Lease object mapping and store implementation

use async_trait::async_trait;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use tracing::trace;

use eleito_common::{EleitoError, Result};
use eleito_lock::{LockKey, LockRecord, LockStore, VersionedRecord};

/// Lock store backed by a `coordination.k8s.io/v1` Lease.
///
/// The apiserver enforces the compare-and-swap: every write carries the
/// `resourceVersion` last read, and a concurrent writer turns the
/// replace into a 409.
pub struct KubeLeaseStore {
    client: Client,
}

impl KubeLeaseStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the default client resolution (in-cluster service
    /// account when running in a pod, local kubeconfig otherwise).
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| EleitoError::Store(format!("failed to build kube client: {}", e)))?;
        Ok(Self::new(client))
    }

    fn api(&self, key: &LockKey) -> Api<Lease> {
        Api::namespaced(self.client.clone(), &key.namespace)
    }
}

#[async_trait]
impl LockStore for KubeLeaseStore {
    async fn get(&self, key: &LockKey) -> Result<Option<VersionedRecord>> {
        let lease = self
            .api(key)
            .get_opt(&key.name)
            .await
            .map_err(|e| map_kube_error(key, e))?;
        Ok(lease.map(|lease| versioned_record(&lease)))
    }

    async fn create(&self, key: &LockKey, record: &LockRecord) -> Result<VersionedRecord> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(key.name.clone()),
                namespace: Some(key.namespace.clone()),
                ..Default::default()
            },
            spec: Some(lease_spec(record)),
        };
        let created = self
            .api(key)
            .create(&PostParams::default(), &lease)
            .await
            .map_err(|e| map_kube_error(key, e))?;
        trace!(key = %key, "created lease");
        Ok(versioned_record(&created))
    }

    async fn update(
        &self,
        key: &LockKey,
        record: &LockRecord,
        expected_version: &str,
    ) -> Result<VersionedRecord> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(key.name.clone()),
                namespace: Some(key.namespace.clone()),
                resource_version: Some(expected_version.to_string()),
                ..Default::default()
            },
            spec: Some(lease_spec(record)),
        };
        let updated = self
            .api(key)
            .replace(&key.name, &PostParams::default(), &lease)
            .await
            .map_err(|e| map_kube_error(key, e))?;
        trace!(key = %key, holder = %record.holder_identity, "replaced lease");
        Ok(versioned_record(&updated))
    }

    fn describe(&self) -> String {
        "kubernetes lease store".to_string()
    }
}

fn map_kube_error(key: &LockKey, error: kube::Error) -> EleitoError {
    match error {
        kube::Error::Api(response) if response.code == 409 => {
            EleitoError::Conflict(format!("lease '{}': {}", key, response.message))
        }
        kube::Error::Api(response) if response.code == 404 => {
            EleitoError::RecordNotFound(key.to_string())
        }
        other => EleitoError::Store(format!("lease '{}': {}", key, other)),
    }
}

fn lease_spec(record: &LockRecord) -> LeaseSpec {
    LeaseSpec {
        holder_identity: (!record.holder_identity.is_empty())
            .then(|| record.holder_identity.clone()),
        lease_duration_seconds: Some(record.lease_duration_seconds as i32),
        acquire_time: record.acquire_time.map(MicroTime),
        renew_time: record.renew_time.map(MicroTime),
        lease_transitions: Some(record.leader_transitions as i32),
        ..Default::default()
    }
}

/// Build a record from whatever the Lease carries. Missing spec fields
/// fall back to defaults so a malformed object reads as unheld instead
/// of failing the engine.
fn versioned_record(lease: &Lease) -> VersionedRecord {
    let spec = lease.spec.clone().unwrap_or_default();
    let record = LockRecord {
        holder_identity: spec.holder_identity.unwrap_or_default(),
        lease_duration_seconds: spec
            .lease_duration_seconds
            .map(|secs| secs.max(0) as u64)
            .unwrap_or(15),
        acquire_time: spec.acquire_time.map(|t| t.0),
        renew_time: spec.renew_time.map(|t| t.0),
        leader_transitions: spec.lease_transitions.map(|n| n.max(0) as u32).unwrap_or(0),
    };
    VersionedRecord {
        record,
        version: lease.metadata.resource_version.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_lease_spec_mapping() {
        let now = Utc::now();
        let record = LockRecord::default().claimed_by("replica-a", 15, now);
        let spec = lease_spec(&record);
        assert_eq!(spec.holder_identity.as_deref(), Some("replica-a"));
        assert_eq!(spec.lease_duration_seconds, Some(15));
        assert_eq!(spec.lease_transitions, Some(1));
        assert_eq!(spec.renew_time, Some(MicroTime(now)));

        // A released record maps the empty holder to an absent field
        let spec = lease_spec(&record.released());
        assert_eq!(spec.holder_identity, None);
        assert_eq!(spec.lease_duration_seconds, Some(1));
    }

    #[test]
    fn test_lease_without_spec_reads_as_unheld() {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some("test-lease".to_string()),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            spec: None,
        };
        let versioned = versioned_record(&lease);
        assert!(versioned.record.is_unheld());
        assert_eq!(versioned.record.lease_duration_seconds, 15);
        assert_eq!(versioned.version, "42");
    }
}
