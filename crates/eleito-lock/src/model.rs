//! Lock record data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eleito_common::KEY_SEPARATOR;

/// Key of the lock record in the shared store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    /// Namespace the record lives in
    pub namespace: String,
    /// Record name
    pub name: String,
}

impl LockKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.namespace, KEY_SEPARATOR, self.name)
    }
}

/// The single persistent entity of the election protocol.
///
/// One record per (namespace, name) pair describes the current or most
/// recent lease holder. All mutation goes through conditional writes, so
/// concurrent claims are resolved by the store, not by this code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Identity of the current or most recent leader; empty means unheld
    #[serde(default)]
    pub holder_identity: String,
    /// Maximum time a renewal may be absent before the lease is expired
    #[serde(default = "default_lease_duration")]
    pub lease_duration_seconds: u64,
    /// Time of the record's last holder transition
    #[serde(default)]
    pub acquire_time: Option<DateTime<Utc>>,
    /// Time of the last successful renewal
    #[serde(default)]
    pub renew_time: Option<DateTime<Utc>>,
    /// Incremented every time the holder changes to a different non-empty
    /// value; never decreases
    #[serde(default)]
    pub leader_transitions: u32,
}

fn default_lease_duration() -> u64 {
    15
}

impl Default for LockRecord {
    fn default() -> Self {
        Self {
            holder_identity: String::new(),
            lease_duration_seconds: default_lease_duration(),
            acquire_time: None,
            renew_time: None,
            leader_transitions: 0,
        }
    }
}

impl LockRecord {
    /// Check if the record names `identity` as the holder
    pub fn held_by(&self, identity: &str) -> bool {
        !self.holder_identity.is_empty() && self.holder_identity == identity
    }

    /// Check if the record currently names no holder
    pub fn is_unheld(&self) -> bool {
        self.holder_identity.is_empty()
    }

    /// The record a replica writes when claiming the lease.
    ///
    /// A renewal by the current holder keeps `acquire_time` and the
    /// transition counter; a takeover stamps a fresh `acquire_time` and
    /// bumps `leader_transitions` exactly once.
    pub fn claimed_by(
        &self,
        identity: &str,
        lease_duration_seconds: u64,
        now: DateTime<Utc>,
    ) -> LockRecord {
        if self.held_by(identity) {
            LockRecord {
                holder_identity: identity.to_string(),
                lease_duration_seconds,
                acquire_time: self.acquire_time,
                renew_time: Some(now),
                leader_transitions: self.leader_transitions,
            }
        } else {
            LockRecord {
                holder_identity: identity.to_string(),
                lease_duration_seconds,
                acquire_time: Some(now),
                renew_time: Some(now),
                leader_transitions: self.leader_transitions + 1,
            }
        }
    }

    /// The record a leader writes on graceful release: the holder is
    /// cleared and the effective lease shortened to one second so a
    /// successor can acquire without waiting out the full duration.
    /// History fields are kept.
    pub fn released(&self) -> LockRecord {
        LockRecord {
            holder_identity: String::new(),
            lease_duration_seconds: 1,
            acquire_time: self.acquire_time,
            renew_time: self.renew_time,
            leader_transitions: self.leader_transitions,
        }
    }
}

/// A lock record together with its opaque, store-managed version.
///
/// Any write must supply the version last read; the store rejects the
/// write if the record has changed since.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    pub record: LockRecord,
    pub version: String,
}
