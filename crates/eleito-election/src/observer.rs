//! Read-only leadership observation
//!
//! Non-participants (monitors, readiness probes, standby dashboards) can
//! watch who currently leads without ever writing to the store.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::debug;

use eleito_lock::{LockKey, LockStore};

/// Snapshot of the lock record as seen by a non-participant
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderStatus {
    /// Current holder; `None` when unheld, absent, or unreadable
    pub holder: Option<String>,
    /// Holder changes recorded so far
    pub leader_transitions: u32,
    /// Last successful renewal
    pub renew_time: Option<DateTime<Utc>>,
    /// Whether the record's own timestamps say the lease has expired
    pub stale: bool,
}

impl LeaderStatus {
    fn unknown() -> Self {
        Self {
            holder: None,
            leader_transitions: 0,
            renew_time: None,
            stale: true,
        }
    }
}

/// Stateless read path over the lock record
pub struct LeaseObserver {
    store: Arc<dyn LockStore>,
    key: LockKey,
}

impl LeaseObserver {
    pub fn new(store: Arc<dyn LockStore>, key: LockKey) -> Self {
        Self { store, key }
    }

    /// Report the current holder and staleness. Absent and malformed
    /// records yield an unknown holder rather than an error.
    pub async fn observe(&self) -> LeaderStatus {
        match self.store.get(&self.key).await {
            Ok(Some(versioned)) => {
                let record = versioned.record;
                let stale = match record.renew_time {
                    Some(renew_time) => {
                        renew_time + ChronoDuration::seconds(record.lease_duration_seconds as i64)
                            < Utc::now()
                    }
                    None => true,
                };
                let holder = (!record.holder_identity.is_empty())
                    .then(|| record.holder_identity.clone());
                LeaderStatus {
                    holder,
                    leader_transitions: record.leader_transitions,
                    renew_time: record.renew_time,
                    stale,
                }
            }
            Ok(None) => LeaderStatus::unknown(),
            Err(e) => {
                debug!(key = %self.key, error = %e, "failed to observe lock record");
                LeaderStatus::unknown()
            }
        }
    }
}
