//! Election configuration and validation

use std::time::Duration;

use eleito_common::{EleitoError, Result};
use eleito_lock::LockKey;

/// Default lease duration (how long a lease survives without renewal)
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);

/// Default renew deadline (how long the leader keeps retrying a failing
/// renewal before giving up leadership locally)
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);

/// Default retry period between acquire/renew attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Caller-supplied election parameters.
///
/// The timing values are related by policy: `renew_deadline` must be
/// shorter than `lease_duration` (the leader gives up before anyone else
/// may legally take over) and `retry_period` must leave room for at
/// least two renew attempts inside the deadline.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Key of the lock record in the shared store
    pub key: LockKey,
    /// Identity this replica claims the lease under; stable for the
    /// process lifetime and unique among replicas
    pub identity: String,
    /// Maximum time a renewal may be absent before the lease is expired
    pub lease_duration: Duration,
    /// Deadline for a renewal measured from the last successful one
    pub renew_deadline: Duration,
    /// Interval between acquire attempts and between renewals
    pub retry_period: Duration,
    /// Proactively clear the record on graceful shutdown so a successor
    /// acquires without waiting out the lease
    pub release_on_cancel: bool,
}

impl ElectionConfig {
    /// Create a config with the reference timing defaults (15s/10s/2s)
    pub fn new(key: LockKey, identity: impl Into<String>) -> Self {
        Self {
            key,
            identity: identity.into(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            release_on_cancel: false,
        }
    }

    /// Validate invariants. Violations are fatal at startup, never retried.
    pub fn validate(&self) -> Result<()> {
        if self.identity.is_empty() {
            return Err(EleitoError::Config("identity must not be empty".to_string()));
        }
        if self.key.name.is_empty() {
            return Err(EleitoError::Config(
                "lock record name must not be empty".to_string(),
            ));
        }
        if self.lease_duration.is_zero()
            || self.renew_deadline.is_zero()
            || self.retry_period.is_zero()
        {
            return Err(EleitoError::Config(
                "lease duration, renew deadline and retry period must be nonzero".to_string(),
            ));
        }
        if self.renew_deadline >= self.lease_duration {
            return Err(EleitoError::Config(format!(
                "renew deadline ({:?}) must be shorter than lease duration ({:?})",
                self.renew_deadline, self.lease_duration
            )));
        }
        if self.retry_period * 2 > self.renew_deadline {
            return Err(EleitoError::Config(format!(
                "retry period ({:?}) must fit at least twice into renew deadline ({:?})",
                self.retry_period, self.renew_deadline
            )));
        }
        Ok(())
    }

    /// Lease duration rounded to whole seconds as written into the record
    pub fn lease_duration_seconds(&self) -> u64 {
        self.lease_duration.as_secs().max(1)
    }
}
