//! Metrics published by the election engine

use metrics::{counter, describe_counter, describe_gauge, gauge};

use eleito_lock::LockKey;

pub const LEADING_GAUGE: &str = "eleito_leading";
pub const ACQUIRE_ATTEMPTS_TOTAL: &str = "eleito_acquire_attempts_total";
pub const RENEW_FAILURES_TOTAL: &str = "eleito_renew_failures_total";
pub const OBSERVED_TRANSITIONS_TOTAL: &str = "eleito_observed_leader_transitions_total";

/// Register metric descriptions.
/// Should be called once at application startup.
pub fn init_metrics() {
    describe_gauge!(
        LEADING_GAUGE,
        "1 while this replica holds the lease, 0 otherwise"
    );
    describe_counter!(
        ACQUIRE_ATTEMPTS_TOTAL,
        "Total number of acquire attempts made from standby"
    );
    describe_counter!(
        RENEW_FAILURES_TOTAL,
        "Total number of failed renewal attempts"
    );
    describe_counter!(
        OBSERVED_TRANSITIONS_TOTAL,
        "Total number of holder changes observed on the lock record"
    );
}

pub(crate) fn set_leading(key: &LockKey, leading: bool) {
    gauge!(LEADING_GAUGE, "lock" => key.to_string()).set(if leading { 1.0 } else { 0.0 });
}

pub(crate) fn acquire_attempt(key: &LockKey) {
    counter!(ACQUIRE_ATTEMPTS_TOTAL, "lock" => key.to_string()).increment(1);
}

pub(crate) fn renew_failure(key: &LockKey) {
    counter!(RENEW_FAILURES_TOTAL, "lock" => key.to_string()).increment(1);
}

pub(crate) fn observed_transition(key: &LockKey) {
    counter!(OBSERVED_TRANSITIONS_TOTAL, "lock" => key.to_string()).increment(1);
}
