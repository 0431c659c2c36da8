//! Election engine
//!
//! One long-lived task per replica drives the acquire/renew/release state
//! machine against the lock store. Correctness rests on two pillars:
//! - every write is conditional on the last read version, so the store
//!   resolves races between replicas
//! - lease expiry is measured on this replica's own monotonic clock from
//!   the moment the record content was last seen to change, so the
//!   decision never depends on another machine's wall clock

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use eleito_common::Result;
use eleito_lock::{LockRecord, LockStore, VersionedRecord};

use crate::config::ElectionConfig;
use crate::metrics;
use crate::supervisor::{LeaderCallbacks, WorkSupervisor};

/// Per-replica election state, observable via [`LeaderElector::watch_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    /// Not holding the lease, retrying acquisition on schedule
    Standby,
    /// Holding the lease, workload running, renewing on schedule
    Leading,
    /// Leadership ended, waiting for the workload teardown barrier
    ShuttingDown,
    /// The election loop has returned
    Terminated,
}

/// Acquire-path sleeps are stretched by up to this fraction so replicas
/// started together do not thunder against the store in lockstep.
const JITTER_FACTOR: f64 = 0.2;

enum RenewOutcome {
    Lost,
    Cancelled,
}

/// The election engine. Consumed by [`LeaderElector::run`], which loops
/// standby -> leading -> shutting-down until cancelled.
pub struct LeaderElector {
    config: ElectionConfig,
    store: Arc<dyn LockStore>,
    supervisor: WorkSupervisor,
    observed: Option<VersionedRecord>,
    observed_at: Instant,
    state_tx: watch::Sender<LeaderState>,
}

impl LeaderElector {
    /// Validate the configuration and assemble an engine. Configuration
    /// violations surface here, before any store traffic.
    pub fn new(
        config: ElectionConfig,
        store: Arc<dyn LockStore>,
        callbacks: LeaderCallbacks,
    ) -> Result<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(LeaderState::Standby);
        Ok(Self {
            config,
            store,
            supervisor: WorkSupervisor::new(callbacks),
            observed: None,
            observed_at: Instant::now(),
            state_tx,
        })
    }

    /// Subscribe to election state transitions
    pub fn watch_state(&self) -> watch::Receiver<LeaderState> {
        self.state_tx.subscribe()
    }

    /// Run the election loop until `cancel` fires.
    ///
    /// Store errors are absorbed and retried on schedule; the loop only
    /// returns on cancellation, and only after the workload teardown
    /// barrier (and the best-effort release, when configured) completed.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            key = %self.config.key,
            identity = %self.config.identity,
            store = %self.store.describe(),
            "starting leader election"
        );
        loop {
            self.set_state(LeaderState::Standby);
            if !self.acquire(&cancel).await {
                break;
            }

            info!(key = %self.config.key, identity = %self.config.identity, "acquired leader lease");
            self.set_state(LeaderState::Leading);
            metrics::set_leading(&self.config.key, true);
            self.supervisor.start_leading(&cancel);

            let outcome = self.renew_loop(&cancel).await;

            self.set_state(LeaderState::ShuttingDown);
            metrics::set_leading(&self.config.key, false);
            // Teardown barrier: the workload must be signalled and joined
            // and on_stopped_leading must have run before any transition
            // that could let another replica run concurrently.
            self.supervisor.stop_leading().await;

            match outcome {
                RenewOutcome::Lost => {
                    warn!(key = %self.config.key, "leader lease lost, returning to standby");
                }
                RenewOutcome::Cancelled => {
                    if self.config.release_on_cancel {
                        self.release().await;
                    }
                    break;
                }
            }
        }
        self.set_state(LeaderState::Terminated);
        info!(key = %self.config.key, identity = %self.config.identity, "leader election stopped");
    }

    /// Standby retry loop. Returns false when cancelled before winning.
    async fn acquire(&mut self, cancel: &CancellationToken) -> bool {
        debug!(key = %self.config.key, "attempting to acquire leader lease");
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            metrics::acquire_attempt(&self.config.key);
            if self.try_acquire_or_renew().await {
                return true;
            }
            tokio::select! {
                _ = time::sleep(jittered(self.config.retry_period)) => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }

    /// Renew while leading. The deadline is always `renew_deadline` past
    /// the last successful write; a renewal failing continuously past it
    /// loses leadership locally, before any other replica could legally
    /// observe the lease as expired.
    async fn renew_loop(&mut self, cancel: &CancellationToken) -> RenewOutcome {
        let mut deadline = Instant::now() + self.config.renew_deadline;
        loop {
            tokio::select! {
                _ = time::sleep(self.config.retry_period) => {}
                _ = cancel.cancelled() => return RenewOutcome::Cancelled,
            }
            loop {
                match time::timeout_at(deadline, self.try_acquire_or_renew()).await {
                    Ok(true) => {
                        deadline = Instant::now() + self.config.renew_deadline;
                        break;
                    }
                    Ok(false) => {
                        metrics::renew_failure(&self.config.key);
                        let retry_at = Instant::now() + self.config.retry_period;
                        if retry_at >= deadline {
                            debug!(key = %self.config.key, "renew deadline exceeded");
                            return RenewOutcome::Lost;
                        }
                        tokio::select! {
                            _ = time::sleep_until(retry_at) => {}
                            _ = cancel.cancelled() => return RenewOutcome::Cancelled,
                        }
                    }
                    Err(_) => {
                        // The in-flight attempt outlived the deadline
                        metrics::renew_failure(&self.config.key);
                        debug!(key = %self.config.key, "renew deadline exceeded");
                        return RenewOutcome::Lost;
                    }
                }
            }
        }
    }

    /// One acquire-or-renew round trip. Returns true when this replica
    /// holds a freshly written lease afterwards.
    async fn try_acquire_or_renew(&mut self) -> bool {
        let now = Utc::now();

        let current = match self.store.get(&self.config.key).await {
            Ok(current) => current,
            Err(e) => {
                warn!(key = %self.config.key, error = %e, "failed to read lock record");
                return false;
            }
        };

        let Some(current) = current else {
            return self.create_record(now).await;
        };

        let lease_duration = Duration::from_secs(current.record.lease_duration_seconds.max(1));
        let observed_at = self.observe_record(current.clone());

        // A live record held by someone else wins
        if !current.record.is_unheld()
            && !current.record.held_by(&self.config.identity)
            && observed_at + lease_duration > Instant::now()
        {
            debug!(
                key = %self.config.key,
                holder = %current.record.holder_identity,
                "leader lease is held and has not expired"
            );
            return false;
        }

        // Unheld, expired, or already ours: claim it
        let claim = current.record.claimed_by(
            &self.config.identity,
            self.config.lease_duration_seconds(),
            now,
        );
        match self
            .store
            .update(&self.config.key, &claim, &current.version)
            .await
        {
            Ok(updated) => {
                self.observe_record(updated);
                true
            }
            Err(e) if e.is_conflict() => {
                debug!(key = %self.config.key, "conditional write lost the race");
                false
            }
            Err(e) => {
                warn!(key = %self.config.key, error = %e, "failed to update lock record");
                false
            }
        }
    }

    /// First acquisition creates the record
    async fn create_record(&mut self, now: chrono::DateTime<Utc>) -> bool {
        let claim = LockRecord::default().claimed_by(
            &self.config.identity,
            self.config.lease_duration_seconds(),
            now,
        );
        match self.store.create(&self.config.key, &claim).await {
            Ok(created) => {
                self.observe_record(created);
                true
            }
            Err(e) if e.is_conflict() => {
                debug!(key = %self.config.key, "lost the race to create the lock record");
                false
            }
            Err(e) => {
                warn!(key = %self.config.key, error = %e, "failed to create lock record");
                false
            }
        }
    }

    /// Best-effort release so a successor can skip the lease wait.
    /// Failure is non-fatal; the lease simply expires on schedule.
    async fn release(&mut self) {
        let Some(observed) = self.observed.clone() else {
            return;
        };
        if !observed.record.held_by(&self.config.identity) {
            return;
        }
        let released = observed.record.released();
        match self
            .store
            .update(&self.config.key, &released, &observed.version)
            .await
        {
            Ok(updated) => {
                info!(key = %self.config.key, "released leader lease");
                self.observe_record(updated);
            }
            Err(e) => {
                warn!(key = %self.config.key, error = %e, "failed to release leader lease");
            }
        }
    }

    /// Track the latest observed record. The observation timestamp only
    /// moves when the record content changes, so lease expiry runs on
    /// this replica's own monotonic clock. Every observed holder change
    /// emits exactly one new-leader notification.
    fn observe_record(&mut self, latest: VersionedRecord) -> Instant {
        let content_changed = self
            .observed
            .as_ref()
            .map(|observed| observed.record != latest.record)
            .unwrap_or(true);
        if content_changed {
            self.observed_at = Instant::now();
        }

        let holder_changed = self
            .observed
            .as_ref()
            .map(|observed| observed.record.holder_identity != latest.record.holder_identity)
            .unwrap_or(true);
        if holder_changed {
            metrics::observed_transition(&self.config.key);
            info!(key = %self.config.key, leader = %latest.record.holder_identity, "observed new leader");
            self.supervisor.report_leader(&latest.record.holder_identity);
        }

        self.observed = Some(latest);
        self.observed_at
    }

    fn set_state(&self, state: LeaderState) {
        if *self.state_tx.borrow() != state {
            debug!(key = %self.config.key, ?state, "election state changed");
            self.state_tx.send_replace(state);
        }
    }
}

fn jittered(period: Duration) -> Duration {
    period.mul_f64(1.0 + rand::random::<f64>() * JITTER_FACTOR)
}
