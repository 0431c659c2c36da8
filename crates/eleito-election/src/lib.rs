//! Eleito Election - Lease-based leader election
//!
//! This crate provides:
//! - `LeaderElector`: the acquire/renew/release state machine
//! - `LeaderCallbacks` and the work supervisor enforcing the callback
//!   ordering contract
//! - `LeaseObserver`: read-only view of the current holder
//! - `ElectionConfig`: timing parameters with startup validation
//!
//! At most one replica observes itself as leader at any instant. The
//! guarantee rests entirely on the store's compare-and-swap semantics
//! plus a renew deadline strictly more conservative than the lease
//! expiry other replicas wait for.

pub mod config;
pub mod engine;
pub mod metrics;
pub mod observer;
pub mod supervisor;

// Re-export commonly used types
pub use config::{
    DEFAULT_LEASE_DURATION, DEFAULT_RENEW_DEADLINE, DEFAULT_RETRY_PERIOD, ElectionConfig,
};
pub use engine::{LeaderElector, LeaderState};
pub use observer::{LeaderStatus, LeaseObserver};
pub use supervisor::{LeaderCallbacks, LeaderCallbacksBuilder};

// The cancellation token handed to the leader workload
pub use tokio_util::sync::CancellationToken;
