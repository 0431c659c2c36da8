//! Work supervisor and application callback contract
//!
//! The supervisor bridges the election engine's leadership transitions to
//! application logic:
//! - `on_started_leading` is spawned exactly once per term and receives a
//!   cancellation token it must poll cooperatively
//! - `on_stopped_leading` runs exactly once per term, after the workload
//!   task has returned and before the engine proceeds
//! - `on_new_leader` is informational, deduplicated per observed identity
//!   and never blocks the engine

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use eleito_common::{EleitoError, Result};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type StartedLeadingFn = Box<dyn Fn(CancellationToken) -> BoxFuture + Send + Sync>;
type StoppedLeadingFn = Box<dyn Fn() + Send + Sync>;
type NewLeaderFn = Arc<dyn Fn(String) + Send + Sync>;

/// The three application callbacks invoked by the election engine.
///
/// Built through [`LeaderCallbacks::builder`]; `on_started_leading` and
/// `on_stopped_leading` are required, `on_new_leader` is optional.
pub struct LeaderCallbacks {
    pub(crate) on_started_leading: StartedLeadingFn,
    pub(crate) on_stopped_leading: StoppedLeadingFn,
    pub(crate) on_new_leader: Option<NewLeaderFn>,
}

impl LeaderCallbacks {
    pub fn builder() -> LeaderCallbacksBuilder {
        LeaderCallbacksBuilder::default()
    }
}

#[derive(Default)]
pub struct LeaderCallbacksBuilder {
    on_started_leading: Option<StartedLeadingFn>,
    on_stopped_leading: Option<StoppedLeadingFn>,
    on_new_leader: Option<NewLeaderFn>,
}

impl LeaderCallbacksBuilder {
    /// The exclusive leader workload. It must watch the token and wind
    /// down promptly once it is cancelled; the supervisor never
    /// terminates it forcibly.
    pub fn on_started_leading<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_started_leading = Some(Box::new(move |token| Box::pin(f(token))));
        self
    }

    /// Invoked after the workload has returned, before the engine may
    /// re-enter standby or hand control back to the caller.
    pub fn on_stopped_leading<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_stopped_leading = Some(Box::new(f));
        self
    }

    /// Invoked with every observed holder change, including an empty
    /// identity when the record is released or unreadable.
    pub fn on_new_leader<F>(mut self, f: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_new_leader = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<LeaderCallbacks> {
        let on_started_leading = self.on_started_leading.ok_or_else(|| {
            EleitoError::Config("on_started_leading callback is required".to_string())
        })?;
        let on_stopped_leading = self.on_stopped_leading.ok_or_else(|| {
            EleitoError::Config("on_stopped_leading callback is required".to_string())
        })?;
        Ok(LeaderCallbacks {
            on_started_leading,
            on_stopped_leading,
            on_new_leader: self.on_new_leader,
        })
    }
}

/// Runs the callbacks under the ordering contract.
pub(crate) struct WorkSupervisor {
    callbacks: LeaderCallbacks,
    workload: Option<(CancellationToken, JoinHandle<()>)>,
    reported_leader: Option<String>,
}

impl WorkSupervisor {
    pub(crate) fn new(callbacks: LeaderCallbacks) -> Self {
        Self {
            callbacks,
            workload: None,
            reported_leader: None,
        }
    }

    /// Spawn the leader workload for a new term. The token is a child of
    /// `parent`, so an engine-level cancellation reaches the workload
    /// even before the teardown barrier runs.
    pub(crate) fn start_leading(&mut self, parent: &CancellationToken) {
        debug_assert!(self.workload.is_none(), "workload already running");
        let token = parent.child_token();
        let fut = (self.callbacks.on_started_leading)(token.clone());
        let handle = tokio::spawn(fut);
        self.workload = Some((token, handle));
    }

    /// Teardown barrier: cancel the workload, block until it returns,
    /// then invoke `on_stopped_leading`. The engine must not transition
    /// further until this completes.
    pub(crate) async fn stop_leading(&mut self) {
        if let Some((token, handle)) = self.workload.take() {
            token.cancel();
            debug!("waiting for leader workload to return");
            if let Err(e) = handle.await {
                warn!(error = %e, "leader workload panicked");
            }
            (self.callbacks.on_stopped_leading)();
        }
    }

    /// Report an observed holder change. Deduplicated; dispatched on its
    /// own task so a slow callback cannot stall the engine.
    pub(crate) fn report_leader(&mut self, identity: &str) {
        if self.reported_leader.as_deref() == Some(identity) {
            return;
        }
        self.reported_leader = Some(identity.to_string());
        if let Some(cb) = &self.callbacks.on_new_leader {
            let cb = cb.clone();
            let identity = identity.to_string();
            tokio::spawn(async move { cb(identity) });
        }
    }
}
