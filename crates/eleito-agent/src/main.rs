//! Eleito replica agent
//!
//! Every replica of a deployment runs this binary with the same lock
//! key; one wins the lease and runs the demo workload, the rest stand
//! by, watch for leadership changes and race to take over when
//! renewals stop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;

use eleito_common::default_identity;
use eleito_election::{ElectionConfig, LeaderCallbacks, LeaderElector, metrics};
use eleito_kube::KubeLeaseStore;
use eleito_lock::{LockKey, LockStore, MemoryLockStore};

mod logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// In-process store, for demos and tests
    Memory,
    /// Kubernetes Lease in the surrounding cluster
    Kube,
}

#[derive(Debug, Parser)]
#[command(
    name = "eleito-agent",
    about = "Lease-based leader election replica",
    version
)]
struct Args {
    /// Namespace of the lock record
    #[arg(long, env = "ELEITO_NAMESPACE", default_value = eleito_common::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Name of the lock record
    #[arg(long, env = "ELEITO_NAME", default_value = eleito_common::DEFAULT_LOCK_NAME)]
    name: String,

    /// Identity this replica claims the lease under
    /// (default: hostname plus a random suffix)
    #[arg(long, env = "ELEITO_IDENTITY")]
    identity: Option<String>,

    /// Lease duration in seconds
    #[arg(long, default_value_t = 15)]
    lease_duration_secs: u64,

    /// Renew deadline in seconds
    #[arg(long, default_value_t = 10)]
    renew_deadline_secs: u64,

    /// Retry period in seconds
    #[arg(long, default_value_t = 2)]
    retry_period_secs: u64,

    /// Release the lease on graceful shutdown so a successor can take
    /// over without waiting out the lease
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    release_on_cancel: bool,

    /// Store backend coordinating the election
    #[arg(long, value_enum, default_value_t = StoreKind::Kube)]
    store: StoreKind,

    /// Demo workload tick interval in seconds
    #[arg(long, default_value_t = 5)]
    tick_secs: u64,

    /// Write logs to a rolling file in this directory in addition to
    /// the console
    #[arg(long, env = "ELEITO_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logging_guard = logging::init(args.log_dir.as_deref())?;
    metrics::init_metrics();

    let identity = args.identity.clone().unwrap_or_else(default_identity);
    let key = LockKey::new(&args.namespace, &args.name);

    let store: Arc<dyn LockStore> = match args.store {
        StoreKind::Memory => Arc::new(MemoryLockStore::new()),
        StoreKind::Kube => Arc::new(KubeLeaseStore::try_default().await?),
    };

    let mut config = ElectionConfig::new(key, identity.clone());
    config.lease_duration = Duration::from_secs(args.lease_duration_secs);
    config.renew_deadline = Duration::from_secs(args.renew_deadline_secs);
    config.retry_period = Duration::from_secs(args.retry_period_secs);
    config.release_on_cancel = args.release_on_cancel;

    let tick = Duration::from_secs(args.tick_secs);
    let callbacks = LeaderCallbacks::builder()
        .on_started_leading(move |token: CancellationToken| lead(tick, token))
        .on_stopped_leading(|| info!("stopped leading"))
        .on_new_leader(|leader| info!(leader = %leader, "observed new leader"))
        .build()?;

    let elector = LeaderElector::new(config, store, callbacks)?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    info!(identity = %identity, "starting eleito agent");
    elector.run(cancel).await;
    Ok(())
}

/// The demo leader workload: tick until told to stop. The token must be
/// polled at every blocking point; the supervisor only signals, it never
/// interrupts.
async fn lead(tick: Duration, token: CancellationToken) {
    info!(tick_secs = tick.as_secs(), "leading");
    let mut interval = tokio::time::interval(tick);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => info!("still leading"),
            _ = token.cancelled() => {
                info!("leading cancelled");
                break;
            }
        }
    }
}

/// Wire Ctrl+C and SIGTERM to the election cancellation
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, shutting down"),
            _ = terminate => info!("received terminate signal, shutting down"),
        }
        cancel.cancel();
    });
}
