//! End-to-end election tests against the in-memory store.
//!
//! All timing runs under tokio's paused clock, so lease expiry and
//! handover windows are exercised deterministically in simulated time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use eleito_election::{ElectionConfig, LeaderCallbacks, LeaderElector, LeaderState};
use eleito_lock::{LockKey, LockRecord, LockStore, MemoryLockStore};

fn key() -> LockKey {
    LockKey::new("default", "test-lease")
}

struct Replica {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    state: watch::Receiver<LeaderState>,
}

/// Harness around one elector. The workload bumps `active` while it
/// runs and counts a violation if another workload was already active,
/// which would break mutual exclusion.
fn spawn_replica(
    store: &Arc<MemoryLockStore>,
    identity: &str,
    release_on_cancel: bool,
    active: &Arc<AtomicUsize>,
    violations: &Arc<AtomicUsize>,
) -> Replica {
    let mut config = ElectionConfig::new(key(), identity);
    config.release_on_cancel = release_on_cancel;

    let active = active.clone();
    let violations = violations.clone();
    let callbacks = LeaderCallbacks::builder()
        .on_started_leading(move |token: CancellationToken| {
            let active = active.clone();
            let violations = violations.clone();
            async move {
                if active.fetch_add(1, Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                token.cancelled().await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .on_stopped_leading(|| {})
        .build()
        .unwrap();

    let elector = LeaderElector::new(
        config,
        store.clone() as Arc<dyn LockStore>,
        callbacks,
    )
    .unwrap();
    let state = elector.watch_state();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(elector.run(cancel.clone()));
    Replica {
        handle,
        cancel,
        state,
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_replica_acquires_and_renews() {
    let store = Arc::new(MemoryLockStore::new());
    let active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let mut replica = spawn_replica(&store, "replica-a", false, &active, &violations);
    replica
        .state
        .wait_for(|s| *s == LeaderState::Leading)
        .await
        .unwrap();

    let created = store.get(&key()).await.unwrap().unwrap();
    assert_eq!(created.record.holder_identity, "replica-a");
    assert_eq!(created.record.leader_transitions, 1);

    // Renewals refresh the record without counting a transition
    tokio::time::sleep(Duration::from_secs(5)).await;
    let renewed = store.get(&key()).await.unwrap().unwrap();
    assert_eq!(renewed.record.leader_transitions, 1);
    assert!(
        renewed.version.parse::<u64>().unwrap() > created.version.parse::<u64>().unwrap(),
        "renewals should have produced new record versions"
    );

    // Without release-on-cancel the record keeps naming the old holder
    replica.cancel.cancel();
    replica.handle.await.unwrap();
    let after = store.get(&key()).await.unwrap().unwrap();
    assert_eq!(after.record.holder_identity, "replica-a");
    assert_eq!(active.load(Ordering::SeqCst), 0);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_two_replicas_elect_exactly_one_leader() {
    let store = Arc::new(MemoryLockStore::new());
    let active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let a = spawn_replica(&store, "replica-a", false, &active, &violations);
    let b = spawn_replica(&store, "replica-b", false, &active, &violations);

    tokio::time::sleep(Duration::from_secs(5)).await;

    let leading = [&a, &b]
        .iter()
        .filter(|r| *r.state.borrow() == LeaderState::Leading)
        .count();
    let standby = [&a, &b]
        .iter()
        .filter(|r| *r.state.borrow() == LeaderState::Standby)
        .count();
    assert_eq!(leading, 1, "exactly one replica may lead");
    assert_eq!(standby, 1);
    assert_eq!(violations.load(Ordering::SeqCst), 0);

    a.cancel.cancel();
    b.cancel.cancel();
    a.handle.await.unwrap();
    b.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_crash_handover_waits_out_the_lease() {
    let store = Arc::new(MemoryLockStore::new());
    let active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let mut a = spawn_replica(&store, "replica-a", false, &active, &violations);
    a.state
        .wait_for(|s| *s == LeaderState::Leading)
        .await
        .unwrap();

    let mut b = spawn_replica(&store, "replica-b", false, &active, &violations);
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Simulated crash: replica-a stops renewing without releasing
    let crashed_at = Instant::now();
    a.cancel.cancel();
    a.handle.await.unwrap();
    assert_eq!(*b.state.borrow(), LeaderState::Standby);

    b.state
        .wait_for(|s| *s == LeaderState::Leading)
        .await
        .unwrap();
    let elapsed = crashed_at.elapsed();

    // No takeover before the lease could have expired (15s after the
    // last renewal, which happened at most one retry period before the
    // crash), and takeover once it did, within the lease plus the
    // observation and polling lag of the standby replica.
    assert!(
        elapsed >= Duration::from_secs(12),
        "takeover after {:?} is earlier than the lease allows",
        elapsed
    );
    assert!(
        elapsed <= Duration::from_secs(21),
        "takeover after {:?} exceeds lease plus polling lag",
        elapsed
    );

    let record = store.get(&key()).await.unwrap().unwrap().record;
    assert_eq!(record.holder_identity, "replica-b");
    assert_eq!(record.leader_transitions, 2);
    assert_eq!(violations.load(Ordering::SeqCst), 0);

    b.cancel.cancel();
    b.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_graceful_release_hands_over_quickly() {
    let store = Arc::new(MemoryLockStore::new());
    let active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let mut a = spawn_replica(&store, "replica-a", true, &active, &violations);
    a.state
        .wait_for(|s| *s == LeaderState::Leading)
        .await
        .unwrap();

    let mut b = spawn_replica(&store, "replica-b", false, &active, &violations);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let released_at = Instant::now();
    a.cancel.cancel();
    a.handle.await.unwrap();

    b.state
        .wait_for(|s| *s == LeaderState::Leading)
        .await
        .unwrap();
    let elapsed = released_at.elapsed();

    // The release shortens the lease, so the standby replica picks the
    // record up on its next retry tick instead of waiting 15 seconds
    assert!(
        elapsed <= Duration::from_secs(4),
        "graceful takeover took {:?}",
        elapsed
    );

    let record = store.get(&key()).await.unwrap().unwrap().record;
    assert_eq!(record.holder_identity, "replica-b");
    assert_eq!(record.leader_transitions, 2);
    assert_eq!(violations.load(Ordering::SeqCst), 0);

    b.cancel.cancel();
    b.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_loses_then_reacquires_with_ordered_callbacks() {
    let store = Arc::new(MemoryLockStore::new());
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let started_events = events.clone();
    let stopped_events = events.clone();
    let callbacks = LeaderCallbacks::builder()
        .on_started_leading(move |token: CancellationToken| {
            let events = started_events.clone();
            async move {
                events.lock().push("started");
                token.cancelled().await;
            }
        })
        .on_stopped_leading(move || {
            stopped_events.lock().push("stopped");
        })
        .build()
        .unwrap();

    let config = ElectionConfig::new(key(), "replica-a");
    let elector = LeaderElector::new(
        config,
        store.clone() as Arc<dyn LockStore>,
        callbacks,
    )
    .unwrap();
    let mut state = elector.watch_state();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(elector.run(cancel.clone()));

    state.wait_for(|s| *s == LeaderState::Leading).await.unwrap();
    // Let one renewal succeed, then cut the store off for long enough to
    // blow the renew deadline
    tokio::time::sleep(Duration::from_secs(3)).await;
    store.fail_next(8);

    state
        .wait_for(|s| *s == LeaderState::Standby)
        .await
        .unwrap();
    assert_eq!(*events.lock(), vec!["started", "stopped"]);

    // The record still names us, so recovery reacquires immediately once
    // the store answers again
    state.wait_for(|s| *s == LeaderState::Leading).await.unwrap();
    assert_eq!(*events.lock(), vec!["started", "stopped", "started"]);

    let record = store.get(&key()).await.unwrap().unwrap().record;
    assert_eq!(record.holder_identity, "replica-a");
    assert_eq!(
        record.leader_transitions, 1,
        "reacquiring our own lease must not count a transition"
    );

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(
        *events.lock(),
        vec!["started", "stopped", "started", "stopped"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_new_leader_notifications_follow_observed_holders() {
    let store = Arc::new(MemoryLockStore::new());

    // A foreign replica already holds the lease
    let foreign = LockRecord::default().claimed_by("someone-else", 15, chrono::Utc::now());
    store.create(&key(), &foreign).await.unwrap();

    let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let observed_cb = observed.clone();
    let callbacks = LeaderCallbacks::builder()
        .on_started_leading(|token: CancellationToken| async move {
            token.cancelled().await;
        })
        .on_stopped_leading(|| {})
        .on_new_leader(move |identity| {
            observed_cb.lock().push(identity);
        })
        .build()
        .unwrap();

    let config = ElectionConfig::new(key(), "replica-a");
    let elector = LeaderElector::new(
        config,
        store.clone() as Arc<dyn LockStore>,
        callbacks,
    )
    .unwrap();
    let mut state = elector.watch_state();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(elector.run(cancel.clone()));

    // The foreign holder never renews, so we take over once its lease
    // has run out from our point of view
    state.wait_for(|s| *s == LeaderState::Leading).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        *observed.lock(),
        vec!["someone-else".to_string(), "replica-a".to_string()]
    );
    let record = store.get(&key()).await.unwrap().unwrap().record;
    assert_eq!(record.leader_transitions, 2);

    cancel.cancel();
    handle.await.unwrap();
}
