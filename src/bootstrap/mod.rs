use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::sync::SyncEngine;

/// Delay between attempts when the initial import hits a transient
/// platform failure. The service is unattended; it keeps trying.
const RETRY_DELAY: Duration = Duration::from_secs(30);

/// One-shot readiness gate. Starts closed, opens exactly once, never
/// reverts. Cycles, dispatch, and commands all wait on it.
#[derive(Clone)]
pub struct BootstrapGate {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl BootstrapGate {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn is_open(&self) -> bool {
        *self.rx.borrow()
    }

    /// Idempotent; later calls are no-ops.
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves immediately once open; otherwise parks until the
    /// transition.
    pub async fn wait_open(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for BootstrapGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Populate an under-populated store from a first full snapshot, with
/// notifications suppressed (a first run must not flood the channel with
/// hundreds of events), then open the gate. A store that already looks
/// populated opens the gate untouched.
pub async fn run_bootstrap(engine: SyncEngine, gate: BootstrapGate, threshold: usize) -> Result<()> {
    loop {
        match bootstrap_once(&engine, threshold).await {
            Ok(true) => {
                info!("initial import complete");
                gate.open();
                return Ok(());
            }
            Ok(false) => {
                info!(
                    challenges = engine.store().count_challenges(),
                    "store already populated; skipping initial import"
                );
                gate.open();
                return Ok(());
            }
            Err(err) => {
                warn!(error = %err, "initial import failed; retrying");
                sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// Returns whether an import ran. A populated store performs zero writes
/// and zero enqueues here.
async fn bootstrap_once(engine: &SyncEngine, threshold: usize) -> Result<bool> {
    if engine.store().count_challenges() >= threshold {
        return Ok(false);
    }

    info!(threshold, "store looks empty; importing full snapshot silently");
    let outcome = engine.sync_challenges(false).await?;

    // users left over from a previous partial run get their authoritative
    // scores and any history the catalog snapshots missed
    for idx in engine.store().auteur_ids() {
        if engine.refresh_user(idx, false).await?.is_none() {
            warn!(user = idx, "tracked user unknown to the platform");
        }
    }

    engine.store().persist()?;
    info!(
        challenges = outcome.new_challenges,
        solves = outcome.new_solves,
        "initial import persisted"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::notify::dispatch_pending;
    use crate::notify::queue::NotificationQueue;
    use crate::store::Store;
    use crate::testutil::{
        Delivered, FakeSource, RecordingNotifier, challenge_snapshot, solver, user_snapshot,
    };

    fn engine_with(source: FakeSource) -> (SyncEngine, NotificationQueue, Arc<FakeSource>) {
        let source = Arc::new(source);
        let queue = NotificationQueue::new();
        let engine = SyncEngine::new(source.clone(), Store::in_memory(), queue.clone());
        (engine, queue, source)
    }

    #[tokio::test(start_paused = true)]
    async fn gate_blocks_until_opened() {
        let gate = BootstrapGate::new();
        assert!(!gate.is_open());

        let waiting =
            tokio::time::timeout(Duration::from_millis(10), gate.wait_open()).await;
        assert!(waiting.is_err());

        gate.open();
        gate.open(); // second open is a no-op
        assert!(gate.is_open());
        gate.wait_open().await;
    }

    #[tokio::test]
    async fn cold_start_imports_everything_silently() {
        let source = FakeSource::default();
        source.set_challenges(vec![
            challenge_snapshot(41, "xss", 30, vec![]),
            challenge_snapshot(42, "sqli", 50, vec![solver(7, "alice", 100)]),
        ]);
        source.put_user(user_snapshot(7, "alice", 100, &[(42, 100)]));
        let (engine, queue, _) = engine_with(source);

        assert!(bootstrap_once(&engine, 300).await.unwrap());

        assert_eq!(engine.store().count_challenges(), 2);
        assert_eq!(engine.store().count_solves(), 1);
        assert_eq!(engine.store().auteur(7).unwrap().score, 100);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn second_bootstrap_is_a_no_op() {
        let source = FakeSource::default();
        let catalog: Vec<_> = (1..=300)
            .map(|idx| challenge_snapshot(idx, &format!("challenge {idx}"), 10, vec![]))
            .collect();
        source.set_challenges(catalog);
        let (engine, queue, _) = engine_with(source);

        assert!(bootstrap_once(&engine, 300).await.unwrap());
        let challenges = engine.store().count_challenges();
        let solves = engine.store().count_solves();

        assert!(!bootstrap_once(&engine, 300).await.unwrap());
        assert_eq!(engine.store().count_challenges(), challenges);
        assert_eq!(engine.store().count_solves(), solves);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_bootstrap_retries_transient_failures_then_opens() {
        let source = FakeSource::default();
        source.set_challenges(vec![challenge_snapshot(42, "sqli", 50, vec![])]);
        source.fail_next_challenges();
        let (engine, _, _) = engine_with(source);
        let gate = BootstrapGate::new();

        run_bootstrap(engine.clone(), gate.clone(), 300).await.unwrap();

        assert!(gate.is_open());
        assert_eq!(engine.store().count_challenges(), 1);
    }

    /// The full cold-start-to-first-notification walk: empty store,
    /// threshold 300, a 310-challenge catalog with one tracked user, then
    /// a second solver appears on an existing challenge.
    #[tokio::test]
    async fn first_run_then_incremental_discovery_end_to_end() {
        let source = FakeSource::default();
        let mut catalog: Vec<_> = (1..=309)
            .filter(|idx| *idx != 42)
            .map(|idx| challenge_snapshot(idx, &format!("challenge {idx}"), 10, vec![]))
            .collect();
        catalog.push(challenge_snapshot(42, "sqli", 50, vec![solver(7, "alice", 100)]));
        catalog.push(challenge_snapshot(500, "padding", 10, vec![]));
        source.set_challenges(catalog.clone());
        source.put_user(user_snapshot(7, "alice", 100, &[(42, 100)]));
        let (engine, queue, source) = engine_with(source);
        let gate = BootstrapGate::new();

        run_bootstrap(engine.clone(), gate.clone(), 300).await.unwrap();
        assert_eq!(engine.store().count_challenges(), 310);
        assert_eq!(engine.store().auteur(7).unwrap().score, 100);
        assert_eq!(engine.store().count_solves(), 1);
        assert!(queue.is_empty());

        // next catalog pass: bob has solved challenge 42 at T2
        let last = catalog.len() - 2;
        catalog[last].solvers.push(solver(8, "bob", 200));
        source.set_challenges(catalog);
        engine.sync_challenges(true).await.unwrap();

        let notifier = RecordingNotifier::default();
        assert_eq!(dispatch_pending(&queue, &notifier).await, 1);
        assert!(queue.is_empty());

        let log = notifier.delivered.lock().unwrap();
        assert_eq!(log.len(), 1);
        match &log[0] {
            Delivered::Solve { username, challenge_idx, first_blood, overtake } => {
                assert_eq!(username, "bob");
                assert_eq!(*challenge_idx, 42);
                assert!(*first_blood);
                assert_eq!(overtake.as_ref().unwrap().username, "alice");
            }
            Delivered::Challenge { .. } => panic!("expected a solve delivery"),
        }
    }
}
