use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bootstrap::BootstrapGate;
use crate::notify::queue::{Event, NotificationQueue};
use crate::platform::source::PlatformSource;
use crate::platform::types::{ChallengeSnapshot, SolverSnapshot, UserSnapshot};
use crate::rank;
use crate::store::records::{Auteur, Challenge, Solve};
use crate::store::{RecordOutcome, Store};

/// A solve is first blood while the challenge's recorded solver count,
/// including the new solve, stays at or under this (first and second
/// solver both count).
const FIRST_BLOOD_MAX_SOLVERS: usize = 2;

/// Counters for one diff pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub new_challenges: usize,
    pub new_solves: usize,
}

impl std::ops::AddAssign for SyncOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.new_challenges += rhs.new_challenges;
        self.new_solves += rhs.new_solves;
    }
}

/// Diffs fresh platform snapshots against the store and turns anything
/// unseen into records plus, unless suppressed, queued notifications.
///
/// Both discovery paths (bulk catalog, per-user refresh) funnel through
/// the same record-and-announce step, so a solve observed by both is
/// still recorded and announced once.
#[derive(Clone)]
pub struct SyncEngine {
    source: Arc<dyn PlatformSource>,
    store: Store,
    queue: NotificationQueue,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn PlatformSource>, store: Store, queue: NotificationQueue) -> Self {
        Self { source, store, queue }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// One full catalog pass. A fetch failure aborts before anything is
    /// persisted, so a failed pass leaves no partial diff behind.
    pub async fn sync_challenges(&self, announce: bool) -> Result<SyncOutcome> {
        let started = Instant::now();
        let snapshots = self.source.fetch_all_challenges().await?;
        crate::metrics::prometheus::record_fetch("challenges", started.elapsed());

        let mut outcome = SyncOutcome::default();
        for snapshot in &snapshots {
            outcome += self.apply_challenge(snapshot, announce);
        }
        Ok(outcome)
    }

    /// Refresh one user from the platform, creating them on first sight.
    /// `Ok(None)` when the platform no longer knows the id.
    pub async fn refresh_user(&self, idx: u32, announce: bool) -> Result<Option<SyncOutcome>> {
        let started = Instant::now();
        let Some(snapshot) = self.source.fetch_user(idx).await? else {
            return Ok(None);
        };
        crate::metrics::prometheus::record_fetch("user", started.elapsed());
        Ok(Some(self.apply_user(&snapshot, announce)))
    }

    /// Diff one challenge snapshot: an unknown idx becomes a record (and
    /// an event), then every solver unseen for this challenge is recorded.
    fn apply_challenge(&self, snapshot: &ChallengeSnapshot, announce: bool) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        let record = Challenge {
            idx: snapshot.idx,
            title: snapshot.title.clone(),
            category: snapshot.category.clone(),
            difficulty: snapshot.difficulty.clone(),
            score: snapshot.score,
            solvers: Vec::new(),
        };
        if self.store.insert_challenge_if_new(record.clone()) {
            outcome.new_challenges += 1;
            debug!(challenge = %record.title, idx = record.idx, "new challenge discovered");
            if announce {
                self.queue.enqueue(Event::NewChallenge(record));
            }
        }

        for solver in &snapshot.solvers {
            outcome += self.apply_solver(snapshot.idx, solver, announce);
        }
        outcome
    }

    fn apply_solver(&self, challenge_idx: u32, solver: &SolverSnapshot, announce: bool) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let Some(challenge) = self.store.challenge(challenge_idx) else {
            return outcome;
        };

        let solve = Solve { auteur_idx: solver.idx, challenge_idx, date: solver.date };
        match self.store.record_solve(solve) {
            RecordOutcome::AlreadyRecorded => {}
            RecordOutcome::Recorded { solver_count } => {
                // score committed before the overtake question is asked
                let auteur = self.store.credit_solver(solver.idx, &solver.username, challenge.score);
                outcome.new_solves += 1;
                if announce {
                    self.announce_solve(&auteur, &challenge, solver_count);
                }
            }
        }
        outcome
    }

    /// Diff one user snapshot: the platform's score is authoritative, then
    /// every unseen solve goes through the shared record-and-announce step.
    fn apply_user(&self, snapshot: &UserSnapshot, announce: bool) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let auteur = self.store.upsert_auteur(snapshot.idx, &snapshot.username, snapshot.score);

        for solve in &snapshot.solves {
            let Some(challenge) = self.store.challenge(solve.challenge_idx) else {
                debug!(
                    user = %auteur.username,
                    challenge = solve.challenge_idx,
                    "solved challenge not in catalog yet; deferring"
                );
                continue;
            };

            let record = Solve {
                auteur_idx: snapshot.idx,
                challenge_idx: solve.challenge_idx,
                date: solve.date,
            };
            match self.store.record_solve(record) {
                RecordOutcome::AlreadyRecorded => {}
                RecordOutcome::Recorded { solver_count } => {
                    outcome.new_solves += 1;
                    if announce {
                        self.announce_solve(&auteur, &challenge, solver_count);
                    }
                }
            }
        }
        outcome
    }

    fn announce_solve(&self, auteur: &Auteur, challenge: &Challenge, solver_count: usize) {
        let overtake = rank::overtake_info(&self.store, auteur);
        let first_blood = solver_count <= FIRST_BLOOD_MAX_SOLVERS;
        info!(
            user = %auteur.username,
            challenge = %challenge.title,
            first_blood,
            "new solve detected"
        );
        self.queue.enqueue(Event::NewSolve {
            auteur: auteur.clone(),
            challenge: challenge.clone(),
            first_blood,
            overtake,
        });
    }
}

/// Slow catalog discovery cycle: one full pass per period, forever.
pub async fn run_challenge_cycle(
    engine: SyncEngine,
    gate: BootstrapGate,
    period: Duration,
) -> Result<()> {
    gate.wait_open().await;
    info!(period_secs = period.as_secs(), "challenge discovery cycle started");
    loop {
        match engine.sync_challenges(true).await {
            Ok(outcome) => {
                if outcome.new_challenges > 0 || outcome.new_solves > 0 {
                    info!(
                        new_challenges = outcome.new_challenges,
                        new_solves = outcome.new_solves,
                        "challenge sync found news"
                    );
                    if let Err(err) = engine.store().persist() {
                        warn!(error = %err, "failed to persist store");
                    }
                }
            }
            Err(err) => {
                crate::metrics::prometheus::record_fetch_error("challenges");
                warn!(error = %err, "challenge sync failed; retrying next tick");
            }
        }
        sleep(period).await;
    }
}

/// Fast refresh cycle: round-robins over tracked users, one fetch per
/// tick, to stay inside the platform's rate limit.
pub async fn run_user_refresh_cycle(
    engine: SyncEngine,
    gate: BootstrapGate,
    delay: Duration,
) -> Result<()> {
    gate.wait_open().await;
    info!("user refresh cycle started");
    loop {
        let ids = engine.store().auteur_ids();
        if ids.is_empty() {
            sleep(delay).await;
            continue;
        }

        let mut recorded_any = false;
        for idx in ids {
            match engine.refresh_user(idx, true).await {
                Ok(Some(outcome)) => {
                    if outcome.new_solves > 0 {
                        recorded_any = true;
                    }
                }
                Ok(None) => warn!(user = idx, "tracked user unknown to the platform"),
                Err(err) => {
                    crate::metrics::prometheus::record_fetch_error("user");
                    warn!(error = %err, user = idx, "user refresh failed; retrying next pass");
                }
            }
            sleep(delay).await;
        }

        if recorded_any {
            if let Err(err) = engine.store().persist() {
                warn!(error = %err, "failed to persist store");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testutil::{FakeSource, challenge_snapshot, solver, user_snapshot};

    fn engine_with(source: FakeSource) -> (SyncEngine, NotificationQueue, Arc<FakeSource>) {
        let source = Arc::new(source);
        let queue = NotificationQueue::new();
        let engine = SyncEngine::new(source.clone(), Store::in_memory(), queue.clone());
        (engine, queue, source)
    }

    #[tokio::test]
    async fn announces_unknown_challenges_and_solvers() {
        let source = FakeSource::default();
        source.set_challenges(vec![challenge_snapshot(42, "sqli", 50, vec![solver(7, "alice", 100)])]);
        let (engine, queue, _) = engine_with(source);

        let outcome = engine.sync_challenges(true).await.unwrap();
        assert_eq!(outcome, SyncOutcome { new_challenges: 1, new_solves: 1 });

        let events = queue.drain_all();
        assert_eq!(events.len(), 2);
        assert_eq!(engine.store().auteur(7).unwrap().score, 50);
    }

    #[tokio::test]
    async fn a_recorded_solve_is_never_announced_again() {
        let source = FakeSource::default();
        source.set_challenges(vec![challenge_snapshot(42, "sqli", 50, vec![solver(7, "alice", 100)])]);
        let (engine, queue, source) = engine_with(source);

        engine.sync_challenges(false).await.unwrap();
        assert!(queue.is_empty());

        // same solver reported by both discovery paths, repeatedly
        source.put_user(user_snapshot(7, "alice", 50, &[(42, 100)]));
        let outcome = engine.sync_challenges(true).await.unwrap();
        assert_eq!(outcome, SyncOutcome::default());
        let refreshed = engine.refresh_user(7, true).await.unwrap().unwrap();
        assert_eq!(refreshed.new_solves, 0);

        assert!(queue.is_empty());
        assert_eq!(engine.store().count_solves(), 1);
    }

    #[tokio::test]
    async fn first_blood_stops_at_the_third_solver() {
        let source = FakeSource::default();
        source.set_challenges(vec![challenge_snapshot(
            42,
            "sqli",
            50,
            vec![solver(1, "alice", 100), solver(2, "bob", 200), solver(3, "carol", 300)],
        )]);
        let (engine, queue, _) = engine_with(source);

        engine.sync_challenges(true).await.unwrap();

        let bloods: Vec<bool> = queue
            .drain_all()
            .into_iter()
            .filter_map(|event| match event {
                Event::NewSolve { first_blood, .. } => Some(first_blood),
                Event::NewChallenge(_) => None,
            })
            .collect();
        assert_eq!(bloods, vec![true, true, false]);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_no_partial_diff() {
        let source = FakeSource::default();
        source.set_challenges(vec![challenge_snapshot(42, "sqli", 50, vec![])]);
        source.fail_next_challenges();
        let (engine, queue, _) = engine_with(source);

        assert!(engine.sync_challenges(true).await.is_err());
        assert_eq!(engine.store().count_challenges(), 0);
        assert!(queue.is_empty());

        // the next tick sees the same snapshot and succeeds
        let outcome = engine.sync_challenges(true).await.unwrap();
        assert_eq!(outcome.new_challenges, 1);
    }

    #[tokio::test]
    async fn user_refresh_defers_solves_for_unknown_challenges() {
        let source = FakeSource::default();
        source.put_user(user_snapshot(7, "alice", 100, &[(42, 100)]));
        let (engine, queue, source) = engine_with(source);

        let outcome = engine.refresh_user(7, true).await.unwrap().unwrap();
        assert_eq!(outcome.new_solves, 0);
        assert_eq!(engine.store().count_solves(), 0);
        assert!(queue.is_empty());

        // once the catalog knows the challenge, the next refresh records it
        source.set_challenges(vec![challenge_snapshot(42, "sqli", 50, vec![])]);
        engine.sync_challenges(false).await.unwrap();
        let outcome = engine.refresh_user(7, true).await.unwrap().unwrap();
        assert_eq!(outcome.new_solves, 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn user_refresh_takes_the_platform_score_as_authoritative() {
        let source = FakeSource::default();
        source.set_challenges(vec![challenge_snapshot(42, "sqli", 50, vec![solver(7, "alice", 100)])]);
        source.put_user(user_snapshot(7, "alice", 175, &[(42, 100)]));
        let (engine, _, _) = engine_with(source);

        // challenge-side discovery can only credit the challenge's points
        engine.sync_challenges(false).await.unwrap();
        assert_eq!(engine.store().auteur(7).unwrap().score, 50);

        engine.refresh_user(7, false).await.unwrap();
        assert_eq!(engine.store().auteur(7).unwrap().score, 175);
    }

    #[tokio::test]
    async fn a_new_solver_is_announced_with_overtake_info() {
        let source = FakeSource::default();
        source.set_challenges(vec![challenge_snapshot(42, "sqli", 50, vec![solver(7, "alice", 100)])]);
        let (engine, queue, source) = engine_with(source);

        engine.sync_challenges(false).await.unwrap();
        engine.store().upsert_auteur(7, "alice", 100);
        queue.drain_all();

        source.set_challenges(vec![challenge_snapshot(
            42,
            "sqli",
            50,
            vec![solver(7, "alice", 100), solver(8, "bob", 200)],
        )]);
        engine.sync_challenges(true).await.unwrap();

        let events = queue.drain_all();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::NewSolve { auteur, challenge, first_blood, overtake } => {
                assert_eq!(auteur.username, "bob");
                assert_eq!(challenge.idx, 42);
                assert!(*first_blood);
                let overtake = overtake.as_ref().unwrap();
                assert_eq!(overtake.username, "alice");
                assert_eq!(overtake.points_needed, 50);
            }
            Event::NewChallenge(_) => panic!("expected a solve event"),
        }
    }
}
