//! Shared fakes and builders for the inline test modules.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::notify::traits::Notifier;
use crate::platform::source::PlatformSource;
use crate::platform::types::{
    ChallengeSnapshot, SolveSnapshot, SolverSnapshot, UserRef, UserSnapshot,
};
use crate::rank::Overtake;
use crate::store::records::{Auteur, Challenge};

pub(crate) fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub(crate) fn challenge_snapshot(
    idx: u32,
    title: &str,
    score: u32,
    solvers: Vec<SolverSnapshot>,
) -> ChallengeSnapshot {
    ChallengeSnapshot {
        idx,
        title: title.to_string(),
        category: "Web - Serveur".to_string(),
        difficulty: "Facile".to_string(),
        score,
        solvers,
    }
}

pub(crate) fn solver(idx: u32, username: &str, at: i64) -> SolverSnapshot {
    SolverSnapshot { idx, username: username.to_string(), date: ts(at) }
}

pub(crate) fn user_snapshot(
    idx: u32,
    username: &str,
    score: u32,
    solves: &[(u32, i64)],
) -> UserSnapshot {
    UserSnapshot {
        idx,
        username: username.to_string(),
        score,
        solves: solves
            .iter()
            .map(|(challenge_idx, at)| SolveSnapshot { challenge_idx: *challenge_idx, date: ts(*at) })
            .collect(),
    }
}

pub(crate) fn challenge_record(idx: u32, score: u32) -> Challenge {
    Challenge {
        idx,
        title: format!("challenge {idx}"),
        category: "Web - Serveur".to_string(),
        difficulty: "Facile".to_string(),
        score,
        solvers: Vec::new(),
    }
}

pub(crate) fn auteur_record(idx: u32, username: &str, score: u32) -> Auteur {
    Auteur { idx, username: username.to_string(), score }
}

/// In-memory platform stand-in. `fail_next_challenges` makes exactly the
/// next catalog fetch fail, to exercise the retry-next-tick paths.
#[derive(Default)]
pub(crate) struct FakeSource {
    challenges: Mutex<Vec<ChallengeSnapshot>>,
    users: Mutex<HashMap<u32, UserSnapshot>>,
    search_hits: Mutex<Vec<UserRef>>,
    fail_challenges: AtomicBool,
}

impl FakeSource {
    pub fn set_challenges(&self, challenges: Vec<ChallengeSnapshot>) {
        *self.challenges.lock().unwrap() = challenges;
    }

    pub fn put_user(&self, user: UserSnapshot) {
        self.users.lock().unwrap().insert(user.idx, user);
    }

    pub fn add_search_hit(&self, idx: u32, username: &str) {
        self.search_hits
            .lock()
            .unwrap()
            .push(UserRef { idx, username: username.to_string() });
    }

    pub fn fail_next_challenges(&self) {
        self.fail_challenges.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlatformSource for FakeSource {
    async fn fetch_all_challenges(&self) -> anyhow::Result<Vec<ChallengeSnapshot>> {
        if self.fail_challenges.swap(false, Ordering::SeqCst) {
            bail!("simulated platform outage");
        }
        Ok(self.challenges.lock().unwrap().clone())
    }

    async fn fetch_user(&self, idx: u32) -> anyhow::Result<Option<UserSnapshot>> {
        Ok(self.users.lock().unwrap().get(&idx).cloned())
    }

    async fn search_users_by_name(&self, name: &str) -> anyhow::Result<Vec<UserRef>> {
        let needle = name.to_lowercase();
        Ok(self
            .search_hits
            .lock()
            .unwrap()
            .iter()
            .filter(|hit| hit.username.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivered {
    Solve { username: String, challenge_idx: u32, first_blood: bool, overtake: Option<Overtake> },
    Challenge { idx: u32 },
}

/// Records every delivery in order; challenge ids listed in
/// `reject_challenges` fail instead, to exercise failure isolation.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub delivered: Mutex<Vec<Delivered>>,
    pub reject_challenges: Mutex<Vec<u32>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_solve(
        &self,
        auteur: &Auteur,
        challenge: &Challenge,
        first_blood: bool,
        overtake: Option<&Overtake>,
    ) -> anyhow::Result<()> {
        self.delivered.lock().unwrap().push(Delivered::Solve {
            username: auteur.username.clone(),
            challenge_idx: challenge.idx,
            first_blood,
            overtake: overtake.cloned(),
        });
        Ok(())
    }

    async fn notify_challenge(&self, challenge: &Challenge) -> anyhow::Result<()> {
        if self.reject_challenges.lock().unwrap().contains(&challenge.idx) {
            bail!("simulated delivery failure");
        }
        self.delivered.lock().unwrap().push(Delivered::Challenge { idx: challenge.idx });
        Ok(())
    }
}
