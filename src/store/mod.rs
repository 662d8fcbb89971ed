pub mod records;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::info;

use self::records::{Auteur, Challenge, Scoreboard, Solve};

/// Keyed working set of everything the tracker has observed.
///
/// DashMap-backed — cheap to clone (just an Arc bump). Writes go through
/// the entry API, so each record has a single writer at a time, and the
/// pair-keyed solve index makes "have we seen this before" an O(1) lookup.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    challenges: DashMap<u32, Challenge>,
    auteurs: DashMap<u32, Auteur>,
    solves: DashMap<(u32, u32), Solve>,
    scoreboards: DashMap<String, Scoreboard>,
    path: Option<PathBuf>,
}

/// On-disk layout. The pair index is rebuilt from `solves` on load.
#[derive(Default, Serialize, Deserialize)]
struct StoreSnapshot {
    challenges: Vec<Challenge>,
    auteurs: Vec<Auteur>,
    solves: Vec<Solve>,
    scoreboards: Vec<Scoreboard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The pair was unseen; `solver_count` is the challenge's recorded
    /// solver total including this solve.
    Recorded { solver_count: usize },
    AlreadyRecorded,
}

impl Store {
    /// Store with no backing file; `persist` is a no-op.
    pub fn in_memory() -> Self {
        Self::from_snapshot(StoreSnapshot::default(), None)
    }

    /// Open a store backed by `path`, loading the snapshot if one exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::from_snapshot(StoreSnapshot::default(), Some(path)));
        }
        let raw = std::fs::read(&path)
            .with_context(|| format!("failed to read store snapshot {}", path.display()))?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("corrupt store snapshot {}", path.display()))?;
        let store = Self::from_snapshot(snapshot, Some(path));
        info!(
            challenges = store.count_challenges(),
            auteurs = store.inner.auteurs.len(),
            solves = store.count_solves(),
            "loaded store snapshot"
        );
        Ok(store)
    }

    fn from_snapshot(snapshot: StoreSnapshot, path: Option<PathBuf>) -> Self {
        let inner = Inner {
            challenges: snapshot.challenges.into_iter().map(|c| (c.idx, c)).collect(),
            auteurs: snapshot.auteurs.into_iter().map(|a| (a.idx, a)).collect(),
            solves: snapshot
                .solves
                .into_iter()
                .map(|s| ((s.auteur_idx, s.challenge_idx), s))
                .collect(),
            scoreboards: snapshot
                .scoreboards
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
            path,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Write the snapshot to the backing file (temp file + rename, so a
    /// crash mid-write never leaves a half-written snapshot behind).
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.inner.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_vec_pretty(&self.snapshot()).context("failed to encode store")?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move snapshot into place at {}", path.display()))?;
        Ok(())
    }

    fn snapshot(&self) -> StoreSnapshot {
        let mut challenges: Vec<Challenge> =
            self.inner.challenges.iter().map(|e| e.value().clone()).collect();
        challenges.sort_by_key(|c| c.idx);
        let mut auteurs: Vec<Auteur> =
            self.inner.auteurs.iter().map(|e| e.value().clone()).collect();
        auteurs.sort_by_key(|a| a.idx);
        let mut solves: Vec<Solve> = self.inner.solves.iter().map(|e| e.value().clone()).collect();
        solves.sort_by_key(|s| (s.auteur_idx, s.challenge_idx));
        let mut scoreboards: Vec<Scoreboard> =
            self.inner.scoreboards.iter().map(|e| e.value().clone()).collect();
        scoreboards.sort_by(|a, b| a.name.cmp(&b.name));
        StoreSnapshot { challenges, auteurs, solves, scoreboards }
    }

    // ── Challenges ───────────────────────────────────────────────

    pub fn count_challenges(&self) -> usize {
        self.inner.challenges.len()
    }

    pub fn challenge(&self, idx: u32) -> Option<Challenge> {
        self.inner.challenges.get(&idx).map(|c| c.clone())
    }

    pub fn all_challenges(&self) -> Vec<Challenge> {
        self.inner.challenges.iter().map(|e| e.value().clone()).collect()
    }

    /// Insert when unseen; an existing record is left untouched (published
    /// challenge fields do not change in this model). Returns whether the
    /// challenge was new.
    pub fn insert_challenge_if_new(&self, challenge: Challenge) -> bool {
        match self.inner.challenges.entry(challenge.idx) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(challenge);
                true
            }
        }
    }

    /// Case-insensitive title substring search, ordered by idx.
    pub fn search_challenges(&self, text: &str) -> Vec<Challenge> {
        let needle = text.to_lowercase();
        let mut hits: Vec<Challenge> = self
            .inner
            .challenges
            .iter()
            .filter(|e| e.value().title.to_lowercase().contains(&needle))
            .map(|e| e.value().clone())
            .collect();
        hits.sort_by_key(|c| c.idx);
        hits
    }

    // ── Auteurs ──────────────────────────────────────────────────

    pub fn auteur(&self, idx: u32) -> Option<Auteur> {
        self.inner.auteurs.get(&idx).map(|a| a.clone())
    }

    pub fn auteur_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.inner.auteurs.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Case-insensitive exact username matches, ordered by idx.
    pub fn auteurs_by_name(&self, username: &str) -> Vec<Auteur> {
        let needle = username.to_lowercase();
        let mut hits: Vec<Auteur> = self
            .inner
            .auteurs
            .iter()
            .filter(|e| e.value().username.to_lowercase() == needle)
            .map(|e| e.value().clone())
            .collect();
        hits.sort_by_key(|a| a.idx);
        hits
    }

    /// Create or overwrite from an authoritative platform snapshot.
    pub fn upsert_auteur(&self, idx: u32, username: &str, score: u32) -> Auteur {
        let entry = self
            .inner
            .auteurs
            .entry(idx)
            .and_modify(|a| {
                a.username = username.to_string();
                a.score = score;
            })
            .or_insert_with(|| Auteur { idx, username: username.to_string(), score });
        entry.value().clone()
    }

    /// Create-or-credit from a challenge-side observation: a first sighting
    /// starts at `points`, a known user gains `points`.
    pub fn credit_solver(&self, idx: u32, username: &str, points: u32) -> Auteur {
        let entry = self
            .inner
            .auteurs
            .entry(idx)
            .and_modify(|a| {
                a.username = username.to_string();
                a.score += points;
            })
            .or_insert_with(|| Auteur { idx, username: username.to_string(), score: points });
        entry.value().clone()
    }

    /// Remove a user and everything hanging off them: their solves, their
    /// entries in challenge solver lists, and their scoreboard memberships.
    pub fn remove_auteur(&self, idx: u32) -> Option<Auteur> {
        let (_, auteur) = self.inner.auteurs.remove(&idx)?;
        let stale: Vec<(u32, u32)> = self
            .inner
            .solves
            .iter()
            .filter(|e| e.key().0 == idx)
            .map(|e| *e.key())
            .collect();
        for key in stale {
            self.inner.solves.remove(&key);
        }
        for mut challenge in self.inner.challenges.iter_mut() {
            challenge.solvers.retain(|&solver| solver != idx);
        }
        for mut scoreboard in self.inner.scoreboards.iter_mut() {
            scoreboard.members.retain(|&member| member != idx);
        }
        Some(auteur)
    }

    /// Everyone, in ranking order (score desc, idx asc).
    pub fn auteurs_by_score_desc(&self) -> Vec<Auteur> {
        let mut all: Vec<Auteur> = self.inner.auteurs.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.score.cmp(&a.score).then(a.idx.cmp(&b.idx)));
        all
    }

    // ── Solves ───────────────────────────────────────────────────

    /// Record a solve at most once. The vacant-entry check-and-insert holds
    /// the shard lock across the decision, so two cycles observing the same
    /// external event cannot both record it.
    pub fn record_solve(&self, solve: Solve) -> RecordOutcome {
        let auteur_idx = solve.auteur_idx;
        let challenge_idx = solve.challenge_idx;
        match self.inner.solves.entry((auteur_idx, challenge_idx)) {
            Entry::Occupied(_) => return RecordOutcome::AlreadyRecorded,
            Entry::Vacant(slot) => {
                slot.insert(solve);
            }
        }
        let solver_count = match self.inner.challenges.get_mut(&challenge_idx) {
            Some(mut challenge) => {
                challenge.solvers.push(auteur_idx);
                challenge.solvers.len()
            }
            None => 0,
        };
        RecordOutcome::Recorded { solver_count }
    }

    pub fn solve(&self, auteur_idx: u32, challenge_idx: u32) -> Option<Solve> {
        self.inner.solves.get(&(auteur_idx, challenge_idx)).map(|s| s.clone())
    }

    pub fn count_solves(&self) -> usize {
        self.inner.solves.len()
    }

    /// Who solved a challenge, with validation dates, oldest first.
    pub fn solvers_of(&self, challenge_idx: u32) -> Vec<(Auteur, DateTime<Utc>)> {
        let mut solvers: Vec<(Auteur, DateTime<Utc>)> = self
            .inner
            .solves
            .iter()
            .filter(|e| e.key().1 == challenge_idx)
            .filter_map(|e| self.auteur(e.key().0).map(|a| (a, e.value().date)))
            .collect();
        solvers.sort_by_key(|(auteur, date)| (*date, auteur.idx));
        solvers
    }

    // ── Scoreboards ──────────────────────────────────────────────

    pub fn scoreboard(&self, name: &str) -> Option<Scoreboard> {
        self.inner.scoreboards.get(name).map(|s| s.clone())
    }

    pub fn upsert_scoreboard(&self, scoreboard: Scoreboard) {
        self.inner.scoreboards.insert(scoreboard.name.clone(), scoreboard);
    }

    /// Returns false when the scoreboard or the user is unknown.
    pub fn add_scoreboard_member(&self, name: &str, auteur_idx: u32) -> bool {
        if self.auteur(auteur_idx).is_none() {
            return false;
        }
        match self.inner.scoreboards.get_mut(name) {
            Some(mut scoreboard) => {
                if !scoreboard.members.contains(&auteur_idx) {
                    scoreboard.members.push(auteur_idx);
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_scoreboard_member(&self, name: &str, auteur_idx: u32) -> bool {
        match self.inner.scoreboards.get_mut(name) {
            Some(mut scoreboard) => {
                scoreboard.members.retain(|&member| member != auteur_idx);
                true
            }
            None => false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }
}
