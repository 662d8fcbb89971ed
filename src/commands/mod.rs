//! Operator-facing operations: tracking users, inspecting progress,
//! curating scoreboards. Every entry point waits on the bootstrap gate,
//! same as the cycles, and lookups come back as typed outcomes: "not
//! found" and "multiple matches" are results to present, not errors.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};

use crate::bootstrap::BootstrapGate;
use crate::platform::source::PlatformSource;
use crate::platform::types::UserRef;
use crate::rank;
use crate::store::Store;
use crate::store::records::{Auteur, Challenge, Scoreboard};
use crate::sync::SyncEngine;

#[derive(Debug)]
pub enum AddUser {
    Added(Auteur),
    NotFound,
    /// Caller picks one and retries by id.
    Ambiguous(Vec<UserRef>),
}

#[derive(Debug)]
pub enum RemoveUser {
    Removed(Auteur),
    NotFound,
    Ambiguous(Vec<Auteur>),
}

#[derive(Debug)]
pub enum WhoSolved {
    Found { challenge: Challenge, solvers: Vec<(String, DateTime<Utc>)> },
    NotFound,
    Ambiguous(Vec<Challenge>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryStat {
    pub category: String,
    pub solved: usize,
    pub total: usize,
}

#[derive(Debug)]
pub struct Profile {
    pub auteur: Auteur,
    pub rank: usize,
    pub categories: Vec<CategoryStat>,
}

#[derive(Debug)]
pub enum ProfileLookup {
    Found(Profile),
    NotFound,
    Ambiguous(Vec<Auteur>),
}

#[derive(Clone)]
pub struct Commands {
    engine: SyncEngine,
    source: Arc<dyn PlatformSource>,
    store: Store,
    gate: BootstrapGate,
}

impl Commands {
    pub fn new(
        engine: SyncEngine,
        source: Arc<dyn PlatformSource>,
        store: Store,
        gate: BootstrapGate,
    ) -> Self {
        Self { engine, source, store, gate }
    }

    /// Track a user by platform id. Their history is imported without
    /// notifications; adding a veteran must not replay years of solves.
    pub async fn add_user_by_id(&self, idx: u32) -> Result<Option<Auteur>> {
        self.gate.wait_open().await;
        if self.engine.refresh_user(idx, false).await?.is_none() {
            return Ok(None);
        }
        self.store.persist()?;
        Ok(self.store.auteur(idx))
    }

    /// Track a user by display name, via the platform search. Multiple
    /// hits come back for the caller to disambiguate.
    pub async fn add_user_by_name(&self, name: &str) -> Result<AddUser> {
        self.gate.wait_open().await;
        let mut matches = self.source.search_users_by_name(name).await?;
        match matches.len() {
            0 => Ok(AddUser::NotFound),
            1 => {
                let candidate = matches.remove(0);
                match self.add_user_by_id(candidate.idx).await? {
                    Some(auteur) => Ok(AddUser::Added(auteur)),
                    None => Ok(AddUser::NotFound),
                }
            }
            _ => Ok(AddUser::Ambiguous(matches)),
        }
    }

    /// Stop tracking a user, by id or exact username. A purely numeric
    /// query is tried as an id first and falls back to the name path, so
    /// all-digit usernames still work.
    pub async fn remove_user(&self, query: &str) -> Result<RemoveUser> {
        self.gate.wait_open().await;
        if let Ok(idx) = query.parse::<u32>() {
            if let Some(auteur) = self.store.remove_auteur(idx) {
                self.store.persist()?;
                return Ok(RemoveUser::Removed(auteur));
            }
        }
        let matches = self.store.auteurs_by_name(query);
        match matches.len() {
            0 => Ok(RemoveUser::NotFound),
            1 => match self.store.remove_auteur(matches[0].idx) {
                Some(auteur) => {
                    self.store.persist()?;
                    Ok(RemoveUser::Removed(auteur))
                }
                None => Ok(RemoveUser::NotFound),
            },
            _ => Ok(RemoveUser::Ambiguous(matches)),
        }
    }

    pub async fn search_user(&self, name: &str) -> Result<Vec<UserRef>> {
        self.gate.wait_open().await;
        self.source.search_users_by_name(name).await
    }

    /// A tracked user's profile: record, derived rank, and per-category
    /// solved/total counts.
    pub async fn profile(&self, query: &str) -> Result<ProfileLookup> {
        self.gate.wait_open().await;
        let auteur = if let Ok(idx) = query.parse::<u32>() {
            self.store.auteur(idx)
        } else {
            let mut matches = self.store.auteurs_by_name(query);
            match matches.len() {
                0 => None,
                1 => Some(matches.remove(0)),
                _ => return Ok(ProfileLookup::Ambiguous(matches)),
            }
        };
        let Some(auteur) = auteur else {
            return Ok(ProfileLookup::NotFound);
        };

        let rank = rank::rank_of(&self.store, &auteur);
        let categories = self.category_stats(auteur.idx);
        Ok(ProfileLookup::Found(Profile { auteur, rank, categories }))
    }

    fn category_stats(&self, auteur_idx: u32) -> Vec<CategoryStat> {
        let mut stats: BTreeMap<String, CategoryStat> = BTreeMap::new();
        for challenge in self.store.all_challenges() {
            let entry = stats.entry(challenge.category.clone()).or_insert_with(|| CategoryStat {
                category: challenge.category.clone(),
                solved: 0,
                total: 0,
            });
            entry.total += 1;
            if challenge.solvers.contains(&auteur_idx) {
                entry.solved += 1;
            }
        }
        stats.into_values().collect()
    }

    /// Who solved a challenge, looked up by id or title substring.
    pub async fn who_solved(&self, query: &str) -> Result<WhoSolved> {
        self.gate.wait_open().await;
        if let Ok(idx) = query.parse::<u32>() {
            if let Some(challenge) = self.store.challenge(idx) {
                return Ok(self.solvers_for(challenge));
            }
        }
        let mut matches = self.store.search_challenges(query);
        match matches.len() {
            0 => Ok(WhoSolved::NotFound),
            1 => Ok(self.solvers_for(matches.remove(0))),
            _ => Ok(WhoSolved::Ambiguous(matches)),
        }
    }

    fn solvers_for(&self, challenge: Challenge) -> WhoSolved {
        let solvers = self
            .store
            .solvers_of(challenge.idx)
            .into_iter()
            .map(|(auteur, date)| (auteur.username, date))
            .collect();
        WhoSolved::Found { challenge, solvers }
    }

    // ── Scoreboards ──────────────────────────────────────────────

    /// Get-or-create, matching how the bot's operators expect it to
    /// behave. An empty name is rejected.
    pub async fn create_scoreboard(&self, name: &str) -> Result<Scoreboard> {
        self.gate.wait_open().await;
        let name = name.trim();
        if name.is_empty() {
            bail!("scoreboard name cannot be empty");
        }
        if let Some(existing) = self.store.scoreboard(name) {
            return Ok(existing);
        }
        let scoreboard = Scoreboard { name: name.to_string(), members: Vec::new() };
        self.store.upsert_scoreboard(scoreboard.clone());
        self.store.persist()?;
        Ok(scoreboard)
    }

    pub async fn scoreboard(&self, name: &str) -> Result<Option<Scoreboard>> {
        self.gate.wait_open().await;
        Ok(self.store.scoreboard(name))
    }

    /// Members of a named scoreboard in ranking order. `None` when the
    /// scoreboard does not exist.
    pub async fn scoreboard_standings(&self, name: &str) -> Result<Option<Vec<Auteur>>> {
        self.gate.wait_open().await;
        let Some(scoreboard) = self.store.scoreboard(name) else {
            return Ok(None);
        };
        let mut members: Vec<Auteur> = scoreboard
            .members
            .iter()
            .filter_map(|idx| self.store.auteur(*idx))
            .collect();
        members.sort_by(|a, b| b.score.cmp(&a.score).then(a.idx.cmp(&b.idx)));
        Ok(Some(members))
    }

    pub async fn add_to_scoreboard(&self, name: &str, auteur_idx: u32) -> Result<bool> {
        self.gate.wait_open().await;
        let added = self.store.add_scoreboard_member(name, auteur_idx);
        if added {
            self.store.persist()?;
        }
        Ok(added)
    }

    pub async fn remove_from_scoreboard(&self, name: &str, auteur_idx: u32) -> Result<bool> {
        self.gate.wait_open().await;
        let removed = self.store.remove_scoreboard_member(name, auteur_idx);
        if removed {
            self.store.persist()?;
        }
        Ok(removed)
    }

    /// Everyone tracked, in ranking order.
    pub async fn standings(&self) -> Result<Vec<Auteur>> {
        self.gate.wait_open().await;
        Ok(self.store.auteurs_by_score_desc())
    }
}
