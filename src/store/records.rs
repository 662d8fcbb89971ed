use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scored task on the platform. `idx` is the platform's stable id and
/// `score` never changes once the challenge is published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub idx: u32,
    pub title: String,
    pub category: String,
    pub difficulty: String,
    pub score: u32,
    /// Solver ids in the order their solves were recorded.
    pub solvers: Vec<u32>,
}

/// A tracked user. Rank is always derived from relative scores, never
/// stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auteur {
    pub idx: u32,
    pub username: String,
    pub score: u32,
}

/// Immutable once recorded; at most one per (auteur, challenge) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solve {
    pub auteur_idx: u32,
    pub challenge_idx: u32,
    pub date: DateTime<Utc>,
}

/// A named, curated subset of tracked users, for display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scoreboard {
    pub name: String,
    pub members: Vec<u32>,
}
