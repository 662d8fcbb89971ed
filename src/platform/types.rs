use chrono::{DateTime, Utc};

/// Point-in-time view of one challenge as the platform reports it,
/// including everyone who has validated it so far.
#[derive(Debug, Clone)]
pub struct ChallengeSnapshot {
    pub idx: u32,
    pub title: String,
    pub category: String,
    pub difficulty: String,
    pub score: u32,
    pub solvers: Vec<SolverSnapshot>,
}

#[derive(Debug, Clone)]
pub struct SolverSnapshot {
    pub idx: u32,
    pub username: String,
    pub date: DateTime<Utc>,
}

/// One user's profile and full validation history.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    pub idx: u32,
    pub username: String,
    pub score: u32,
    pub solves: Vec<SolveSnapshot>,
}

#[derive(Debug, Clone)]
pub struct SolveSnapshot {
    pub challenge_idx: u32,
    pub date: DateTime<Utc>,
}

/// Minimal search hit; enough to disambiguate and then fetch the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub idx: u32,
    pub username: String,
}
