use async_trait::async_trait;

use super::types::{ChallengeSnapshot, UserRef, UserSnapshot};

/// Read-only view of the external platform.
///
/// Implementations are rate-limited and fail transiently; callers absorb
/// errors and retry on their own cadence rather than propagating them.
#[async_trait]
pub trait PlatformSource: Send + Sync {
    /// The current full challenge catalog, solver lists included.
    async fn fetch_all_challenges(&self) -> anyhow::Result<Vec<ChallengeSnapshot>>;

    /// A single user's profile and solve history. `None` when the platform
    /// does not know the id.
    async fn fetch_user(&self, idx: u32) -> anyhow::Result<Option<UserSnapshot>>;

    /// Users whose display name matches the query. Names are not unique;
    /// the caller disambiguates.
    async fn search_users_by_name(&self, name: &str) -> anyhow::Result<Vec<UserRef>>;
}
