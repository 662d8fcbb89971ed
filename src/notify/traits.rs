use async_trait::async_trait;

use crate::rank::Overtake;
use crate::store::records::{Auteur, Challenge};

/// Presentation-side sink for detected events.
///
/// Implementations render and deliver (a chat embed, a webhook, a log
/// line). Failures come back as errors so the dispatch loop can isolate
/// them to the one event that failed.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_solve(
        &self,
        auteur: &Auteur,
        challenge: &Challenge,
        first_blood: bool,
        overtake: Option<&Overtake>,
    ) -> anyhow::Result<()>;

    async fn notify_challenge(&self, challenge: &Challenge) -> anyhow::Result<()>;
}
