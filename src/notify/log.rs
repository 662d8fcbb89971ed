use async_trait::async_trait;
use tracing::info;

use super::traits::Notifier;
use crate::rank::Overtake;
use crate::store::records::{Auteur, Challenge};

/// Structured-log notifier. Placeholder for the chat transport; carries
/// the same fields a chat embed would render.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_solve(
        &self,
        auteur: &Auteur,
        challenge: &Challenge,
        first_blood: bool,
        overtake: Option<&Overtake>,
    ) -> anyhow::Result<()> {
        info!(
            user = %auteur.username,
            challenge = %challenge.title,
            category = %challenge.category,
            difficulty = %challenge.difficulty,
            points = challenge.score,
            new_score = auteur.score,
            first_blood,
            "NEW SOLVE"
        );
        if let Some(overtake) = overtake {
            info!(
                user = %auteur.username,
                next = %overtake.username,
                points_needed = overtake.points_needed,
                "overtake gap"
            );
        }
        Ok(())
    }

    async fn notify_challenge(&self, challenge: &Challenge) -> anyhow::Result<()> {
        info!(
            challenge = %challenge.title,
            category = %challenge.category,
            difficulty = %challenge.difficulty,
            points = challenge.score,
            "NEW CHALLENGE"
        );
        Ok(())
    }
}
