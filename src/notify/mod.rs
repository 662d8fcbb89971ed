pub mod log;
pub mod queue;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::bootstrap::BootstrapGate;
use self::queue::{Event, NotificationQueue};
use self::traits::Notifier;

/// Deliver one drained batch: solves first, then new challenges (the
/// delivery order contract). A failed delivery is logged and skipped; the
/// rest of the batch still goes out. Returns how many events were
/// delivered.
pub async fn dispatch_pending(queue: &NotificationQueue, notifier: &dyn Notifier) -> usize {
    let events = queue.drain_all();
    if events.is_empty() {
        return 0;
    }

    let (solves, challenges): (Vec<Event>, Vec<Event>) = events
        .into_iter()
        .partition(|event| matches!(event, Event::NewSolve { .. }));

    let mut delivered = 0;
    for event in solves.into_iter().chain(challenges) {
        let result = match &event {
            Event::NewSolve { auteur, challenge, first_blood, overtake } => {
                notifier
                    .notify_solve(auteur, challenge, *first_blood, overtake.as_ref())
                    .await
            }
            Event::NewChallenge(challenge) => notifier.notify_challenge(challenge).await,
        };
        match result {
            Ok(()) => {
                delivered += 1;
                crate::metrics::prometheus::record_event_delivered(event.kind());
            }
            Err(err) => {
                warn!(error = %err, kind = event.kind(), "notification delivery failed; skipping event");
                crate::metrics::prometheus::record_delivery_error(event.kind());
            }
        }
    }
    delivered
}

/// Drains the queue on a fixed cadence once the gate opens, for the
/// lifetime of the process.
pub async fn run_dispatch_loop(
    gate: BootstrapGate,
    queue: NotificationQueue,
    notifier: Arc<dyn Notifier>,
    period: Duration,
) -> anyhow::Result<()> {
    gate.wait_open().await;
    debug!("dispatch loop started");
    loop {
        let delivered = dispatch_pending(&queue, notifier.as_ref()).await;
        if delivered > 0 {
            debug!(delivered, "dispatched notifications");
        }
        sleep(period).await;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::queue::{Event, NotificationQueue};
    use super::*;
    use crate::testutil::{Delivered, RecordingNotifier, auteur_record, challenge_record};

    #[tokio::test]
    async fn solves_are_delivered_before_new_challenges() {
        let queue = NotificationQueue::new();
        queue.enqueue(Event::NewChallenge(challenge_record(1, 10)));
        queue.enqueue(Event::NewSolve {
            auteur: auteur_record(7, "alice", 50),
            challenge: challenge_record(2, 50),
            first_blood: false,
            overtake: None,
        });

        let notifier = RecordingNotifier::default();
        let delivered = dispatch_pending(&queue, &notifier).await;
        assert_eq!(delivered, 2);

        let log = notifier.delivered.lock().unwrap();
        assert!(matches!(log[0], Delivered::Solve { .. }));
        assert!(matches!(log[1], Delivered::Challenge { idx: 1 }));
    }

    #[tokio::test]
    async fn one_failed_delivery_does_not_block_the_rest() {
        let queue = NotificationQueue::new();
        queue.enqueue(Event::NewChallenge(challenge_record(1, 10)));
        queue.enqueue(Event::NewChallenge(challenge_record(2, 20)));

        let notifier = RecordingNotifier::default();
        notifier.reject_challenges.lock().unwrap().push(1);

        let delivered = dispatch_pending(&queue, &notifier).await;
        assert_eq!(delivered, 1);

        let log = notifier.delivered.lock().unwrap();
        assert_eq!(*log, vec![Delivered::Challenge { idx: 2 }]);
        drop(log);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn empty_queue_is_a_quiet_tick() {
        let queue = NotificationQueue::new();
        let notifier = RecordingNotifier::default();
        assert_eq!(dispatch_pending(&queue, &notifier).await, 0);
        assert!(notifier.delivered.lock().unwrap().is_empty());
    }
}
