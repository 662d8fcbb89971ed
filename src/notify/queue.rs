use std::sync::{Arc, Mutex};

use crate::rank::Overtake;
use crate::store::records::{Auteur, Challenge};

/// A fact detected by the sync engine, waiting to be delivered.
#[derive(Debug, Clone)]
pub enum Event {
    NewChallenge(Challenge),
    NewSolve {
        auteur: Auteur,
        challenge: Challenge,
        first_blood: bool,
        overtake: Option<Overtake>,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewChallenge(_) => "challenge",
            Event::NewSolve { .. } => "solve",
        }
    }
}

/// Unbounded, append-ordered buffer decoupling detection cadence from
/// delivery cadence. Producers append at any time; the single consumer
/// takes the whole backlog in one swap.
#[derive(Clone, Default)]
pub struct NotificationQueue {
    pending: Arc<Mutex<Vec<Event>>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never fails: a poisoned lock (a panicked producer) is absorbed and
    /// the buffer keeps accepting events.
    pub fn enqueue(&self, event: Event) {
        crate::metrics::prometheus::record_event_enqueued(event.kind());
        let mut pending = self.lock();
        pending.push(event);
        crate::metrics::prometheus::set_queue_depth(pending.len());
    }

    /// Atomically take everything queued so far, in enqueue order.
    pub fn drain_all(&self) -> Vec<Event> {
        let mut pending = self.lock();
        crate::metrics::prometheus::set_queue_depth(0);
        std::mem::take(&mut *pending)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Event>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testutil::challenge_record;

    #[test]
    fn drain_returns_the_backlog_then_nothing() {
        let queue = NotificationQueue::new();
        queue.enqueue(Event::NewChallenge(challenge_record(1, 10)));
        queue.enqueue(Event::NewChallenge(challenge_record(2, 20)));

        let drained = queue.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(queue.drain_all().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_order_is_preserved() {
        let queue = NotificationQueue::new();
        for idx in [3, 1, 2] {
            queue.enqueue(Event::NewChallenge(challenge_record(idx, 10)));
        }

        let order: Vec<u32> = queue
            .drain_all()
            .into_iter()
            .map(|event| match event {
                Event::NewChallenge(challenge) => challenge.idx,
                Event::NewSolve { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec![3, 1, 2]);
    }
}
