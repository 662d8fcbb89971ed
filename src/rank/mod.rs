//! Competitive statistics derived from the store.
//!
//! Kept synchronous and infallible: these read committed state, never
//! perform I/O, and may race harmlessly with other users' score updates —
//! the results are advisory, not transactional.

use crate::store::Store;
use crate::store::records::Auteur;

/// Gap to the nearest competitor strictly above a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overtake {
    pub username: String,
    pub points_needed: u32,
}

/// The competitor with the smallest score strictly greater than the
/// user's, i.e. the next one to overtake. Equal scores among candidates
/// fall back to the higher idx, the one adjacent in ranking order (which
/// sorts score desc, idx asc). `None` when the user is at the top.
///
/// Call with the already-committed record so the gap reflects the score
/// update that triggered the question.
pub fn overtake_info(store: &Store, auteur: &Auteur) -> Option<Overtake> {
    let mut next: Option<Auteur> = None;
    for other in store.auteurs_by_score_desc() {
        if other.score <= auteur.score {
            continue;
        }
        let closer = match &next {
            None => true,
            Some(current) => {
                other.score < current.score
                    || (other.score == current.score && other.idx > current.idx)
            }
        };
        if closer {
            next = Some(other);
        }
    }
    next.map(|n| Overtake { username: n.username, points_needed: n.score - auteur.score })
}

/// 1-based position under (score desc, idx asc).
pub fn rank_of(store: &Store, auteur: &Auteur) -> usize {
    let above = store
        .auteurs_by_score_desc()
        .iter()
        .filter(|other| {
            other.score > auteur.score || (other.score == auteur.score && other.idx < auteur.idx)
        })
        .count();
    above + 1
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn store_with(users: &[(u32, &str, u32)]) -> Store {
        let store = Store::in_memory();
        for (idx, username, score) in users {
            store.upsert_auteur(*idx, username, *score);
        }
        store
    }

    #[test]
    fn points_to_the_nearest_higher_competitor() {
        let store = store_with(&[(1, "alice", 100), (2, "bob", 60), (3, "carol", 40)]);
        let carol = store.auteur(3).unwrap();

        let overtake = overtake_info(&store, &carol).unwrap();
        assert_eq!(overtake.username, "bob");
        assert_eq!(overtake.points_needed, 20);
    }

    #[test]
    fn top_user_has_nobody_to_overtake() {
        let store = store_with(&[(1, "alice", 100), (2, "bob", 60)]);
        let alice = store.auteur(1).unwrap();
        assert_eq!(overtake_info(&store, &alice), None);
    }

    #[test]
    fn gap_shrinks_as_score_rises_then_vanishes_at_the_top() {
        let store = store_with(&[(1, "alice", 100), (2, "bob", 40)]);

        let before = overtake_info(&store, &store.auteur(2).unwrap()).unwrap();
        let bob = store.upsert_auteur(2, "bob", 70);
        let after = overtake_info(&store, &bob).unwrap();
        assert!(after.points_needed < before.points_needed);

        let bob = store.upsert_auteur(2, "bob", 120);
        assert_eq!(overtake_info(&store, &bob), None);
    }

    #[test]
    fn tie_among_candidates_resolves_to_the_adjacent_rank() {
        let store = store_with(&[(1, "alice", 100), (2, "bob", 100), (3, "carol", 50)]);
        let carol = store.auteur(3).unwrap();

        // alice and bob share rank scores; bob (higher idx) sits directly
        // above carol in (score desc, idx asc) order
        let overtake = overtake_info(&store, &carol).unwrap();
        assert_eq!(overtake.username, "bob");
        assert_eq!(overtake.points_needed, 50);
    }

    #[test]
    fn ranks_are_deterministic_for_equal_scores() {
        let store = store_with(&[(1, "alice", 100), (2, "bob", 100), (3, "carol", 50)]);
        assert_eq!(rank_of(&store, &store.auteur(1).unwrap()), 1);
        assert_eq!(rank_of(&store, &store.auteur(2).unwrap()), 2);
        assert_eq!(rank_of(&store, &store.auteur(3).unwrap()), 3);
    }
}
