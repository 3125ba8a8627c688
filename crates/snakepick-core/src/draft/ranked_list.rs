// A squad's ordered preference list for one (window, role).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::player::{PlayerId, Role, SquadId, WindowId};

/// Ordered preference list owned by one squad for one window and role.
///
/// `order` is a permutation of the eligible pool minus retained players.
/// Rank is positional: the first entry is rank 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedList {
    pub squad: SquadId,
    pub window: WindowId,
    pub role: Role,
    pub order: Vec<PlayerId>,
    /// Persisted revision. 0 means the list has never been stored.
    pub version: u64,
}

/// Why an order failed permutation validation against the eligible pool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error(
    "order is not a permutation of the eligible pool \
     (duplicates={duplicates:?}, missing={missing:?}, unexpected={unexpected:?})"
)]
pub struct OrderMismatch {
    pub duplicates: Vec<PlayerId>,
    pub missing: Vec<PlayerId>,
    pub unexpected: Vec<PlayerId>,
}

impl RankedList {
    /// A never-persisted list with the given order.
    pub fn new(squad: SquadId, window: WindowId, role: Role, order: Vec<PlayerId>) -> Self {
        RankedList {
            squad,
            window,
            role,
            order,
            version: 0,
        }
    }

    /// Same owner key and version, different order.
    pub fn with_order(&self, order: Vec<PlayerId>) -> Self {
        RankedList {
            order,
            ..self.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.order.contains(&id)
    }

    /// 1-based rank of `id`, if listed.
    pub fn position_of(&self, id: PlayerId) -> Option<usize> {
        self.order.iter().position(|&p| p == id).map(|i| i + 1)
    }

    /// `(rank, player)` pairs, rank dense from 1.
    pub fn ranks(&self) -> impl Iterator<Item = (usize, PlayerId)> + '_ {
        self.order.iter().enumerate().map(|(i, &id)| (i + 1, id))
    }

    /// Check that this list is exactly a permutation of `expected`.
    pub fn validate_against(&self, expected: &[PlayerId]) -> Result<(), OrderMismatch> {
        validate_permutation(&self.order, expected)
    }
}

/// Verify `order` contains every id of `expected` exactly once and nothing
/// else.
pub fn validate_permutation(order: &[PlayerId], expected: &[PlayerId]) -> Result<(), OrderMismatch> {
    let expected_set: HashSet<PlayerId> = expected.iter().copied().collect();
    let mut seen: HashSet<PlayerId> = HashSet::with_capacity(order.len());
    let mut mismatch = OrderMismatch::default();

    for &id in order {
        if !seen.insert(id) {
            mismatch.duplicates.push(id);
        } else if !expected_set.contains(&id) {
            mismatch.unexpected.push(id);
        }
    }
    mismatch.missing = expected
        .iter()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();

    if mismatch.duplicates.is_empty() && mismatch.missing.is_empty() && mismatch.unexpected.is_empty()
    {
        Ok(())
    } else {
        Err(mismatch)
    }
}

/// Bring a stored order back in line with the current eligible pool.
///
/// Ids that are still eligible keep their stored relative order; ids that
/// are no longer eligible (removed from the catalog, newly retained) are
/// dropped; newly eligible ids are appended in `eligible` order. Returns the
/// reconciled order and whether it differs from `stored`.
pub fn reconcile(stored: &[PlayerId], eligible: &[PlayerId]) -> (Vec<PlayerId>, bool) {
    let eligible_set: HashSet<PlayerId> = eligible.iter().copied().collect();
    let mut seen: HashSet<PlayerId> = HashSet::with_capacity(eligible.len());

    let mut order: Vec<PlayerId> = stored
        .iter()
        .copied()
        .filter(|id| eligible_set.contains(id) && seen.insert(*id))
        .collect();
    order.extend(eligible.iter().copied().filter(|id| !seen.contains(id)));

    let changed = order.as_slice() != stored;
    (order, changed)
}
