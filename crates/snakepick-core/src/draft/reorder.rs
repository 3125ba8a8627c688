// Reorder engine: pure transforms from a ranked list and a drag gesture to a
// new ranked list.
//
// Both operations insert the moved players immediately AFTER the target, so
// a single-player batch behaves exactly like `move_item`. The input list is
// never modified; persistence is the caller's job.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, error};

use super::player::PlayerId;
use super::ranked_list::RankedList;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    #[error("cannot move {0} relative to itself")]
    SameItem(PlayerId),

    #[error("{0} is not in the ranked list")]
    UnknownItem(PlayerId),

    #[error("move target {0} is not in the ranked list")]
    UnknownTarget(PlayerId),

    #[error("{0} is retained and cannot be moved")]
    RetainedItem(PlayerId),

    #[error("retained player {0} cannot be used as a move target")]
    RetainedTarget(PlayerId),

    #[error("no players selected to move")]
    EmptySelection,

    #[error("{0} is selected more than once")]
    DuplicateSelection(PlayerId),

    /// Internal invariant violation: the transform lost or gained entries.
    #[error("reorder produced {actual} entries from a list of {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

impl ReorderError {
    /// True for invariant violations (a bug), false for rejected gestures.
    pub fn is_defect(&self) -> bool {
        matches!(self, ReorderError::LengthMismatch { .. })
    }
}

/// Move `item` to sit immediately after `target`, keeping every other
/// player's relative order.
pub fn move_item(
    list: &RankedList,
    item: PlayerId,
    target: PlayerId,
    retained: &HashSet<PlayerId>,
) -> Result<RankedList, ReorderError> {
    if item == target {
        return Err(ReorderError::SameItem(item));
    }
    if retained.contains(&item) {
        return Err(ReorderError::RetainedItem(item));
    }
    if retained.contains(&target) {
        return Err(ReorderError::RetainedTarget(target));
    }
    if !list.contains(item) {
        return Err(ReorderError::UnknownItem(item));
    }
    if !list.contains(target) {
        return Err(ReorderError::UnknownTarget(target));
    }

    let order = relocate(&list.order, &[item], target);
    let moved = finish(list, order)?;
    debug!(
        squad = %list.squad, window = %list.window, role = %list.role,
        "moved {} after {}", item, target
    );
    Ok(moved)
}

/// Move a selection of players as one contiguous block immediately after
/// `target`.
///
/// The block keeps the players' relative order from the current list, not
/// the order they were selected in. When `target` is itself part of the
/// selection it stays where it is and the rest of the selection gathers
/// right behind it.
pub fn move_batch(
    list: &RankedList,
    items: &[PlayerId],
    target: PlayerId,
    retained: &HashSet<PlayerId>,
) -> Result<RankedList, ReorderError> {
    if items.is_empty() {
        return Err(ReorderError::EmptySelection);
    }

    let mut selected: HashSet<PlayerId> = HashSet::with_capacity(items.len());
    for &id in items {
        if !selected.insert(id) {
            return Err(ReorderError::DuplicateSelection(id));
        }
        if retained.contains(&id) {
            return Err(ReorderError::RetainedItem(id));
        }
        if !list.contains(id) {
            return Err(ReorderError::UnknownItem(id));
        }
    }
    if retained.contains(&target) {
        return Err(ReorderError::RetainedTarget(target));
    }
    if !list.contains(target) {
        return Err(ReorderError::UnknownTarget(target));
    }

    let block: Vec<PlayerId> = list
        .order
        .iter()
        .copied()
        .filter(|id| selected.contains(id))
        .collect();
    let order = relocate(&list.order, &block, target);
    let moved = finish(list, order)?;
    debug!(
        squad = %list.squad, window = %list.window, role = %list.role,
        "moved {} players after {}", block.len(), target
    );
    Ok(moved)
}

/// Remove `block` from `order` and splice it back in right after `target`.
/// A `target` inside `block` keeps its place (first occurrence wins).
fn relocate(order: &[PlayerId], block: &[PlayerId], target: PlayerId) -> Vec<PlayerId> {
    let moving: HashSet<PlayerId> = block.iter().copied().filter(|&id| id != target).collect();

    let mut result: Vec<PlayerId> = Vec::with_capacity(order.len());
    for &id in order {
        if moving.contains(&id) {
            continue;
        }
        result.push(id);
        if id == target {
            result.extend(block.iter().copied().filter(|&b| b != target));
        }
    }
    result
}

/// Enforce the length invariant before handing a new list back.
fn finish(list: &RankedList, order: Vec<PlayerId>) -> Result<RankedList, ReorderError> {
    if order.len() != list.order.len() {
        error!(
            squad = %list.squad, window = %list.window, role = %list.role,
            "reorder defect: list of {} became {}; mutation aborted",
            list.order.len(),
            order.len()
        );
        return Err(ReorderError::LengthMismatch {
            expected: list.order.len(),
            actual: order.len(),
        });
    }
    Ok(list.with_order(order))
}
