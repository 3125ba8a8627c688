// Ranking service: the collaborator-facing operations over a store and a
// clock.
//
// Every edit goes through the same pipeline: load, gate, transform or
// validate, then a version-checked persist. Nothing is written unless the
// whole pipeline succeeds.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::{DraftStore, StoreError};
use crate::draft::player::{default_pool_order, Player, PlayerId, Role, SquadId, WindowId};
use crate::draft::ranked_list::{reconcile, OrderMismatch, RankedList};
use crate::draft::reorder::{move_batch, move_item, ReorderError};
use crate::draft::retention::{
    breakdown, partition, retained_for_window, Partition, PoolBreakdown, RetainedPlayer,
};
use crate::draft::snake::{allocate, AllocationReport, Assignment, Direction, SnakeInput};
use crate::draft::window::{
    select_preferred_window, Clock, DraftWindow, GateError, WindowKind, WindowStatus,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("invalid move: {0}")]
    InvalidMove(ReorderError),

    /// A transform lost or gained entries. Never persisted.
    #[error("reorder changed list length from {expected} to {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("draft window {window} is not open yet (opens at {opens_at})")]
    NotYetOpen {
        window: WindowId,
        opens_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("draft window {window} closed at {closed_at}")]
    WindowClosed {
        window: WindowId,
        closed_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("ranked list changed since version {expected} (now {actual}); refetch and retry")]
    ConcurrentModification { expected: u64, actual: u64 },

    #[error("submitted order does not match the eligible pool: {0}")]
    OrderMismatch(#[from] OrderMismatch),

    #[error("unknown draft window {0}")]
    UnknownWindow(WindowId),

    #[error("role {role} is not drafted in window {window}")]
    RoleNotApplicable { window: WindowId, role: Role },

    #[error("draft window {window} is {status:?}; allocation runs only after lock")]
    WindowNotLocked {
        window: WindowId,
        status: WindowStatus,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl DraftError {
    /// Conditions the caller should render (read-only view, refetch prompt)
    /// rather than treat as faults.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            DraftError::InvalidMove(_)
                | DraftError::NotYetOpen { .. }
                | DraftError::WindowClosed { .. }
                | DraftError::ConcurrentModification { .. }
                | DraftError::OrderMismatch(_)
        )
    }
}

impl From<GateError> for DraftError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::NotYetOpen { window, opens_at } => DraftError::NotYetOpen { window, opens_at },
            GateError::WindowClosed { window, closed_at } => {
                DraftError::WindowClosed { window, closed_at }
            }
        }
    }
}

impl From<ReorderError> for DraftError {
    fn from(err: ReorderError) -> Self {
        match err {
            ReorderError::LengthMismatch { expected, actual } => {
                DraftError::LengthMismatch { expected, actual }
            }
            other => DraftError::InvalidMove(other),
        }
    }
}

impl From<StoreError> for DraftError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                expected, actual, ..
            } => DraftError::ConcurrentModification { expected, actual },
            StoreError::Other(e) => DraftError::Store(e),
        }
    }
}

// ---------------------------------------------------------------------------
// League rules and results
// ---------------------------------------------------------------------------

/// League-wide allocation settings.
#[derive(Debug, Clone, Default)]
pub struct DraftRules {
    /// Round-1 pick order for an ascending role.
    pub draft_order: Vec<SquadId>,
    /// Per-role override of the round-1 direction.
    pub directions: HashMap<Role, Direction>,
    /// Per-role cap on allocation rounds.
    pub max_rounds: HashMap<Role, usize>,
}

impl DraftRules {
    pub fn new(draft_order: Vec<SquadId>) -> Self {
        DraftRules {
            draft_order,
            ..Default::default()
        }
    }

    pub fn direction(&self, role: Role) -> Direction {
        self.directions
            .get(&role)
            .copied()
            .unwrap_or_else(|| role.default_direction())
    }

    pub fn max_rounds(&self, role: Role) -> Option<usize> {
        self.max_rounds.get(&role).copied()
    }
}

/// What a participant sees when opening a ranked list.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedListView {
    pub list: RankedList,
    /// Retained players of this role, shown but never orderable.
    pub retained: Vec<PlayerId>,
    pub can_edit: bool,
    pub closes_in_seconds: i64,
    pub status: WindowStatus,
}

/// A drag gesture translated into ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveRequest {
    Single { item: PlayerId, target: PlayerId },
    Batch { items: Vec<PlayerId>, target: PlayerId },
}

/// Result of a snake allocation run.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    /// Assignments as stored after the run. Rows from earlier runs win.
    pub assignments: Vec<Assignment>,
    /// What this run did; empty when the allocation was already recorded.
    pub report: AllocationReport,
    /// Rows this run actually added.
    pub inserted: usize,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct RankingService<S, C> {
    store: S,
    clock: C,
    rules: DraftRules,
}

impl<S: DraftStore, C: Clock> RankingService<S, C> {
    pub fn new(store: S, clock: C, rules: DraftRules) -> Self {
        RankingService { store, clock, rules }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn rules(&self) -> &DraftRules {
        &self.rules
    }

    fn window(&self, id: WindowId) -> Result<DraftWindow, DraftError> {
        self.store
            .window(id)?
            .ok_or(DraftError::UnknownWindow(id))
    }

    fn window_for_role(&self, id: WindowId, role: Role) -> Result<DraftWindow, DraftError> {
        let window = self.window(id)?;
        if !window.applies_to(role) {
            return Err(DraftError::RoleNotApplicable { window: id, role });
        }
        Ok(window)
    }

    /// Eligible players of `role` for a window, in default pool order.
    pub fn fetch_pool(&self, window: WindowId, role: Role) -> Result<Vec<Player>, DraftError> {
        self.window_for_role(window, role)?;
        let mut players = self.store.players_by_role(role)?;
        players.sort_by(default_pool_order);
        Ok(players)
    }

    /// Players excluded from reordering in this window (all roles).
    pub fn fetch_retained(&self, window: WindowId) -> Result<Vec<RetainedPlayer>, DraftError> {
        let window = self.window(window)?;
        let stored = self.store.retained(window.id)?;
        Ok(retained_for_window(window.kind, &stored))
    }

    fn partition_pool(
        &self,
        window: &DraftWindow,
        pool: &[Player],
    ) -> Result<Partition, DraftError> {
        let retained: HashSet<PlayerId> = retained_for_window(window.kind, &self.store.retained(window.id)?)
            .into_iter()
            .map(|r| r.player)
            .collect();
        let ids: Vec<PlayerId> = pool.iter().map(|p| p.id).collect();
        Ok(partition(&ids, &retained))
    }

    /// Current list for a squad. A stored list is reconciled with the pool;
    /// the reconciled order is written on the next persist. Without a stored
    /// list the default order is returned at version 0, and stored first only
    /// when `create` is set.
    fn current_list(
        &self,
        squad: SquadId,
        window: &DraftWindow,
        role: Role,
        split: &Partition,
        create: bool,
    ) -> Result<RankedList, DraftError> {
        match self.store.load_ranked_list(squad, window.id, role)? {
            Some(stored) => {
                let (order, changed) = reconcile(&stored.order, &split.orderable);
                if changed {
                    info!(
                        squad = %squad, window = %window.id, role = %role,
                        "ranked list reconciled with current pool ({} -> {} players)",
                        stored.len(), order.len()
                    );
                }
                Ok(stored.with_order(order))
            }
            None => {
                let fresh = RankedList::new(squad, window.id, role, split.orderable.clone());
                if !create {
                    return Ok(fresh);
                }
                let created = self.store.create_ranked_list(&fresh)?;
                info!(
                    squad = %squad, window = %window.id, role = %role,
                    "created default ranked list with {} players", created.len()
                );
                Ok(created)
            }
        }
    }

    /// Load the squad's list. While the window is open a missing list is
    /// created from the default order; outside it the default order is
    /// shown at version 0 and nothing is stored.
    pub fn fetch_ranked_list(
        &self,
        squad: SquadId,
        window: WindowId,
        role: Role,
    ) -> Result<RankedListView, DraftError> {
        let window = self.window_for_role(window, role)?;
        let pool = self.fetch_pool(window.id, role)?;
        let split = self.partition_pool(&window, &pool)?;

        let now = self.clock.now();
        let can_edit = window.can_edit(now);
        let list = self.current_list(squad, &window, role, &split, can_edit)?;

        Ok(RankedListView {
            list,
            retained: split.retained,
            can_edit,
            closes_in_seconds: window.remaining_seconds(now),
            status: window.status_at(now),
        })
    }

    /// Replace a squad's order. `based_on` is the version the caller last
    /// saw (0 when no list has been stored yet).
    pub fn persist_ranked_list(
        &self,
        squad: SquadId,
        window: WindowId,
        role: Role,
        order: Vec<PlayerId>,
        based_on: u64,
    ) -> Result<RankedList, DraftError> {
        let window = self.window_for_role(window, role)?;
        window.check_editable(self.clock.now())?;

        let pool = self.fetch_pool(window.id, role)?;
        let split = self.partition_pool(&window, &pool)?;

        let mut list = RankedList::new(squad, window.id, role, order);
        list.validate_against(&split.orderable)?;
        list.version = self.save(&list, based_on)?;
        Ok(list)
    }

    /// Apply a drag gesture to the squad's list and persist the result. The
    /// gate is checked before anything is loaded or created.
    pub fn apply_move(
        &self,
        squad: SquadId,
        window: WindowId,
        role: Role,
        gesture: &MoveRequest,
        based_on: u64,
    ) -> Result<RankedList, DraftError> {
        let window = self.window_for_role(window, role)?;
        window.check_editable(self.clock.now())?;

        let pool = self.fetch_pool(window.id, role)?;
        let split = self.partition_pool(&window, &pool)?;
        let list = self.current_list(squad, &window, role, &split, false)?;
        if list.version != based_on {
            return Err(DraftError::ConcurrentModification {
                expected: based_on,
                actual: list.version,
            });
        }

        let retained: HashSet<PlayerId> = split.retained.iter().copied().collect();
        let result = match gesture {
            MoveRequest::Single { item, target } => move_item(&list, *item, *target, &retained),
            MoveRequest::Batch { items, target } => move_batch(&list, items, *target, &retained),
        };
        let mut moved = match result {
            Ok(list) => list,
            Err(e) if e.is_defect() => {
                error!(squad = %squad, window = %window.id, role = %role, "move aborted: {e}");
                return Err(e.into());
            }
            Err(e) => {
                warn!(squad = %squad, window = %window.id, role = %role, "move rejected: {e}");
                return Err(e.into());
            }
        };

        moved.version = self.save(&moved, based_on)?;
        Ok(moved)
    }

    fn save(&self, list: &RankedList, based_on: u64) -> Result<u64, DraftError> {
        match self.store.save_ranked_list(list, based_on) {
            Ok(version) => Ok(version),
            Err(e @ StoreError::VersionConflict { .. }) => {
                warn!("rejected stale write: {e}");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn fetch_draft_windows(
        &self,
        season: u16,
        kind: Option<WindowKind>,
    ) -> Result<Vec<DraftWindow>, DraftError> {
        Ok(self.store.windows(season, kind)?)
    }

    /// The window a participant should be looking at right now.
    pub fn preferred_window(
        &self,
        season: u16,
        kind: Option<WindowKind>,
    ) -> Result<Option<DraftWindow>, DraftError> {
        let windows = self.fetch_draft_windows(season, kind)?;
        Ok(select_preferred_window(&windows, self.clock.now()).cloned())
    }

    /// Team and role mix of the top of a squad's list.
    pub fn pool_breakdown(
        &self,
        squad: SquadId,
        window: WindowId,
        role: Role,
        top_n: usize,
    ) -> Result<PoolBreakdown, DraftError> {
        let view = self.fetch_ranked_list(squad, window, role)?;
        let pool = self.fetch_pool(window, role)?;
        Ok(breakdown(&pool, &view.list.order, top_n))
    }

    /// Allocate a locked window's role pool to squads.
    ///
    /// Safe to re-run. Once an allocation is recorded it is returned as
    /// stored, even if the pool has changed since. Rows already stored
    /// without a completion mark are kept and the run resumes after them.
    pub fn run_snake_assignment(
        &self,
        window: WindowId,
        role: Role,
    ) -> Result<AllocationOutcome, DraftError> {
        let window = self.window_for_role(window, role)?;
        let status = window.status_at(self.clock.now());
        if status != WindowStatus::Locked {
            return Err(DraftError::WindowNotLocked {
                window: window.id,
                status,
            });
        }

        let pool = self.fetch_pool(window.id, role)?;
        let split = self.partition_pool(&window, &pool)?;
        let stored = self.store.load_assignments(window.id, role)?;

        if self.store.allocation_completed(window.id, role)? {
            let report = recorded_report(&stored, &split.orderable);
            info!(
                window = %window.id, role = %role,
                "allocation already recorded: {} assigned, {} unassigned",
                stored.len(), report.unassigned.len()
            );
            return Ok(AllocationOutcome {
                assignments: stored,
                report,
                inserted: 0,
            });
        }

        let lists: HashMap<SquadId, Vec<PlayerId>> = self
            .store
            .load_ranked_lists(window.id, role)?
            .into_iter()
            .filter(|l| self.rules.draft_order.contains(&l.squad))
            .map(|l| (l.squad, reconcile(&l.order, &split.orderable).0))
            .collect();

        let input = SnakeInput {
            window: window.id,
            role,
            direction: self.rules.direction(role),
            draft_order: self.rules.draft_order.clone(),
            lists,
            pool: split.orderable,
            max_rounds: self.rules.max_rounds(role),
            prior: stored,
        };
        let report = allocate(&input);

        let inserted = self
            .store
            .record_assignments(window.id, role, &report.assignments)?;
        let assignments = self.store.load_assignments(window.id, role)?;

        if inserted < report.assignments.len() {
            warn!(
                window = %window.id, role = %role,
                "{} of {} assignments were already stored; kept stored rows",
                report.assignments.len() - inserted, report.assignments.len()
            );
        }
        info!(
            window = %window.id, role = %role,
            "snake allocation complete: {} assigned over {} rounds, {} skipped turns, {} unassigned",
            assignments.len(), report.rounds, report.skipped.len(), report.unassigned.len()
        );

        Ok(AllocationOutcome {
            assignments,
            report,
            inserted,
        })
    }
}

/// Report for an allocation that was already recorded: no new picks, and
/// pool players the stored rows do not cover listed as unassigned.
fn recorded_report(stored: &[Assignment], pool: &[PlayerId]) -> AllocationReport {
    let assigned: HashSet<PlayerId> = stored.iter().map(|a| a.player).collect();
    AllocationReport {
        assignments: Vec::new(),
        skipped: Vec::new(),
        unassigned: pool
            .iter()
            .copied()
            .filter(|id| !assigned.contains(id))
            .collect(),
        rounds: stored.iter().map(|a| a.round).max().unwrap_or(0),
    }
}
