// Snake allocation: turns locked ranked lists into player -> squad
// assignments.
//
// Round 1 walks the squad draft order forwards (ascending roles) or backwards
// (descending roles); each later round reverses the previous one. On its turn
// a squad takes the first player on its list nobody has taken yet. The whole
// run is a pure function of the draft order, the lists and the pool.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::player::{PlayerId, Role, SquadId, WindowId};

/// Round-1 traversal of the squad draft order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "ascending")]
    Ascending,
    #[serde(rename = "descending")]
    Descending,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::Descending => Direction::Ascending,
        }
    }
}

/// Direction used in a 1-based `round`.
pub fn round_direction(base: Direction, round: usize) -> Direction {
    if round % 2 == 1 {
        base
    } else {
        base.reversed()
    }
}

/// Squad order for a 1-based `round`.
pub fn round_order(draft_order: &[SquadId], base: Direction, round: usize) -> Vec<SquadId> {
    match round_direction(base, round) {
        Direction::Ascending => draft_order.to_vec(),
        Direction::Descending => draft_order.iter().rev().copied().collect(),
    }
}

/// One allocated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub player: PlayerId,
    pub squad: SquadId,
    pub role: Role,
    pub window: WindowId,
    /// 1-based round number.
    pub round: u32,
    /// 1-based overall pick number within this (window, role) allocation.
    pub pick: u32,
}

/// A turn that passed without a pick because the squad's list was exhausted
/// while unassigned players remained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTurn {
    pub squad: SquadId,
    pub round: u32,
}

/// Everything needed for one (window, role) allocation.
#[derive(Debug, Clone)]
pub struct SnakeInput {
    pub window: WindowId,
    pub role: Role,
    pub direction: Direction,
    /// Round-1 draft order, before applying `direction`.
    pub draft_order: Vec<SquadId>,
    /// Locked lists by squad. Squads without an entry rank the pool in
    /// `pool` order.
    pub lists: HashMap<SquadId, Vec<PlayerId>>,
    /// Orderable pool in default order (retained players already removed).
    pub pool: Vec<PlayerId>,
    /// Optional cap on rounds for this role.
    pub max_rounds: Option<usize>,
    /// Assignments already recorded for this (window, role). Their players
    /// stay taken and the run resumes at the turn after the last of them.
    pub prior: Vec<Assignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReport {
    /// In pick order.
    pub assignments: Vec<Assignment>,
    pub skipped: Vec<SkippedTurn>,
    /// Pool players nobody received (round cap hit, or unlisted everywhere).
    pub unassigned: Vec<PlayerId>,
    pub rounds: u32,
}

impl AllocationReport {
    pub fn squad_of(&self, player: PlayerId) -> Option<SquadId> {
        self.assignments
            .iter()
            .find(|a| a.player == player)
            .map(|a| a.squad)
    }

    pub fn picks_for(&self, squad: SquadId) -> Vec<PlayerId> {
        self.assignments
            .iter()
            .filter(|a| a.squad == squad)
            .map(|a| a.player)
            .collect()
    }
}

/// Run the snake allocation.
///
/// `report.assignments` holds only the picks made by this run; picks in
/// `input.prior` are never repeated or renumbered.
pub fn allocate(input: &SnakeInput) -> AllocationReport {
    let pool_set: HashSet<PlayerId> = input.pool.iter().copied().collect();
    let mut taken: HashSet<PlayerId> = input
        .prior
        .iter()
        .map(|a| a.player)
        .filter(|id| pool_set.contains(id))
        .collect();
    // Per-squad scan cursor: everything before it is already taken, so a
    // squad never rescans the head of its list.
    let mut cursors: HashMap<SquadId, usize> = HashMap::new();
    let mut report = AllocationReport::default();

    if input.draft_order.is_empty() {
        report.unassigned = input.pool.clone();
        return report;
    }

    let last = input.prior.iter().max_by_key(|a| a.pick);
    let mut next_pick = last.map_or(1, |a| a.pick + 1);
    let (mut round, mut resume_at) = match last {
        Some(a) => {
            let order = round_order(&input.draft_order, input.direction, a.round as usize);
            match order.iter().position(|&s| s == a.squad) {
                Some(i) if i + 1 < order.len() => (a.round as usize - 1, i + 1),
                _ => (a.round as usize, 0),
            }
        }
        None => (0, 0),
    };
    if last.is_some() {
        debug!(
            window = %input.window, role = %input.role,
            "resuming after {} recorded picks at round {}", input.prior.len(), round + 1
        );
    }

    while taken.len() < pool_set.len() {
        if input.max_rounds.is_some_and(|max| round >= max) {
            break;
        }
        round += 1;
        let partial = resume_at > 0;

        let mut picked_this_round = 0usize;
        let order = round_order(&input.draft_order, input.direction, round);
        for squad in order.into_iter().skip(resume_at) {
            if taken.len() == pool_set.len() {
                break;
            }
            let list = input
                .lists
                .get(&squad)
                .map(Vec::as_slice)
                .unwrap_or(input.pool.as_slice());
            let cursor = cursors.entry(squad).or_insert(0);

            let choice = loop {
                match list.get(*cursor) {
                    None => break None,
                    Some(id) if pool_set.contains(id) && !taken.contains(id) => break Some(*id),
                    Some(_) => *cursor += 1,
                }
            };

            match choice {
                Some(player) => {
                    taken.insert(player);
                    *cursor += 1;
                    picked_this_round += 1;
                    let pick = next_pick;
                    next_pick += 1;
                    debug!(
                        window = %input.window, role = %input.role,
                        "round {round} pick {pick}: {squad} takes {player}"
                    );
                    report.assignments.push(Assignment {
                        player,
                        squad,
                        role: input.role,
                        window: input.window,
                        round: round as u32,
                        pick,
                    });
                }
                None => {
                    warn!(
                        window = %input.window, role = %input.role,
                        "round {round}: {squad} has no available player left on its list; turn passes"
                    );
                    report.skipped.push(SkippedTurn {
                        squad,
                        round: round as u32,
                    });
                }
            }
        }
        resume_at = 0;

        // A resumed partial round says nothing about squads earlier in it.
        if picked_this_round == 0 && !partial {
            break;
        }
    }

    report.rounds = round as u32;
    report.unassigned = input
        .pool
        .iter()
        .copied()
        .filter(|id| !taken.contains(id))
        .collect();

    info!(
        window = %input.window, role = %input.role,
        "allocation finished: {} assigned, {} skipped turns, {} unassigned over {} rounds",
        report.assignments.len(),
        report.skipped.len(),
        report.unassigned.len(),
        report.rounds
    );
    report
}
