// Retention filter: splits a pool into orderable and retained players.
//
// Retained players are commitments carried over from the previous period.
// They are shown alongside a ranked list but never reordered, never used as
// move targets, and never counted in pool composition statistics.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::player::{Player, PlayerId, Role, SquadId};
use super::window::WindowKind;

/// A prior-period commitment of a player to a squad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetainedPlayer {
    pub player: PlayerId,
    pub squad: SquadId,
}

/// Result of splitting a pool by retention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Pool members that take part in ranking, in pool order.
    pub orderable: Vec<PlayerId>,
    /// Pool members that are retained, in pool order.
    pub retained: Vec<PlayerId>,
}

/// Split `pool` (in pool order) into orderable and retained ids.
pub fn partition(pool: &[PlayerId], retained: &HashSet<PlayerId>) -> Partition {
    let (retained_ids, orderable): (Vec<PlayerId>, Vec<PlayerId>) =
        pool.iter().copied().partition(|id| retained.contains(id));
    Partition {
        orderable,
        retained: retained_ids,
    }
}

/// Retention only constrains mid-season windows; a pre-season window starts
/// from an empty slate.
pub fn retained_for_window(kind: WindowKind, retained: &[RetainedPlayer]) -> Vec<RetainedPlayer> {
    match kind {
        WindowKind::PreSeason => Vec::new(),
        WindowKind::MidSeason => retained.to_vec(),
    }
}

/// Role and team composition of the top of an orderable list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBreakdown {
    /// How many players were actually counted (min of `top_n` and list size).
    pub considered: usize,
    pub by_role: BTreeMap<Role, usize>,
    pub by_team: BTreeMap<String, usize>,
}

/// Count roles and teams among the first `top_n` orderable ids.
///
/// Only `orderable` is consulted, so retained players never skew the
/// numbers. Ids missing from `players` are ignored.
pub fn breakdown(players: &[Player], orderable: &[PlayerId], top_n: usize) -> PoolBreakdown {
    let by_id: HashMap<PlayerId, &Player> = players.iter().map(|p| (p.id, p)).collect();
    let mut result = PoolBreakdown::default();

    for id in orderable.iter().take(top_n) {
        let Some(player) = by_id.get(id) else {
            continue;
        };
        result.considered += 1;
        *result.by_role.entry(player.role).or_insert(0) += 1;
        *result.by_team.entry(player.team.clone()).or_insert(0) += 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::player::PlayerStats;

    fn ids(raw: &[u32]) -> Vec<PlayerId> {
        raw.iter().map(|&n| PlayerId(n)).collect()
    }

    fn player(id: u32, role: Role, team: &str) -> Player {
        Player {
            id: PlayerId(id),
            name: format!("Player {id}"),
            role,
            team: team.to_string(),
            stats: PlayerStats::default(),
        }
    }

    #[test]
    fn partition_preserves_pool_order() {
        let retained: HashSet<PlayerId> = ids(&[2, 5]).into_iter().collect();
        let p = partition(&ids(&[5, 1, 2, 3]), &retained);
        assert_eq!(p.orderable, ids(&[1, 3]));
        assert_eq!(p.retained, ids(&[5, 2]));
    }

    #[test]
    fn partition_ignores_retained_outside_pool() {
        let retained: HashSet<PlayerId> = ids(&[99]).into_iter().collect();
        let p = partition(&ids(&[1, 2]), &retained);
        assert_eq!(p.orderable, ids(&[1, 2]));
        assert!(p.retained.is_empty());
    }

    #[test]
    fn partition_is_deterministic() {
        let retained: HashSet<PlayerId> = ids(&[3]).into_iter().collect();
        let pool = ids(&[4, 3, 2, 1]);
        assert_eq!(partition(&pool, &retained), partition(&pool, &retained));
    }

    #[test]
    fn pre_season_window_has_no_retention() {
        let retained = vec![RetainedPlayer {
            player: PlayerId(1),
            squad: SquadId(1),
        }];
        assert!(retained_for_window(WindowKind::PreSeason, &retained).is_empty());
        assert_eq!(retained_for_window(WindowKind::MidSeason, &retained), retained);
    }

    #[test]
    fn breakdown_counts_top_n_only() {
        let players = vec![
            player(1, Role::Bat, "CSK"),
            player(2, Role::Bowl, "MI"),
            player(3, Role::Bat, "MI"),
            player(4, Role::Wk, "RCB"),
        ];
        let b = breakdown(&players, &ids(&[1, 2, 3, 4]), 3);
        assert_eq!(b.considered, 3);
        assert_eq!(b.by_role.get(&Role::Bat), Some(&2));
        assert_eq!(b.by_role.get(&Role::Bowl), Some(&1));
        assert_eq!(b.by_role.get(&Role::Wk), None);
        assert_eq!(b.by_team.get("MI"), Some(&2));
    }

    #[test]
    fn breakdown_excludes_retained() {
        let players = vec![
            player(1, Role::Bat, "CSK"),
            player(2, Role::Bowl, "MI"),
            player(3, Role::Bowl, "MI"),
        ];
        let retained: HashSet<PlayerId> = ids(&[2, 3]).into_iter().collect();
        let p = partition(&ids(&[2, 3, 1]), &retained);
        let b = breakdown(&players, &p.orderable, 10);
        assert_eq!(b.considered, 1);
        assert_eq!(b.by_role.get(&Role::Bowl), None);
        assert_eq!(b.by_team.get("CSK"), Some(&1));
    }
}
