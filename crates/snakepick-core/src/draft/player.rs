// Player, squad and window identity plus playing roles.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::snake::Direction;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable identifier of a player in the external catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

/// Stable identifier of a squad (one per league participant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SquadId(pub u32);

/// Stable identifier of a draft window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl fmt::Display for SquadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Playing role. Each role has its own ranked list per squad per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "BAT")]
    Bat,
    #[serde(rename = "BOWL")]
    Bowl,
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "WK")]
    Wk,
}

impl Role {
    /// Every role, in display order.
    pub const ALL_ROLES: [Role; 4] = [Role::Bat, Role::Bowl, Role::All, Role::Wk];

    /// Parse a role string.
    ///
    /// Accepts the short codes plus the long forms used by catalog exports:
    /// - "BAT" / "BATTER" -> Bat
    /// - "BOWL" / "BOWLER" -> Bowl
    /// - "ALL" / "AR" / "ALLROUNDER" / "ALL-ROUNDER" -> All
    /// - "WK" / "KEEPER" / "WICKETKEEPER" -> Wk
    pub fn from_str_role(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BAT" | "BATTER" => Some(Role::Bat),
            "BOWL" | "BOWLER" => Some(Role::Bowl),
            "ALL" | "AR" | "ALLROUNDER" | "ALL-ROUNDER" => Some(Role::All),
            "WK" | "KEEPER" | "WICKETKEEPER" => Some(Role::Wk),
            _ => None,
        }
    }

    /// Short code used in storage and configuration.
    pub fn code(&self) -> &'static str {
        match self {
            Role::Bat => "BAT",
            Role::Bowl => "BOWL",
            Role::All => "ALL",
            Role::Wk => "WK",
        }
    }

    /// Round-1 pick direction when the league does not override it.
    /// Batters and all-rounders start from the top of the draft order;
    /// keepers and bowlers start from the bottom.
    pub fn default_direction(&self) -> Direction {
        match self {
            Role::Bat | Role::All => Direction::Ascending,
            Role::Wk | Role::Bowl => Direction::Descending,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Aggregate scoring stats carried by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub matches: u32,
    pub runs: u32,
    pub wickets: u32,
    pub points: f64,
}

/// A player from the external catalog. Read-only to the draft core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    pub team: String,
    #[serde(default)]
    pub stats: PlayerStats,
}

/// Ordering used for a freshly created ranked list: most points first, ties
/// broken by player id so the order is fully deterministic.
pub fn default_pool_order(a: &Player, b: &Player) -> Ordering {
    b.stats
        .points
        .partial_cmp(&a.stats.points)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}
