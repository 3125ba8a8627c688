// Player catalog and retention import.
//
// Reads the players CSV (id,name,role,team,matches,runs,wickets,points) and
// the retention CSV (window_id,player_id,squad_id) and loads them, together
// with the configured draft windows, into the store.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use snakepick_core::db::{Database, DraftStore};
use snakepick_core::draft::player::{Player, PlayerId, PlayerStats, Role, SquadId, WindowId};
use snakepick_core::draft::retention::RetainedPlayer;

use crate::config::Config;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Raw CSV rows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPlayer {
    id: u32,
    name: String,
    role: String,
    #[serde(default)]
    team: String,
    #[serde(default)]
    matches: u32,
    #[serde(default)]
    runs: u32,
    #[serde(default)]
    wickets: u32,
    points: f64,
}

#[derive(Debug, Deserialize)]
struct RawRetained {
    window_id: u32,
    player_id: u32,
    squad_id: u32,
}

/// Retention row bound to the window it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetainedRow {
    pub window: WindowId,
    pub retained: RetainedPlayer,
}

/// What an import wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub players: usize,
    pub windows: usize,
    pub retained: usize,
}

// ---------------------------------------------------------------------------
// Reader-based loaders
// ---------------------------------------------------------------------------

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<Player>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players: Vec<Player> = Vec::new();
    let mut index: HashMap<PlayerId, usize> = HashMap::new();

    for result in reader.deserialize::<RawPlayer>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
                continue;
            }
        };
        let name = raw.name.trim().to_string();
        let Some(role) = Role::from_str_role(&raw.role) else {
            warn!("skipping player '{}': unknown role '{}'", name, raw.role);
            continue;
        };
        if !raw.points.is_finite() {
            warn!("skipping player '{}': non-finite points value", name);
            continue;
        }

        let player = Player {
            id: PlayerId(raw.id),
            name,
            role,
            team: raw.team.trim().to_string(),
            stats: PlayerStats {
                matches: raw.matches,
                runs: raw.runs,
                wickets: raw.wickets,
                points: raw.points,
            },
        };
        match index.get(&player.id) {
            Some(&at) => {
                warn!("duplicate player id {}, using latest row", player.id);
                players[at] = player;
            }
            None => {
                index.insert(player.id, players.len());
                players.push(player);
            }
        }
    }
    Ok(players)
}

fn load_retained_from_reader<R: Read>(rdr: R) -> Result<Vec<RetainedRow>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawRetained>() {
        match result {
            Ok(raw) => rows.push(RetainedRow {
                window: WindowId(raw.window_id),
                retained: RetainedPlayer {
                    player: PlayerId(raw.player_id),
                    squad: SquadId(raw.squad_id),
                },
            }),
            Err(e) => {
                warn!("skipping malformed retention row: {}", e);
            }
        }
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// File loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, CatalogError> {
    std::fs::File::open(path).map_err(|e| CatalogError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load the player catalog from a CSV file.
pub fn load_players(path: &Path) -> Result<Vec<Player>, CatalogError> {
    load_players_from_reader(open(path)?).map_err(|e| CatalogError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load retention rows from a CSV file.
pub fn load_retained(path: &Path) -> Result<Vec<RetainedRow>, CatalogError> {
    load_retained_from_reader(open(path)?).map_err(|e| CatalogError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Load catalog, windows and retention into the store.
///
/// Retention rows pointing at an unknown window or player, or at a squad
/// outside the league, are skipped with a warning.
pub fn import(db: &Database, config: &Config) -> Result<ImportSummary, CatalogError> {
    let players = load_players(Path::new(&config.data_paths.players))?;
    if players.is_empty() {
        return Err(CatalogError::Validation(
            "player CSV produced zero valid rows".into(),
        ));
    }
    db.import_players(&players)?;

    for window in &config.windows {
        db.upsert_window(window)?;
    }

    let rows = match &config.data_paths.retained {
        Some(path) => load_retained(Path::new(path))?,
        None => Vec::new(),
    };
    let retained = store_retained(db, config, &players, &rows)?;

    let summary = ImportSummary {
        players: players.len(),
        windows: config.windows.len(),
        retained,
    };
    info!(
        "Imported {} players, {} windows, {} retained players",
        summary.players, summary.windows, summary.retained
    );
    Ok(summary)
}

fn store_retained(
    db: &Database,
    config: &Config,
    players: &[Player],
    rows: &[RetainedRow],
) -> Result<usize, CatalogError> {
    let windows: HashSet<WindowId> = config.windows.iter().map(|w| w.id).collect();
    let known_players: HashSet<PlayerId> = players.iter().map(|p| p.id).collect();
    let squads: HashSet<u32> = config.league.squads.iter().map(|s| s.id).collect();

    let mut stored = 0;
    for row in rows {
        if !windows.contains(&row.window) {
            warn!("skipping retention of {}: unknown window {}", row.retained.player, row.window);
            continue;
        }
        if !known_players.contains(&row.retained.player) {
            warn!("skipping retention in {}: unknown player {}", row.window, row.retained.player);
            continue;
        }
        if !squads.contains(&row.retained.squad.0) {
            warn!(
                "skipping retention of {}: squad {} is not in the league",
                row.retained.player, row.retained.squad
            );
            continue;
        }
        db.add_retained(row.window, row.retained)?;
        stored += 1;
    }
    Ok(stored)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
