// SQLite persistence layer for the player catalog, draft windows, ranked
// lists and allocation results.

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::draft::player::{Player, PlayerId, PlayerStats, Role, SquadId, WindowId};
use crate::draft::ranked_list::RankedList;
use crate::draft::retention::RetainedPlayer;
use crate::draft::snake::Assignment;
use crate::draft::window::{DraftWindow, WindowKind};

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic-lock failure: someone stored a newer revision first.
    #[error(
        "ranked list {squad}/{window}/{role} is at version {actual}, write was based on {expected}"
    )]
    VersionConflict {
        squad: SquadId,
        window: WindowId,
        role: Role,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence operations the ranking service depends on.
pub trait DraftStore: Send + Sync {
    fn upsert_player(&self, player: &Player) -> Result<()>;
    fn players_by_role(&self, role: Role) -> Result<Vec<Player>>;

    fn upsert_window(&self, window: &DraftWindow) -> Result<()>;
    fn window(&self, id: WindowId) -> Result<Option<DraftWindow>>;
    /// Windows of a season, optionally filtered by kind, in sequence order.
    fn windows(&self, season: u16, kind: Option<WindowKind>) -> Result<Vec<DraftWindow>>;
    fn all_windows(&self) -> Result<Vec<DraftWindow>>;

    fn add_retained(&self, window: WindowId, retained: RetainedPlayer) -> Result<()>;
    fn retained(&self, window: WindowId) -> Result<Vec<RetainedPlayer>>;

    fn load_ranked_list(&self, squad: SquadId, window: WindowId, role: Role)
        -> Result<Option<RankedList>>;
    fn load_ranked_lists(&self, window: WindowId, role: Role) -> Result<Vec<RankedList>>;
    /// Store a list only if none exists yet; returns whichever list is stored
    /// afterwards.
    fn create_ranked_list(&self, list: &RankedList) -> Result<RankedList>;
    /// Version-checked write. Returns the new version.
    fn save_ranked_list(&self, list: &RankedList, expected_version: u64) -> Result<u64, StoreError>;

    /// Write an allocation. Rows already stored for a player win over the
    /// new ones. Returns how many rows were actually inserted.
    fn record_assignments(&self, window: WindowId, role: Role, assignments: &[Assignment])
        -> Result<usize>;
    fn load_assignments(&self, window: WindowId, role: Role) -> Result<Vec<Assignment>>;
    fn allocation_completed(&self, window: WindowId, role: Role) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// SQLite-backed draft store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id       INTEGER PRIMARY KEY,
                name     TEXT NOT NULL,
                role     TEXT NOT NULL,
                team     TEXT NOT NULL,
                matches  INTEGER NOT NULL DEFAULT 0,
                runs     INTEGER NOT NULL DEFAULT 0,
                wickets  INTEGER NOT NULL DEFAULT 0,
                points   REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS draft_windows (
                id       INTEGER PRIMARY KEY,
                season   INTEGER NOT NULL,
                kind     TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                open_at  TEXT NOT NULL,
                lock_at  TEXT NOT NULL,
                roles    TEXT NOT NULL,
                UNIQUE(season, kind, sequence)
            );

            CREATE TABLE IF NOT EXISTS retained_players (
                window_id INTEGER NOT NULL REFERENCES draft_windows(id),
                player_id INTEGER NOT NULL REFERENCES players(id),
                squad_id  INTEGER NOT NULL,
                PRIMARY KEY (window_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS ranked_lists (
                squad_id     INTEGER NOT NULL,
                window_id    INTEGER NOT NULL REFERENCES draft_windows(id),
                role         TEXT NOT NULL,
                player_order TEXT NOT NULL,
                version      INTEGER NOT NULL,
                updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (squad_id, window_id, role)
            );

            CREATE TABLE IF NOT EXISTS assignments (
                window_id  INTEGER NOT NULL REFERENCES draft_windows(id),
                role       TEXT NOT NULL,
                player_id  INTEGER NOT NULL REFERENCES players(id),
                squad_id   INTEGER NOT NULL,
                round      INTEGER NOT NULL,
                pick       INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (window_id, role, player_id)
            );

            CREATE TABLE IF NOT EXISTS draft_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_players_role ON players(role);",
        )
        .context("failed to create players role index")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Load a previously saved JSON value by `key`. Returns `None` if the key
    /// does not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM draft_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query draft state")?;

        json_str
            .map(|s| serde_json::from_str(&s).context("failed to deserialize state value"))
            .transpose()
    }

    /// Key under which a finished (window, role) allocation is marked.
    fn allocation_key(window: WindowId, role: Role) -> String {
        format!("allocation:{}:{}", window.0, role.code())
    }

    /// Import a whole catalog in a single transaction.
    pub fn import_players(&self, players: &[Player]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin import transaction")?;
        for player in players {
            upsert_player_row(&tx, player).context("failed to upsert player in batch")?;
        }
        tx.commit().context("failed to commit import")?;
        Ok(players.len())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Write a JSON value under `key`. Uses INSERT OR REPLACE so repeated saves
/// overwrite the previous value.
fn save_state(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
    let json_str = serde_json::to_string(value).context("failed to serialize state value")?;
    conn.execute(
        "INSERT OR REPLACE INTO draft_state (key, value) VALUES (?1, ?2)",
        params![key, json_str],
    )
    .context("failed to save state")?;
    Ok(())
}

fn upsert_player_row(conn: &Connection, player: &Player) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO players (id, name, role, team, matches, runs, wickets, points)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name    = excluded.name,
            role    = excluded.role,
            team    = excluded.team,
            matches = excluded.matches,
            runs    = excluded.runs,
            wickets = excluded.wickets,
            points  = excluded.points",
        params![
            player.id.0,
            player.name,
            player.role.code(),
            player.team,
            player.stats.matches,
            player.stats.runs,
            player.stats.wickets,
            player.stats.points,
        ],
    )
}

fn parse_role(code: &str) -> Result<Role> {
    Role::from_str_role(code).ok_or_else(|| anyhow!("unknown role code in database: {code}"))
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in database: {text}"))
}

/// Raw `draft_windows` row before decoding.
struct WindowRow {
    id: u32,
    season: u16,
    kind: String,
    sequence: u32,
    open_at: String,
    lock_at: String,
    roles: String,
}

impl WindowRow {
    const COLUMNS: &'static str = "id, season, kind, sequence, open_at, lock_at, roles";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(WindowRow {
            id: row.get(0)?,
            season: row.get(1)?,
            kind: row.get(2)?,
            sequence: row.get(3)?,
            open_at: row.get(4)?,
            lock_at: row.get(5)?,
            roles: row.get(6)?,
        })
    }

    fn decode(self) -> Result<DraftWindow> {
        let kind = WindowKind::from_code(&self.kind)
            .ok_or_else(|| anyhow!("unknown window kind in database: {}", self.kind))?;
        let roles: Vec<Role> =
            serde_json::from_str(&self.roles).context("failed to deserialize window roles")?;
        Ok(DraftWindow {
            id: WindowId(self.id),
            season: self.season,
            kind,
            sequence: self.sequence,
            open_at: parse_time(&self.open_at)?,
            lock_at: parse_time(&self.lock_at)?,
            roles,
        })
    }
}

fn decode_order(json: &str) -> Result<Vec<PlayerId>> {
    serde_json::from_str(json).context("failed to deserialize ranked list order")
}

impl DraftStore for Database {
    fn upsert_player(&self, player: &Player) -> Result<()> {
        let conn = self.conn();
        upsert_player_row(&conn, player).context("failed to upsert player")?;
        Ok(())
    }

    fn players_by_role(&self, role: Role) -> Result<Vec<Player>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, team, matches, runs, wickets, points
                 FROM players WHERE role = ?1 ORDER BY id",
            )
            .context("failed to prepare players_by_role query")?;

        let players = stmt
            .query_map(params![role.code()], |row| {
                Ok(Player {
                    id: PlayerId(row.get(0)?),
                    name: row.get(1)?,
                    role,
                    team: row.get(2)?,
                    stats: PlayerStats {
                        matches: row.get(3)?,
                        runs: row.get(4)?,
                        wickets: row.get(5)?,
                        points: row.get(6)?,
                    },
                })
            })
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;

        Ok(players)
    }

    fn upsert_window(&self, window: &DraftWindow) -> Result<()> {
        let conn = self.conn();
        let roles_json =
            serde_json::to_string(&window.roles).context("failed to serialize window roles")?;
        conn.execute(
            "INSERT INTO draft_windows (id, season, kind, sequence, open_at, lock_at, roles)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                season   = excluded.season,
                kind     = excluded.kind,
                sequence = excluded.sequence,
                open_at  = excluded.open_at,
                lock_at  = excluded.lock_at,
                roles    = excluded.roles",
            params![
                window.id.0,
                window.season,
                window.kind.code(),
                window.sequence,
                window.open_at.to_rfc3339(),
                window.lock_at.to_rfc3339(),
                roles_json,
            ],
        )
        .context("failed to upsert draft window")?;
        Ok(())
    }

    fn window(&self, id: WindowId) -> Result<Option<DraftWindow>> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM draft_windows WHERE id = ?1", WindowRow::COLUMNS);
        let row = conn
            .query_row(&sql, params![id.0], WindowRow::from_row)
            .optional()
            .context("failed to query draft window")?;
        row.map(WindowRow::decode).transpose()
    }

    fn windows(&self, season: u16, kind: Option<WindowKind>) -> Result<Vec<DraftWindow>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM draft_windows
             WHERE season = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY sequence, id",
            WindowRow::COLUMNS
        );
        let mut stmt = conn.prepare(&sql).context("failed to prepare windows query")?;
        let rows = stmt
            .query_map(params![season, kind.map(|k| k.code())], WindowRow::from_row)
            .context("failed to query draft windows")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft window rows")?;
        rows.into_iter().map(WindowRow::decode).collect()
    }

    fn all_windows(&self) -> Result<Vec<DraftWindow>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM draft_windows ORDER BY season, sequence, id",
            WindowRow::COLUMNS
        );
        let mut stmt = conn.prepare(&sql).context("failed to prepare windows query")?;
        let rows = stmt
            .query_map([], WindowRow::from_row)
            .context("failed to query draft windows")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft window rows")?;
        rows.into_iter().map(WindowRow::decode).collect()
    }

    fn add_retained(&self, window: WindowId, retained: RetainedPlayer) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO retained_players (window_id, player_id, squad_id)
             VALUES (?1, ?2, ?3)",
            params![window.0, retained.player.0, retained.squad.0],
        )
        .context("failed to record retained player")?;
        Ok(())
    }

    fn retained(&self, window: WindowId) -> Result<Vec<RetainedPlayer>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT player_id, squad_id FROM retained_players
                 WHERE window_id = ?1 ORDER BY player_id",
            )
            .context("failed to prepare retained query")?;
        let retained = stmt
            .query_map(params![window.0], |row| {
                Ok(RetainedPlayer {
                    player: PlayerId(row.get(0)?),
                    squad: SquadId(row.get(1)?),
                })
            })
            .context("failed to query retained players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map retained rows")?;
        Ok(retained)
    }

    fn load_ranked_list(
        &self,
        squad: SquadId,
        window: WindowId,
        role: Role,
    ) -> Result<Option<RankedList>> {
        let conn = self.conn();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT player_order, version FROM ranked_lists
                 WHERE squad_id = ?1 AND window_id = ?2 AND role = ?3",
                params![squad.0, window.0, role.code()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("failed to query ranked list")?;

        row.map(|(order_json, version)| {
            Ok(RankedList {
                squad,
                window,
                role,
                order: decode_order(&order_json)?,
                version: version as u64,
            })
        })
        .transpose()
    }

    fn load_ranked_lists(&self, window: WindowId, role: Role) -> Result<Vec<RankedList>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT squad_id, player_order, version FROM ranked_lists
                 WHERE window_id = ?1 AND role = ?2 ORDER BY squad_id",
            )
            .context("failed to prepare ranked lists query")?;
        let rows: Vec<(u32, String, i64)> = stmt
            .query_map(params![window.0, role.code()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .context("failed to query ranked lists")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map ranked list rows")?;

        rows.into_iter()
            .map(|(squad, order_json, version)| {
                Ok(RankedList {
                    squad: SquadId(squad),
                    window,
                    role,
                    order: decode_order(&order_json)?,
                    version: version as u64,
                })
            })
            .collect()
    }

    fn create_ranked_list(&self, list: &RankedList) -> Result<RankedList> {
        let order_json =
            serde_json::to_string(&list.order).context("failed to serialize ranked list order")?;
        {
            let conn = self.conn();
            conn.execute(
                "INSERT OR IGNORE INTO ranked_lists (squad_id, window_id, role, player_order, version)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![list.squad.0, list.window.0, list.role.code(), order_json],
            )
            .context("failed to create ranked list")?;
        }
        self.load_ranked_list(list.squad, list.window, list.role)?
            .ok_or_else(|| anyhow!("ranked list vanished right after creation"))
    }

    fn save_ranked_list(&self, list: &RankedList, expected_version: u64) -> Result<u64, StoreError> {
        let order_json = serde_json::to_string(&list.order)
            .context("failed to serialize ranked list order")?;
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin ranked list transaction")?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT version FROM ranked_lists
                 WHERE squad_id = ?1 AND window_id = ?2 AND role = ?3",
                params![list.squad.0, list.window.0, list.role.code()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read ranked list version")?;
        let actual = current.map(|v| v as u64).unwrap_or(0);

        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                squad: list.squad,
                window: list.window,
                role: list.role,
                expected: expected_version,
                actual,
            });
        }

        let next = expected_version + 1;
        if current.is_none() {
            tx.execute(
                "INSERT INTO ranked_lists (squad_id, window_id, role, player_order, version)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![list.squad.0, list.window.0, list.role.code(), order_json, next as i64],
            )
            .context("failed to insert ranked list")?;
        } else {
            tx.execute(
                "UPDATE ranked_lists
                 SET player_order = ?4, version = ?5,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE squad_id = ?1 AND window_id = ?2 AND role = ?3 AND version = ?6",
                params![
                    list.squad.0,
                    list.window.0,
                    list.role.code(),
                    order_json,
                    next as i64,
                    expected_version as i64
                ],
            )
            .context("failed to update ranked list")?;
        }

        tx.commit().context("failed to commit ranked list")?;
        Ok(next)
    }

    fn record_assignments(
        &self,
        window: WindowId,
        role: Role,
        assignments: &[Assignment],
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin allocation transaction")?;

        let mut inserted = 0usize;
        for a in assignments {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO assignments
                        (window_id, role, player_id, squad_id, round, pick)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![window.0, role.code(), a.player.0, a.squad.0, a.round, a.pick],
                )
                .context("failed to insert assignment")?;
        }

        let marker = serde_json::json!({
            "assignments": assignments.len(),
            "completed_at": Utc::now().to_rfc3339(),
        });
        save_state(&tx, &Self::allocation_key(window, role), &marker)
            .context("failed to mark allocation complete")?;

        tx.commit().context("failed to commit allocation")?;
        Ok(inserted)
    }

    fn load_assignments(&self, window: WindowId, role: Role) -> Result<Vec<Assignment>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT player_id, squad_id, round, pick FROM assignments
                 WHERE window_id = ?1 AND role = ?2 ORDER BY pick, player_id",
            )
            .context("failed to prepare assignments query")?;
        let assignments = stmt
            .query_map(params![window.0, role.code()], |row| {
                Ok(Assignment {
                    player: PlayerId(row.get(0)?),
                    squad: SquadId(row.get(1)?),
                    role,
                    window,
                    round: row.get(2)?,
                    pick: row.get(3)?,
                })
            })
            .context("failed to query assignments")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map assignment rows")?;
        Ok(assignments)
    }

    fn allocation_completed(&self, window: WindowId, role: Role) -> Result<bool> {
        Ok(self
            .load_state(&Self::allocation_key(window, role))?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn player(id: u32, role: Role, points: f64) -> Player {
        Player {
            id: PlayerId(id),
            name: format!("Player {id}"),
            role,
            team: "RR".to_string(),
            stats: PlayerStats {
                matches: 10,
                runs: 200,
                wickets: 1,
                points,
            },
        }
    }

    fn window(id: u32, season: u16, kind: WindowKind, sequence: u32) -> DraftWindow {
        DraftWindow {
            id: WindowId(id),
            season,
            kind,
            sequence,
            open_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            lock_at: Utc.with_ymd_and_hms(2026, 3, 5, 18, 0, 0).unwrap(),
            roles: vec![Role::Bat, Role::Wk],
        }
    }

    fn seeded() -> Database {
        let db = test_db();
        db.import_players(&[
            player(1, Role::Bat, 50.0),
            player(2, Role::Bat, 40.0),
            player(3, Role::Bowl, 30.0),
        ])
        .unwrap();
        db.upsert_window(&window(1, 2026, WindowKind::PreSeason, 1))
            .unwrap();
        db
    }

    fn list(order: &[u32]) -> RankedList {
        RankedList::new(
            SquadId(1),
            WindowId(1),
            Role::Bat,
            order.iter().map(|&n| PlayerId(n)).collect(),
        )
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "players",
            "draft_windows",
            "retained_players",
            "ranked_lists",
            "assignments",
            "draft_state",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    #[test]
    fn players_filtered_by_role() {
        let db = seeded();
        let bats = db.players_by_role(Role::Bat).unwrap();
        assert_eq!(bats.len(), 2);
        assert!(bats.iter().all(|p| p.role == Role::Bat));
        assert_eq!(db.players_by_role(Role::Wk).unwrap().len(), 0);
    }

    #[test]
    fn upsert_player_updates_in_place() {
        let db = seeded();
        let mut p = player(1, Role::Bat, 99.5);
        p.team = "KKR".to_string();
        db.upsert_player(&p).unwrap();

        let bats = db.players_by_role(Role::Bat).unwrap();
        let stored = bats.iter().find(|x| x.id == PlayerId(1)).unwrap();
        assert_eq!(stored.team, "KKR");
        assert!((stored.stats.points - 99.5).abs() < f64::EPSILON);
        assert_eq!(bats.len(), 2);
    }

    // ------------------------------------------------------------------
    // Windows
    // ------------------------------------------------------------------

    #[test]
    fn window_round_trip() {
        let db = seeded();
        let w = db.window(WindowId(1)).unwrap().unwrap();
        assert_eq!(w, window(1, 2026, WindowKind::PreSeason, 1));
        assert!(db.window(WindowId(42)).unwrap().is_none());
    }

    #[test]
    fn windows_filtered_by_season_and_kind() {
        let db = seeded();
        db.upsert_window(&window(3, 2026, WindowKind::MidSeason, 3))
            .unwrap();
        db.upsert_window(&window(2, 2026, WindowKind::MidSeason, 2))
            .unwrap();
        db.upsert_window(&window(4, 2027, WindowKind::PreSeason, 1))
            .unwrap();

        let mid: Vec<WindowId> = db
            .windows(2026, Some(WindowKind::MidSeason))
            .unwrap()
            .iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(mid, vec![WindowId(2), WindowId(3)]);

        assert_eq!(db.windows(2026, None).unwrap().len(), 3);
        assert_eq!(db.all_windows().unwrap().len(), 4);
    }

    // ------------------------------------------------------------------
    // Retained players
    // ------------------------------------------------------------------

    #[test]
    fn retained_scoped_to_window() {
        let db = seeded();
        db.upsert_window(&window(2, 2026, WindowKind::MidSeason, 2))
            .unwrap();
        let r = RetainedPlayer {
            player: PlayerId(2),
            squad: SquadId(7),
        };
        db.add_retained(WindowId(2), r).unwrap();

        assert_eq!(db.retained(WindowId(2)).unwrap(), vec![r]);
        assert!(db.retained(WindowId(1)).unwrap().is_empty());
    }

    // ------------------------------------------------------------------
    // Ranked lists
    // ------------------------------------------------------------------

    #[test]
    fn load_missing_list_is_none() {
        let db = seeded();
        assert!(db
            .load_ranked_list(SquadId(1), WindowId(1), Role::Bat)
            .unwrap()
            .is_none());
    }

    #[test]
    fn create_is_insert_once() {
        let db = seeded();
        let first = db.create_ranked_list(&list(&[1, 2])).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.order, vec![PlayerId(1), PlayerId(2)]);

        // A second create does not overwrite the stored order.
        let second = db.create_ranked_list(&list(&[2, 1])).unwrap();
        assert_eq!(second.order, vec![PlayerId(1), PlayerId(2)]);
        assert_eq!(second.version, 1);
    }

    #[test]
    fn save_increments_version() {
        let db = seeded();
        assert_eq!(db.save_ranked_list(&list(&[1, 2]), 0).unwrap(), 1);
        assert_eq!(db.save_ranked_list(&list(&[2, 1]), 1).unwrap(), 2);

        let stored = db
            .load_ranked_list(SquadId(1), WindowId(1), Role::Bat)
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.order, vec![PlayerId(2), PlayerId(1)]);
    }

    #[test]
    fn stale_save_is_rejected() {
        let db = seeded();
        db.save_ranked_list(&list(&[1, 2]), 0).unwrap();
        db.save_ranked_list(&list(&[2, 1]), 1).unwrap();

        let err = db.save_ranked_list(&list(&[1, 2]), 1).unwrap_err();
        match err {
            StoreError::VersionConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected VersionConflict, got: {other}"),
        }

        // The newer order survived.
        let stored = db
            .load_ranked_list(SquadId(1), WindowId(1), Role::Bat)
            .unwrap()
            .unwrap();
        assert_eq!(stored.order, vec![PlayerId(2), PlayerId(1)]);
    }

    #[test]
    fn first_save_with_nonzero_version_is_rejected() {
        let db = seeded();
        let err = db.save_ranked_list(&list(&[1, 2]), 3).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 3,
                actual: 0,
                ..
            }
        ));
    }

    #[test]
    fn lists_are_isolated_per_squad() {
        let db = seeded();
        let mut other = list(&[2, 1]);
        other.squad = SquadId(2);
        db.save_ranked_list(&list(&[1, 2]), 0).unwrap();
        db.save_ranked_list(&other, 0).unwrap();

        let all = db.load_ranked_lists(WindowId(1), Role::Bat).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].squad, SquadId(1));
        assert_eq!(all[1].order, vec![PlayerId(2), PlayerId(1)]);
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    fn assignment(player: u32, squad: u32, pick: u32) -> Assignment {
        Assignment {
            player: PlayerId(player),
            squad: SquadId(squad),
            role: Role::Bat,
            window: WindowId(1),
            round: 1,
            pick,
        }
    }

    #[test]
    fn record_assignments_marks_completion() {
        let db = seeded();
        assert!(!db.allocation_completed(WindowId(1), Role::Bat).unwrap());

        let inserted = db
            .record_assignments(
                WindowId(1),
                Role::Bat,
                &[assignment(1, 1, 1), assignment(2, 2, 2)],
            )
            .unwrap();
        assert_eq!(inserted, 2);
        assert!(db.allocation_completed(WindowId(1), Role::Bat).unwrap());
        assert!(!db.allocation_completed(WindowId(1), Role::Wk).unwrap());

        let stored = db.load_assignments(WindowId(1), Role::Bat).unwrap();
        assert_eq!(stored, vec![assignment(1, 1, 1), assignment(2, 2, 2)]);
    }

    #[test]
    fn stored_assignments_are_authoritative() {
        let db = seeded();
        db.record_assignments(WindowId(1), Role::Bat, &[assignment(1, 1, 1)])
            .unwrap();
        // A rerun that disagrees about player 1 must not reassign them.
        let inserted = db
            .record_assignments(
                WindowId(1),
                Role::Bat,
                &[assignment(1, 2, 1), assignment(2, 1, 2)],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let stored = db.load_assignments(WindowId(1), Role::Bat).unwrap();
        assert_eq!(stored[0].squad, SquadId(1));
        assert_eq!(stored.len(), 2);
    }

    // ------------------------------------------------------------------
    // Key-value state
    // ------------------------------------------------------------------

    #[test]
    fn allocation_marker_stored_as_state() {
        let db = test_db();
        assert!(db.load_state("allocation:1:BAT").unwrap().is_none());

        db.record_assignments(WindowId(1), Role::Bat, &[]).unwrap();
        let marker = db.load_state("allocation:1:BAT").unwrap().unwrap();
        assert_eq!(marker["assignments"], serde_json::json!(0));
        assert!(marker["completed_at"].is_string());
    }

    #[test]
    fn foreign_keys_enforced() {
        let db = test_db();
        // No window 9 exists.
        let result = db.add_retained(
            WindowId(9),
            RetainedPlayer {
                player: PlayerId(1),
                squad: SquadId(1),
            },
        );
        assert!(result.is_err());
    }
}
