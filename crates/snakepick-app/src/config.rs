// Configuration loading and parsing (league.toml, settings.toml).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use snakepick_core::draft::player::{Role, SquadId, WindowId};
use snakepick_core::draft::snake::Direction;
use snakepick_core::draft::window::{DraftWindow, WindowKind};
use snakepick_core::service::DraftRules;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub windows: Vec<DraftWindow>,
    pub db_path: String,
    pub tick_seconds: u64,
    pub data_paths: DataPaths,
    pub logging: LoggingConfig,
}

impl Config {
    /// Allocation rules derived from the league section. Role keys were
    /// checked by `validate`, so unknown codes cannot reach here.
    pub fn rules(&self) -> DraftRules {
        DraftRules {
            draft_order: self.league.squads.iter().map(|s| SquadId(s.id)).collect(),
            directions: keyed_by_role(&self.league.directions),
            max_rounds: keyed_by_role(&self.league.rounds),
        }
    }
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire league.toml file.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
    #[serde(default)]
    windows: Vec<WindowSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    pub season: u16,
    /// Squads in round-1 pick order.
    pub squads: Vec<SquadConfig>,
    /// Round-1 direction overrides keyed by role code.
    #[serde(default)]
    pub directions: HashMap<String, Direction>,
    /// Allocation round caps keyed by role code.
    #[serde(default)]
    pub rounds: HashMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SquadConfig {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WindowSection {
    id: u32,
    kind: WindowKind,
    sequence: u32,
    open_at: DateTime<Utc>,
    lock_at: DateTime<Utc>,
    roles: Vec<Role>,
}

// ---------------------------------------------------------------------------
// settings.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct SettingsFile {
    database: DatabaseSection,
    scheduler: SchedulerSection,
    data: DataPaths,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SchedulerSection {
    tick_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub players: String,
    /// Retention CSV. Optional; no file means nobody is retained.
    #[serde(default)]
    pub retained: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_filter() -> String {
    "snakepick=info,warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            directory: default_log_directory(),
            filter: default_log_filter(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` and
/// `config/settings.toml`, relative to the given `base_dir`.
///
/// Does not auto-copy defaults; `load_config()` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- league.toml ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;

    // --- settings.toml ---
    let settings_path = config_dir.join("settings.toml");
    let settings_text = read_file(&settings_path)?;
    let settings: SettingsFile =
        toml::from_str(&settings_text).map_err(|e| ConfigError::ParseError {
            path: settings_path.clone(),
            source: e,
        })?;

    let season = league_file.league.season;
    let windows = league_file
        .windows
        .into_iter()
        .map(|w| DraftWindow {
            id: WindowId(w.id),
            season,
            kind: w.kind,
            sequence: w.sequence,
            open_at: w.open_at,
            lock_at: w.lock_at,
            roles: w.roles,
        })
        .collect();

    let config = Config {
        league: league_file.league,
        windows,
        db_path: settings.database.path,
        tick_seconds: settings.scheduler.tick_seconds,
        data_paths: settings.data,
        logging: settings.logging,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Loads config relative to the current working directory, copying
/// defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn keyed_by_role<V: Copy>(map: &HashMap<String, V>) -> HashMap<Role, V> {
    map.iter()
        .filter_map(|(code, v)| Role::from_str_role(code).map(|role| (role, *v)))
        .collect()
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;

    if league.squads.len() < 2 {
        return Err(invalid(
            "league.squads",
            format!("need at least 2 squads, got {}", league.squads.len()),
        ));
    }
    let mut squad_ids = HashSet::new();
    for squad in &league.squads {
        if !squad_ids.insert(squad.id) {
            return Err(invalid(
                "league.squads",
                format!("duplicate squad id {}", squad.id),
            ));
        }
    }

    for code in league.directions.keys() {
        if Role::from_str_role(code).is_none() {
            return Err(invalid(format!("league.directions.{code}"), "unknown role"));
        }
    }
    for (code, rounds) in &league.rounds {
        if Role::from_str_role(code).is_none() {
            return Err(invalid(format!("league.rounds.{code}"), "unknown role"));
        }
        if *rounds == 0 {
            return Err(invalid(format!("league.rounds.{code}"), "must be > 0"));
        }
    }

    let mut window_ids = HashSet::new();
    let mut slots = HashSet::new();
    for window in &config.windows {
        let field = format!("windows[{}]", window.id.0);
        if !window_ids.insert(window.id) {
            return Err(invalid(field, "duplicate window id"));
        }
        if !slots.insert((window.season, window.kind, window.sequence)) {
            return Err(invalid(
                field,
                format!(
                    "another {} window already uses sequence {}",
                    window.kind.code(),
                    window.sequence
                ),
            ));
        }
        if window.open_at >= window.lock_at {
            return Err(invalid(
                field,
                format!(
                    "open_at ({}) must be before lock_at ({})",
                    window.open_at, window.lock_at
                ),
            ));
        }
        if window.roles.is_empty() {
            return Err(invalid(field, "roles must not be empty"));
        }
    }

    if config.tick_seconds == 0 {
        return Err(invalid("scheduler.tick_seconds", "must be > 0"));
    }

    if config.db_path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
