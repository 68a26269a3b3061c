use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::candidate_pool::DEFAULT_ROWS_TO_CHECK;
use crate::constraint::Constraint;
use crate::error::SquadError;
use crate::selector::{SearchBudget, SearchStrategy};

const APP_DIR: &str = "fpl_squad";
const PREDICTIONS_FILE: &str = "predictions.json";
const SQUAD_DB_FILE: &str = "fpl_squads.sqlite";
/// Cross-product size above which a selection run logs a warning.
pub const DEFAULT_WARN_SEARCH_SPACE: u128 = 1_000_000_000;

/// Everything one selection run needs; nothing is read from ambient paths.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionConfig {
    pub predictions_path: PathBuf,
    pub squad_db_path: PathBuf,
    pub export_dir: Option<PathBuf>,
    pub rows_to_check: usize,
    pub constraints: Vec<Constraint>,
    pub strategy: SearchStrategy,
    pub budget: SearchBudget,
    pub gameweek: Option<u32>,
    pub warn_search_space: u128,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let dir = app_cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            predictions_path: dir.join(PREDICTIONS_FILE),
            squad_db_path: dir.join(SQUAD_DB_FILE),
            export_dir: None,
            rows_to_check: DEFAULT_ROWS_TO_CHECK,
            constraints: Constraint::ALL_VARIANTS.to_vec(),
            strategy: SearchStrategy::default(),
            budget: SearchBudget::default(),
            gameweek: None,
            warn_search_space: DEFAULT_WARN_SEARCH_SPACE,
        }
    }
}

impl SelectionConfig {
    /// Defaults overridden by `FPL_*` environment variables. Call
    /// [`load_dotenv`] first to pick up `.env` files.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| non_empty(&lookup, key);

        let mut config = SelectionConfig {
            squad_db_path: squad_db_path_from_lookup(&lookup),
            ..SelectionConfig::default()
        };
        if let Some(path) = get("FPL_PREDICTIONS") {
            config.predictions_path = PathBuf::from(path);
        }
        if let Some(path) = get("FPL_EXPORT_DIR") {
            config.export_dir = Some(PathBuf::from(path));
        }
        if let Some(raw) = get("FPL_ROWS_TO_CHECK") {
            config.rows_to_check = parse_var("FPL_ROWS_TO_CHECK", &raw)?;
        }
        if let Some(raw) = get("FPL_CONSTRAINTS") {
            config.constraints = Constraint::parse_list(&raw)?;
        }
        if let Some(raw) = get("FPL_STRATEGY") {
            config.strategy = raw.parse::<SearchStrategy>()?;
        }
        if let Some(raw) = get("FPL_MAX_CANDIDATES") {
            config.budget.max_candidates = Some(parse_var("FPL_MAX_CANDIDATES", &raw)?);
        }
        if let Some(raw) = get("FPL_TIME_LIMIT_SECS") {
            let secs: f64 = parse_var("FPL_TIME_LIMIT_SECS", &raw)?;
            config.budget.time_limit = Some(
                Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("FPL_TIME_LIMIT_SECS={raw}"))?,
            );
        }
        if let Some(raw) = get("FPL_GAMEWEEK") {
            config.gameweek = Some(parse_var("FPL_GAMEWEEK", &raw)?);
        }
        if let Some(raw) = get("FPL_WARN_SEARCH_SPACE") {
            config.warn_search_space = parse_var("FPL_WARN_SEARCH_SPACE", &raw)?;
        }
        Ok(config)
    }

    /// Run before any selection; overrides applied after loading may change
    /// the values checked here.
    pub fn validate(&self) -> std::result::Result<(), SquadError> {
        if self.rows_to_check == 0 {
            return Err(SquadError::InvalidRowCap);
        }
        Ok(())
    }
}

/// Squad database named by `FPL_SQUAD_DB`, else the cache default. Reads
/// nothing else, so commands that only touch the database do not trip over
/// selection settings.
pub fn squad_db_path_from_env() -> PathBuf {
    squad_db_path_from_lookup(|key| std::env::var(key).ok())
}

pub fn squad_db_path_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    match non_empty(&lookup, "FPL_SQUAD_DB") {
        Some(path) => PathBuf::from(path),
        None => app_cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SQUAD_DB_FILE),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Loads `.env.local` then `.env` from the working directory, if present.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// `$XDG_CACHE_HOME/fpl_squad`, falling back to `~/.cache/fpl_squad`.
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow!("invalid {key}={raw}: {e}"))
}
