#![forbid(unsafe_code)]

//! Runtime settings resolution: CLI overrides beat process environment beats
//! the `.env` file, with built-in defaults for everything but the API key.

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_ROSTER_PATH: &str = "videos.json";
pub const DEFAULT_SNAPSHOT_PATH: &str = "data/views.json";
pub const DEFAULT_MARKER_PATH: &str = "data/.history-migrated";
pub const DEFAULT_HISTORY_LIMIT: usize = 5000;

/// Everything a run needs, fully resolved.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub api_key: String,
    pub roster_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub marker_path: PathBuf,
    pub history_limit: usize,
}

/// Values supplied on the command line, taking precedence over any
/// environment source. The API key is deliberately absent: it comes from the
/// environment only, so it never shows up in argv or shell history.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub roster_path: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    pub marker_path: Option<PathBuf>,
    pub history_limit: Option<usize>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<TrackerSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings(&file_vars, env_var_string, overrides)
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<TrackerSettings> {
    let api_key = lookup_value("YT_API_KEY", file_vars, &env_lookup)
        .ok_or_else(|| anyhow!("YT_API_KEY not set"))?;
    let roster_path = overrides
        .roster_path
        .or_else(|| lookup_value("TRACKER_CONFIG", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROSTER_PATH));
    let snapshot_path = overrides
        .snapshot_path
        .or_else(|| lookup_value("SNAPSHOT_PATH", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH));
    let marker_path = overrides
        .marker_path
        .or_else(|| lookup_value("RESET_MARKER", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MARKER_PATH));
    let history_limit = overrides
        .history_limit
        .or_else(|| {
            lookup_value("HISTORY_LIMIT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<usize>().ok())
        })
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    Ok(TrackerSettings {
        api_key,
        roster_path,
        snapshot_path,
        marker_path,
        history_limit,
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

/// Parses a `.env`-style file: `KEY=value` lines, optional `export ` prefix,
/// optional single or double quotes, `#` comments. A missing file is simply
/// an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
