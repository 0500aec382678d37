#![forbid(unsafe_code)]

//! Poller binary: fetches current metadata for every roster video and folds
//! the observed view counts into the persisted snapshot. Meant to be run from
//! cron every half hour.

use anyhow::{Result, bail};
use chrono::Utc;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use viewtally_tools::{
    config::{SettingsOverrides, TrackerSettings, resolve_settings},
    security::refuse_root,
    snapshot::{ResetState, assemble_snapshot, load_snapshot, record_reset_done, reset_state, write_snapshot},
    tracked::{TrackedEntry, load_roster, resolve_entries},
    youtube::{MAX_IDS_PER_REQUEST, VideoMetadata, fetch_video_batch},
};

#[derive(Debug, Clone)]
struct UpdateArgs {
    settings: TrackerSettings,
}

impl UpdateArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut roster_override: Option<PathBuf> = None;
        let mut snapshot_override: Option<PathBuf> = None;
        let mut marker_override: Option<PathBuf> = None;
        let mut limit_override: Option<usize> = None;
        let mut env_override: Option<PathBuf> = None;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--config=") {
                roster_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--output=") {
                snapshot_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--marker=") {
                marker_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--history-limit=") {
                limit_override = Some(Self::parse_limit(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--env-file=") {
                env_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--config" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--config requires a value"))?;
                    roster_override = Some(PathBuf::from(value));
                }
                "--output" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--output requires a value"))?;
                    snapshot_override = Some(PathBuf::from(value));
                }
                "--marker" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--marker requires a value"))?;
                    marker_override = Some(PathBuf::from(value));
                }
                "--history-limit" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--history-limit requires a value"))?;
                    limit_override = Some(Self::parse_limit(&value)?);
                }
                "--env-file" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--env-file requires a value"))?;
                    env_override = Some(PathBuf::from(value));
                }
                _ => {
                    bail!("unknown argument: {arg}");
                }
            }
        }

        let settings = resolve_settings(SettingsOverrides {
            roster_path: roster_override,
            snapshot_path: snapshot_override,
            marker_path: marker_override,
            history_limit: limit_override,
            env_path: env_override,
        })?;

        Ok(Self { settings })
    }

    fn parse_limit(value: &str) -> Result<usize> {
        match value.trim().parse::<usize>() {
            Ok(limit) if limit > 0 => Ok(limit),
            _ => bail!("--history-limit must be a positive integer, got {value}"),
        }
    }
}

fn main() -> Result<()> {
    refuse_root("update_views")?;

    let UpdateArgs { settings } = UpdateArgs::parse()?;

    println!("===================================");
    println!("viewtally view-count update");
    println!("===================================");
    println!("Roster: {}", settings.roster_path.display());
    println!("Snapshot: {}", settings.snapshot_path.display());
    println!();

    let roster = load_roster(&settings.roster_path)?;
    if roster.is_empty() {
        bail!("roster {} lists no videos", settings.roster_path.display());
    }
    let entries = resolve_entries(roster);
    if entries.is_empty() {
        bail!("no usable video ids in the roster; nothing to track");
    }
    println!("Tracking {} video(s).", entries.len());

    let prior = load_snapshot(&settings.snapshot_path)?;
    if prior.is_none() {
        println!("No prior snapshot found; starting fresh.");
    }

    let reset = reset_state(&settings.marker_path);
    if reset == ResetState::Pending && prior.is_some() {
        println!("Reset marker absent; stored history collapses to a single point this run.");
    }

    let now = Utc::now();
    let fetched = fetch_all(&settings.api_key, &entries);
    println!(
        "Fetched metadata for {} of {} video(s).",
        fetched.len(),
        entries.len()
    );

    let snapshot = assemble_snapshot(
        &entries,
        &fetched,
        prior.as_ref(),
        now,
        settings.history_limit,
        reset,
    );
    write_snapshot(&settings.snapshot_path, &snapshot)?;
    println!("Snapshot written to {}.", settings.snapshot_path.display());

    if reset == ResetState::Pending
        && let Err(err) = record_reset_done(&settings.marker_path, now)
    {
        eprintln!(
            "Warning: could not write reset marker {}: {err:#}",
            settings.marker_path.display()
        );
    }

    Ok(())
}

/// Fetches metadata in API-sized batches, sequentially. A failed batch only
/// degrades its own ids: they stay absent from the map and the assembler
/// falls back to prior state for them.
fn fetch_all(api_key: &str, entries: &[TrackedEntry]) -> HashMap<String, VideoMetadata> {
    let ids: Vec<String> = entries.iter().map(|entry| entry.video_id.clone()).collect();
    let mut fetched = HashMap::new();

    for batch in ids.chunks(MAX_IDS_PER_REQUEST) {
        match fetch_video_batch(api_key, batch) {
            Ok(items) => {
                for item in items {
                    fetched.insert(item.video_id.clone(), item);
                }
            }
            Err(err) => {
                eprintln!(
                    "Warning: metadata fetch failed for a batch of {} video(s): {err:#}",
                    batch.len()
                );
            }
        }
    }

    fetched
}
