#![forbid(unsafe_code)]

//! The persisted snapshot: one record per tracked video, assembled each run
//! from fetched metadata, the prior snapshot, and roster settings.
//!
//! Field resolution is uniform: freshly fetched wins, prior state is the
//! fallback, and empty means genuinely unknown. Records are never deleted;
//! a video dropped from the roster rides along as an orphan so its history
//! survives roster edits.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::history::{self, HistoryPoint};
use crate::tracked::TrackedEntry;
use crate::youtube::VideoMetadata;

/// Title used when neither the API nor the prior snapshot knows one.
pub const UNKNOWN_TITLE: &str = "Unknown title";

/// One tracked video in the output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub banner: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub history: Vec<HistoryPoint>,
}

/// The complete output document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub updated_at: DateTime<Utc>,
    pub videos: Vec<VideoRecord>,
}

/// Whether the one-time history reset still has to run.
///
/// The state is persisted as marker-file presence: absent means `Pending`,
/// present means `Done`. On a clean checkout (no marker, no snapshot) the
/// reset degenerates into ordinary first-run creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    Pending,
    Done,
}

/// Reads the reset lifecycle state from marker presence.
pub fn reset_state(marker_path: &Path) -> ResetState {
    if marker_path.exists() {
        ResetState::Done
    } else {
        ResetState::Pending
    }
}

/// Moves the reset lifecycle to `Done`. The content is informational only;
/// existence is what gates the behavior.
pub fn record_reset_done(marker_path: &Path, at: DateTime<Utc>) -> Result<()> {
    if let Some(parent) = marker_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(marker_path, format!("history reset at {}\n", at.to_rfc3339()))
        .with_context(|| format!("writing reset marker {}", marker_path.display()))
}

/// Loads the prior snapshot. A missing file is an ordinary first run and
/// yields `None`; an unreadable or corrupt file is an error, since quietly
/// starting over would discard the accumulated history.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot = serde_json::from_str(&raw)
        .with_context(|| format!("parsing snapshot {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Writes the snapshot in one rename so readers never see a partial file.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let payload = serde_json::to_vec_pretty(snapshot).context("serializing snapshot")?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("finalizing snapshot {}", path.display()))
}

/// Builds the run's snapshot: one record per tracked entry in roster order,
/// then every prior record whose id left the roster, untouched.
pub fn assemble_snapshot(
    entries: &[TrackedEntry],
    fetched: &HashMap<String, VideoMetadata>,
    prior: Option<&Snapshot>,
    observed_at: DateTime<Utc>,
    history_limit: usize,
    reset: ResetState,
) -> Snapshot {
    let prior_by_id: HashMap<&str, &VideoRecord> = prior
        .map(|snapshot| {
            snapshot
                .videos
                .iter()
                .map(|record| (record.video_id.as_str(), record))
                .collect()
        })
        .unwrap_or_default();

    let mut videos: Vec<VideoRecord> = entries
        .iter()
        .map(|entry| {
            build_record(
                entry,
                fetched.get(entry.video_id.as_str()),
                prior_by_id.get(entry.video_id.as_str()).copied(),
                observed_at,
                history_limit,
                reset,
            )
        })
        .collect();

    if let Some(prior) = prior {
        let tracked: std::collections::HashSet<&str> =
            entries.iter().map(|entry| entry.video_id.as_str()).collect();
        for orphan in &prior.videos {
            if !tracked.contains(orphan.video_id.as_str()) {
                videos.push(orphan.clone());
            }
        }
    }

    Snapshot {
        updated_at: observed_at,
        videos,
    }
}

/// Assembles one record from fetched metadata, the prior record, and roster
/// settings, merging the view-count history along the way.
pub fn build_record(
    entry: &TrackedEntry,
    fetched: Option<&VideoMetadata>,
    prior: Option<&VideoRecord>,
    observed_at: DateTime<Utc>,
    history_limit: usize,
    reset: ResetState,
) -> VideoRecord {
    let title = resolve_field(
        fetched.map(|meta| meta.title.as_str()),
        prior.map(|record| record.title.as_str()),
    )
    .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let thumbnail = resolve_field(
        fetched.map(|meta| meta.thumbnail.as_str()),
        prior.map(|record| record.thumbnail.as_str()),
    )
    .unwrap_or_default();
    let published = resolve_field(
        fetched.map(|meta| meta.published.as_str()),
        prior.map(|record| record.published.as_str()),
    )
    .unwrap_or_default();

    // View count for the merge: live value, else the newest stored point,
    // else zero (only reachable in reset mode).
    let views = match fetched {
        Some(meta) => meta.views,
        None => prior
            .and_then(|record| record.history.last())
            .map(|point| point.views)
            .unwrap_or(0),
    };

    let prior_history = prior.map(|record| record.history.clone()).unwrap_or_default();
    let history = match (reset, fetched) {
        // The one-time reset replaces whatever was stored, fetch or no fetch.
        (ResetState::Pending, _) => vec![HistoryPoint {
            at: history::floor_to_bucket(observed_at),
            views,
        }],
        (ResetState::Done, Some(_)) => {
            history::merge_history(prior_history, views, observed_at, history_limit)
        }
        // No observation was made; inventing a point from the reused count
        // would only duplicate the newest one.
        (ResetState::Done, None) => prior_history,
    };

    VideoRecord {
        video_id: entry.video_id.clone(),
        url: format!("https://www.youtube.com/watch?v={}", entry.video_id),
        title,
        thumbnail,
        published,
        banner: resolve_field(
            entry.banner.as_deref(),
            prior.map(|record| record.banner.as_str()),
        )
        .unwrap_or_default(),
        unit: resolve_field(
            entry.unit.as_deref(),
            prior.map(|record| record.unit.as_str()),
        )
        .unwrap_or_default(),
        history,
    }
}

/// First non-empty of (preferred, fallback). Empty strings count as absent so
/// a degraded fetch never wipes a previously known value.
fn resolve_field(preferred: Option<&str>, fallback: Option<&str>) -> Option<String> {
    preferred
        .filter(|value| !value.is_empty())
        .or_else(|| fallback.filter(|value| !value.is_empty()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    const ID: &str = "AAAAAAAAAAA";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 12, 0).unwrap()
    }

    fn bucket() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
    }

    fn entry() -> TrackedEntry {
        TrackedEntry {
            video_id: ID.to_string(),
            url: format!("https://youtu.be/{ID}"),
            banner: Some("b1".into()),
            unit: Some("u1".into()),
        }
    }

    fn fetched(views: u64) -> VideoMetadata {
        VideoMetadata {
            video_id: ID.to_string(),
            title: "T".into(),
            thumbnail: "https://img/hq.jpg".into(),
            published: "2024-01-01".into(),
            views,
        }
    }

    fn prior_record(views: u64) -> VideoRecord {
        VideoRecord {
            video_id: ID.to_string(),
            url: format!("https://www.youtube.com/watch?v={ID}"),
            title: "Old title".into(),
            thumbnail: "https://img/old.jpg".into(),
            published: "2023-12-31".into(),
            banner: "old-banner".into(),
            unit: "old-unit".into(),
            history: vec![HistoryPoint {
                at: Utc.with_ymd_and_hms(2024, 5, 9, 20, 0, 0).unwrap(),
                views,
            }],
        }
    }

    #[test]
    fn fresh_entry_with_live_fetch_builds_single_point_record() {
        let record = build_record(
            &entry(),
            Some(&fetched(1000)),
            None,
            now(),
            100,
            ResetState::Done,
        );

        assert_eq!(record.video_id, ID);
        assert_eq!(record.url, format!("https://www.youtube.com/watch?v={ID}"));
        assert_eq!(record.title, "T");
        assert_eq!(record.banner, "b1");
        assert_eq!(record.unit, "u1");
        assert_eq!(
            record.history,
            vec![HistoryPoint {
                at: bucket(),
                views: 1000
            }]
        );
    }

    #[test]
    fn failed_fetch_degrades_to_prior_fields() {
        let prior = prior_record(900);
        let record = build_record(&entry(), None, Some(&prior), now(), 100, ResetState::Done);

        assert_eq!(record.title, "Old title");
        assert_eq!(record.thumbnail, "https://img/old.jpg");
        assert_eq!(record.published, "2023-12-31");
        // Roster settings still win over the prior record.
        assert_eq!(record.banner, "b1");
        assert_eq!(record.unit, "u1");
        // No observation happened, so the stored history rides through.
        assert_eq!(record.history, prior.history);
    }

    #[test]
    fn unknown_everything_uses_placeholders() {
        let bare = TrackedEntry {
            video_id: ID.to_string(),
            url: format!("https://youtu.be/{ID}"),
            banner: None,
            unit: None,
        };
        let record = build_record(&bare, None, None, now(), 100, ResetState::Done);

        assert_eq!(record.title, UNKNOWN_TITLE);
        assert_eq!(record.thumbnail, "");
        assert_eq!(record.published, "");
        assert_eq!(record.banner, "");
        assert_eq!(record.unit, "");
        assert!(record.history.is_empty());
    }

    #[test]
    fn pending_reset_without_fetch_reuses_newest_views() {
        let prior = prior_record(900);
        let record = build_record(&entry(), None, Some(&prior), now(), 100, ResetState::Pending);
        assert_eq!(
            record.history,
            vec![HistoryPoint {
                at: bucket(),
                views: 900
            }]
        );
    }

    #[test]
    fn banner_and_unit_fall_back_to_prior_record() {
        let bare = TrackedEntry {
            banner: None,
            unit: None,
            ..entry()
        };
        let prior = prior_record(900);
        let record = build_record(&bare, Some(&fetched(1000)), Some(&prior), now(), 100, ResetState::Done);
        assert_eq!(record.banner, "old-banner");
        assert_eq!(record.unit, "old-unit");
    }

    #[test]
    fn pending_reset_collapses_history_to_current_bucket() {
        let mut prior = prior_record(900);
        prior.history.push(HistoryPoint {
            at: Utc.with_ymd_and_hms(2024, 5, 9, 21, 0, 0).unwrap(),
            views: 950,
        });
        let record = build_record(
            &entry(),
            Some(&fetched(1000)),
            Some(&prior),
            now(),
            100,
            ResetState::Pending,
        );
        assert_eq!(
            record.history,
            vec![HistoryPoint {
                at: bucket(),
                views: 1000
            }]
        );
    }

    #[test]
    fn assemble_keeps_roster_order_and_appends_orphans() {
        let tracked = entry();
        let orphan = VideoRecord {
            video_id: "BBBBBBBBBBB".into(),
            ..prior_record(123)
        };
        let prior = Snapshot {
            updated_at: now(),
            videos: vec![orphan.clone(), prior_record(900)],
        };
        let fetched_map = HashMap::from([(ID.to_string(), fetched(1000))]);

        let snapshot = assemble_snapshot(
            std::slice::from_ref(&tracked),
            &fetched_map,
            Some(&prior),
            now(),
            100,
            ResetState::Done,
        );

        assert_eq!(snapshot.videos.len(), 2);
        assert_eq!(snapshot.videos[0].video_id, ID);
        assert_eq!(snapshot.videos[1], orphan);
        assert_eq!(snapshot.updated_at, now());
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("views.json");
        let snapshot = Snapshot {
            updated_at: now(),
            videos: vec![prior_record(900)],
        };

        write_snapshot(&path, &snapshot).unwrap();
        let reloaded = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(reloaded.videos, snapshot.videos);
        // The temp file must not survive the rename.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn load_snapshot_missing_file_is_first_run() {
        let dir = tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("views.json")).unwrap().is_none());
    }

    #[test]
    fn load_snapshot_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("views.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_snapshot(&path).is_err());
    }

    #[test]
    fn snapshot_serializes_wire_field_names() {
        let snapshot = Snapshot {
            updated_at: now(),
            videos: vec![prior_record(900)],
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains(r#""updated_at":"#));
        assert!(json.contains(r#""videoId":"AAAAAAAAAAA""#));
        assert!(json.contains(r#""history":"#));
    }

    #[test]
    fn reset_state_follows_marker_presence() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("state").join(".history-migrated");

        assert_eq!(reset_state(&marker), ResetState::Pending);
        record_reset_done(&marker, now()).unwrap();
        assert_eq!(reset_state(&marker), ResetState::Done);
        // Content is informational only.
        let content = fs::read_to_string(&marker).unwrap();
        assert!(content.contains("history reset at"));
    }
}
