#![forbid(unsafe_code)]

//! The roster document: which videos this installation watches.
//!
//! `videos.json` is hand-maintained, so loading is forgiving per entry (a bad
//! URL skips that entry with a warning) while the document itself is required.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::video_id::extract_video_id;

/// One element of the roster's `videos` array, as written by the operator.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackedVideo {
    pub url: String,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Roster {
    #[serde(default)]
    videos: Vec<TrackedVideo>,
}

/// A roster entry whose video id has been extracted successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntry {
    pub video_id: String,
    pub url: String,
    pub banner: Option<String>,
    pub unit: Option<String>,
}

/// Reads the roster document. A missing or unparseable file is an error; the
/// caller treats an empty `videos` array as fatal too.
pub fn load_roster(path: &Path) -> Result<Vec<TrackedVideo>> {
    let file = File::open(path).with_context(|| format!("opening roster {}", path.display()))?;
    let reader = BufReader::new(file);
    let roster: Roster = serde_json::from_reader(reader)
        .with_context(|| format!("parsing roster {}", path.display()))?;
    Ok(roster.videos)
}

/// Extracts ids for every roster entry, skipping the ones that yield nothing
/// and deduplicating repeated ids (first occurrence wins).
pub fn resolve_entries(videos: Vec<TrackedVideo>) -> Vec<TrackedEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for video in videos {
        let Some(video_id) = extract_video_id(&video.url) else {
            eprintln!("Warning: no video id found in {:?}, skipping", video.url);
            continue;
        };
        if !seen.insert(video_id.clone()) {
            eprintln!("Warning: duplicate entry for {}, keeping the first", video_id);
            continue;
        }
        entries.push(TrackedEntry {
            video_id,
            url: video.url,
            banner: video.banner,
            unit: video.unit,
        });
    }

    entries
}
