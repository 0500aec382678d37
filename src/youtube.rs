#![forbid(unsafe_code)]

//! Thin client for the YouTube Data API v3 `videos` endpoint.
//!
//! One GET per batch of up to fifty ids, blocking, issued sequentially by the
//! caller. Response decoding is split out of the transport so the interesting
//! parts are testable without a network.

use anyhow::{Context, Result};
use serde::Deserialize;

/// The API accepts at most this many comma-joined ids per call.
pub const MAX_IDS_PER_REQUEST: usize = 50;

const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";

/// The per-video fields this tool consumes, already flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
    /// Publication timestamp truncated to a date (`YYYY-MM-DD`).
    pub published: String,
    pub views: u64,
}

/// Wire shape of the `videos` list response. Everything optional: the API
/// omits whole sections for deleted or region-locked videos.
#[derive(Debug, Deserialize)]
pub struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    #[serde(rename = "default")]
    fallback: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Statistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
}

/// Fetches metadata for one batch of ids. The caller is responsible for
/// keeping `ids` within [`MAX_IDS_PER_REQUEST`].
pub fn fetch_video_batch(api_key: &str, ids: &[String]) -> Result<Vec<VideoMetadata>> {
    let joined = ids.join(",");
    let response = ureq::get(VIDEOS_ENDPOINT)
        .query("part", "snippet,statistics")
        .query("id", &joined)
        .query("key", api_key)
        .call()
        .with_context(|| format!("requesting metadata for {} video(s)", ids.len()))?;

    let decoded: VideosResponse = response
        .into_json()
        .context("decoding video list response")?;

    Ok(metadata_from_response(decoded))
}

/// Flattens the wire response into [`VideoMetadata`] entries.
pub fn metadata_from_response(response: VideosResponse) -> Vec<VideoMetadata> {
    response
        .items
        .into_iter()
        .map(|item| {
            let snippet = item.snippet;
            let title = snippet
                .as_ref()
                .and_then(|s| s.title.clone())
                .unwrap_or_default();
            let thumbnail = snippet
                .as_ref()
                .and_then(|s| s.thumbnails.as_ref())
                .map(pick_thumbnail)
                .unwrap_or_default();
            let published = snippet
                .as_ref()
                .and_then(|s| s.published_at.as_deref())
                .map(truncate_to_date)
                .unwrap_or_default();
            let views = item
                .statistics
                .as_ref()
                .and_then(|s| s.view_count.as_deref())
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .unwrap_or(0);

            VideoMetadata {
                video_id: item.id,
                title,
                thumbnail,
                published,
                views,
            }
        })
        .collect()
}

/// High-resolution thumbnail when present, else the default variant.
fn pick_thumbnail(thumbnails: &Thumbnails) -> String {
    thumbnails
        .high
        .as_ref()
        .and_then(|t| t.url.clone())
        .or_else(|| thumbnails.fallback.as_ref().and_then(|t| t.url.clone()))
        .unwrap_or_default()
}

/// `publishedAt` is RFC 3339; keep only the calendar date.
fn truncate_to_date(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(parsed) => parsed.format("%Y-%m-%d").to_string(),
        Err(_) => raw.trim().split('T').next().unwrap_or("").to_string(),
    }
}
