#![forbid(unsafe_code)]

//! Canonical video id extraction from user-supplied URLs.
//!
//! Roster entries are hand-edited, so the input may be any of the link shapes
//! YouTube hands out (share links, embeds, Shorts) with or without a scheme.
//! Everything here is plain string scanning; no URL crate is involved.

/// Video ids are exactly this many characters.
pub const VIDEO_ID_LEN: usize = 11;

/// Extracts the 11-character video id from a URL-like string.
///
/// Structured forms are tried first: `youtu.be/<id>`, a `v=` query parameter,
/// and the `/shorts/`, `/embed/`, `/v/` path prefixes. When none of them
/// yields a valid id, the raw input is scanned for the first maximal run of
/// exactly 11 id characters. Returns `None` when nothing matches.
pub fn extract_video_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    // A missing scheme is fine: every strategy below keys off substrings, so
    // "youtu.be/abc" and "https://youtu.be/abc" behave identically.
    for candidate in [
        segment_after(trimmed, "youtu.be/"),
        query_param_value(trimmed),
        segment_after(trimmed, "/shorts/"),
        segment_after(trimmed, "/embed/"),
        segment_after(trimmed, "/v/"),
    ]
    .into_iter()
    .flatten()
    {
        if is_valid_id(candidate) {
            return Some(candidate.to_owned());
        }
    }

    scan_for_id(trimmed)
}

/// Returns the path/query segment following `marker`, cut at the first
/// delimiter.
fn segment_after<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    let start = url.find(marker)? + marker.len();
    let rest = &url[start..];
    let end = rest
        .find(['&', '#', '?', '/'])
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Value of the `v=` query parameter on youtube.com-style links.
fn query_param_value(url: &str) -> Option<&str> {
    let pos = url.find("?v=").or_else(|| url.find("&v="))?;
    segment_after(url, &url[pos..pos + 3])
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_valid_id(s: &str) -> bool {
    s.len() == VIDEO_ID_LEN && s.chars().all(is_id_char)
}

/// Last-resort scan: the first maximal run of id characters that is exactly
/// eleven long. Longer runs are not ids and are skipped whole, so a 12-char
/// token never yields a truncated match.
fn scan_for_id(input: &str) -> Option<String> {
    let mut run_start = None;
    let mut runs = Vec::new();

    for (idx, c) in input.char_indices() {
        if is_id_char(c) {
            if run_start.is_none() {
                run_start = Some(idx);
            }
        } else if let Some(start) = run_start.take() {
            runs.push(&input[start..idx]);
        }
    }
    if let Some(start) = run_start {
        runs.push(&input[start..]);
    }

    runs.into_iter()
        .find(|run| run.len() == VIDEO_ID_LEN)
        .map(str::to_owned)
}
