#![forbid(unsafe_code)]

//! View-count history points and the merge policy that keeps them tidy.
//!
//! Observations are bucketed into half-hour windows: a fresh count lands in
//! the same bucket as the newest stored point overwrites it, anything else
//! appends. Early snapshots recorded one point per calendar day with a bare
//! date as the key, so reading accepts both shapes; writing always emits the
//! full timestamp form.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Width of a history bucket in minutes.
pub const BUCKET_MINUTES: u32 = 30;

/// One observation: a bucketed UTC timestamp and the view count seen there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    #[serde(
        serialize_with = "serialize_time_key",
        deserialize_with = "deserialize_time_key"
    )]
    pub at: DateTime<Utc>,
    pub views: u64,
}

/// The two timestamp shapes found in stored history.
///
/// `Day` keys come from snapshots written before sub-hour bucketing existed.
/// Both normalize to a UTC instant on read; only `Stamped` is ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKey {
    Day(NaiveDate),
    Stamped(DateTime<Utc>),
}

impl TimeKey {
    /// Parses either stored shape. Full timestamps are tried first since a
    /// date-only pattern would also prefix-match them.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if let Ok(stamped) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(TimeKey::Stamped(stamped.with_timezone(&Utc)));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
            return Some(TimeKey::Stamped(naive.and_utc()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Some(TimeKey::Day(date));
        }
        None
    }

    /// Canonical UTC instant for this key. Day keys map to midnight.
    pub fn into_utc(self) -> DateTime<Utc> {
        match self {
            TimeKey::Day(date) => date.and_time(NaiveTime::MIN).and_utc(),
            TimeKey::Stamped(at) => at,
        }
    }
}

fn serialize_time_key<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn deserialize_time_key<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    TimeKey::parse(&raw)
        .map(TimeKey::into_utc)
        .ok_or_else(|| de::Error::custom(format!("unrecognized history timestamp: {raw}")))
}

/// Floors a timestamp to the start of its half-hour window. Minutes 0-29 map
/// to :00, minutes 30-59 to :30; seconds and sub-second parts are dropped.
pub fn floor_to_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    let minute = if at.minute() < BUCKET_MINUTES { 0 } else { BUCKET_MINUTES };
    at.with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Folds one observation into stored history.
///
/// The newest stored point is re-floored before comparison, so legacy day
/// keys (midnight instants) and drifting timestamps all land in a
/// well-defined bucket. Overwriting also rewrites the point's timestamp to
/// the bucket key, which migrates legacy points the first time they are
/// touched.
pub fn merge_history(
    mut history: Vec<HistoryPoint>,
    views: u64,
    observed_at: DateTime<Utc>,
    cap: usize,
) -> Vec<HistoryPoint> {
    let bucket = floor_to_bucket(observed_at);

    match history.last_mut() {
        Some(last) if floor_to_bucket(last.at) == bucket => {
            last.at = bucket;
            last.views = views;
        }
        _ => history.push(HistoryPoint { at: bucket, views }),
    }

    truncate_oldest(&mut history, cap);
    history
}

/// Drops the oldest points until at most `cap` remain.
pub fn truncate_oldest(history: &mut Vec<HistoryPoint>, cap: usize) {
    if history.len() > cap {
        let excess = history.len() - cap;
        history.drain(..excess);
    }
}
