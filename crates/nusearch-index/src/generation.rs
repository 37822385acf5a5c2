//! Generation naming.
//!
//! A generation name is `<prefix>-<YYYYMMDD>-<HHMMSS>-<mmm>` in UTC. The
//! fixed-width timestamp makes lexical order equal creation order, which the
//! promoter relies on when deciding which superseded generations to keep.
//! Names are strictly increasing within a process: if the clock has not
//! moved past the last issued timestamp, the new one is bumped by a
//! millisecond.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

static LAST_ISSUED: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

/// Name of one index generation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationName(String);

impl GenerationName {
    /// Issue the next name for `prefix` using the current time.
    pub fn next(prefix: &str) -> Self {
        let now = Utc::now();
        let issued = {
            let mut last = LAST_ISSUED.lock().unwrap_or_else(|e| e.into_inner());
            let issued = monotonic_after(*last, now);
            *last = Some(issued);
            issued
        };
        Self::at(prefix, issued)
    }

    /// Name for `prefix` at a given instant (millisecond precision).
    pub fn at(prefix: &str, timestamp: DateTime<Utc>) -> Self {
        Self(format!("{prefix}-{}", timestamp.format(TIMESTAMP_FORMAT)))
    }

    /// Wrap an existing name, e.g. one given on the command line.
    pub fn from_existing(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creation time encoded in the name, if it carries `prefix` and a
    /// well-formed timestamp.
    pub fn created_at(&self, prefix: &str) -> Option<DateTime<Utc>> {
        let stamp = self.0.strip_prefix(prefix)?.strip_prefix('-')?;
        NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GenerationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn truncate_to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let millis = timestamp.timestamp_millis();
    Utc.timestamp_millis_opt(millis).single().unwrap_or(timestamp)
}

fn monotonic_after(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_to_millis(now);
    match last {
        Some(last) if now <= last => last + Duration::milliseconds(1),
        _ => now,
    }
}

// ============================================================================
// Tests
// ============================================================================
