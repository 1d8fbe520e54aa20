//! Storage keys for processed payloads.
//!
//! Keys are partitioned by ingestion hour so that a bucket listing for a
//! time range only touches a handful of prefixes:
//!
//! `emails/2023/11/14/22/x1-1700000000000-000000-3f2a9c01b7d4.json`
//!
//! The file name joins the payload id, the epoch millis of the clock, a
//! per-generator sequence number and a random suffix.

use crate::clock::Clock;
use crate::model::Payload;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const MAX_STEM_LEN: usize = 64;
const DEFAULT_STEM: &str = "msg";
const SUFFIX_LEN: usize = 12;

/// Random component of a key
pub trait SuffixSource: Send + Sync {
    fn suffix(&self) -> String;
}

/// Takes the leading hex digits of a v4 uuid
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSuffix;

impl SuffixSource for UuidSuffix {
    fn suffix(&self) -> String {
        let mut s = Uuid::new_v4().simple().to_string();
        s.truncate(SUFFIX_LEN);
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub struct KeyGenerator {
    prefix: String,
    clock: Arc<dyn Clock>,
    suffixes: Arc<dyn SuffixSource>,
    sequence: AtomicU64,
}

impl KeyGenerator {
    pub fn new(prefix: &str, clock: Arc<dyn Clock>, suffixes: Arc<dyn SuffixSource>) -> Self {
        KeyGenerator {
            prefix: prefix.trim_matches('/').to_owned(),
            clock,
            suffixes,
            sequence: AtomicU64::new(0),
        }
    }

    /// Derives a fresh key for one processing attempt of `payload`.
    ///
    /// Two calls on the same generator never return the same key, whatever
    /// the clock and suffix source return.
    pub fn generate(&self, payload: &Payload) -> StorageKey {
        self.generate_at(payload, self.clock.now())
    }

    /// Like `generate`, partitioned by `now` instead of a fresh clock reading
    pub fn generate_at(&self, payload: &Payload, now: DateTime<Utc>) -> StorageKey {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        StorageKey(format!(
            "{}/{:04}/{:02}/{:02}/{:02}/{}-{}-{:06}-{}.json",
            self.prefix,
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            stem(payload.id.as_deref()),
            now.timestamp_millis(),
            sequence,
            self.suffixes.suffix()
        ))
    }
}

fn stem(id: Option<&str>) -> String {
    let cleaned: String = id
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_STEM_LEN)
        .collect();
    if cleaned.is_empty() {
        DEFAULT_STEM.to_owned()
    } else {
        cleaned
    }
}
