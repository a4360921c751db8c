//! Keyed progress channel polled by the UI
//!
//! A write-only side channel from the engine's perspective: each harvest
//! target (`account:<handle>` / `tweet:<id>`) maps to the latest
//! [`ScrapeProgress`]. Writes merge with a monotonic guarantee on
//! `replies_found`; reads return the current record or nothing. Memory-only,
//! lifetime of the process.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use dashmap::DashMap;
use tracing::debug;

use crate::records::ScrapeProgress;

#[derive(Debug, Clone)]
struct Entry {
    progress: ScrapeProgress,
    last_updated: DateTime<Utc>,
}

/// Process-wide register of the latest progress record per harvest target.
#[derive(Debug, Default)]
pub struct ProgressChannel {
    entries: DashMap<String, Entry>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a new observation into the channel.
    ///
    /// `replies_found` never decreases within a run: a later observation
    /// reporting fewer replies keeps the stored maximum. Every other field
    /// is overwritten.
    pub fn set(&self, key: &str, mut progress: ScrapeProgress) {
        let now = Utc::now();
        progress.updated_at = now;
        if let Some(prev) = self.entries.get(key) {
            progress.replies_found = progress.replies_found.max(prev.progress.replies_found);
        }
        debug!(
            target = key,
            stage = ?progress.stage,
            replies = progress.replies_found,
            "progress update"
        );
        self.entries.insert(
            key.to_string(),
            Entry {
                progress,
                last_updated: now,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<ScrapeProgress> {
        self.entries.get(key).map(|e| e.progress.clone())
    }

    pub fn last_updated(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| e.last_updated)
    }

    /// Reset a target before a new run.
    pub fn clear(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Global channel used by production harvests.
static GLOBAL_CHANNEL: Lazy<Arc<ProgressChannel>> = Lazy::new(|| Arc::new(ProgressChannel::new()));

pub fn global_progress() -> Arc<ProgressChannel> {
    Arc::clone(&GLOBAL_CHANNEL)
}
