//! Narrow boundary traits toward the embedding application
//!
//! The engine never touches the relational schema directly; it sees exactly
//! two capabilities: upserting harvested records (`ReplyStore`) and reading
//! operator configuration (`ConfigStore`). In-memory implementations ship
//! for tests and lightweight embedding.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::HarvestError;
use crate::records::{Reply, RootPost};

/// Config key: single credential bundle, JSON string.
pub const KEY_X_COOKIES: &str = "X_COOKIES";
/// Config key: JSON array of credential bundles.
pub const KEY_X_COOKIES_LIST: &str = "X_COOKIES_LIST";
/// Config key: token for the fallback scraping API.
pub const KEY_APIFY_TOKEN: &str = "APIFY_TOKEN";
/// Config key: proxy URL applied to the browser and outbound HTTP.
pub const KEY_PROXY_URL: &str = "PROXY_URL";
/// Config key: name of the active pacing preset.
pub const KEY_SCRAPE_PACING_PRESET: &str = "SCRAPE_PACING_PRESET";

/// Persistence sink for harvested records.
///
/// Upserts are idempotent on `id`: re-insertion refreshes `like_count` and
/// the fetched-at instant but must not change `created_at`. Duplicate-key
/// outcomes are the store's business; the engine tolerates them silently.
#[async_trait]
pub trait ReplyStore: Send + Sync {
    async fn upsert_root_post(&self, post: &RootPost) -> Result<(), HarvestError>;
    async fn upsert_reply(&self, reply: &Reply) -> Result<(), HarvestError>;
}

/// Read/write access to the operator's key-value configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, description: Option<&str>);
}

/// In-memory `ReplyStore` keeping upsert order; used by tests and demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    roots: Vec<RootPost>,
    replies: Vec<Reply>,
    /// Fetched-at instant per record id, refreshed on every upsert.
    fetched_at: HashMap<String, DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_posts(&self) -> Vec<RootPost> {
        self.inner.lock().roots.clone()
    }

    /// Replies in upsert order, root records excluded by id inequality.
    pub fn replies(&self) -> Vec<Reply> {
        self.inner
            .lock()
            .replies
            .iter()
            .filter(|r| r.id != r.root_id)
            .cloned()
            .collect()
    }

    /// When the record with this id was last upserted.
    pub fn fetched_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.lock().fetched_at.get(id).copied()
    }
}

#[async_trait]
impl ReplyStore for MemoryStore {
    async fn upsert_root_post(&self, post: &RootPost) -> Result<(), HarvestError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.roots.iter_mut().find(|p| p.id == post.id) {
            // created_at is immutable across upserts
            existing.like_count = post.like_count;
            existing.reply_count = post.reply_count;
            existing.repost_count = post.repost_count;
            existing.text = post.text.clone();
        } else {
            inner.roots.push(post.clone());
        }
        inner.fetched_at.insert(post.id.clone(), Utc::now());
        Ok(())
    }

    async fn upsert_reply(&self, reply: &Reply) -> Result<(), HarvestError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.replies.iter_mut().find(|r| r.id == reply.id) {
            existing.like_count = reply.like_count;
            existing.text = reply.text.clone();
        } else {
            inner.replies.push(reply.clone());
        }
        inner.fetched_at.insert(reply.id.clone(), Utc::now());
        Ok(())
    }
}

/// In-memory `ConfigStore`.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(values: &[(&str, &str)]) -> Self {
        let map = values
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self {
            values: Mutex::new(map),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfig {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str, _description: Option<&str>) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }
}
