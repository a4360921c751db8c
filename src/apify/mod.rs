//! Fallback scraping-API client
//!
//! Drives the third-party Apify actor when the browser path fails or is
//! disabled: start a run, poll it off `RUNNING`, fetch the dataset, and
//! feed the items through the same emission funnel the browser path uses.
//! Dataset items are shapeless; the tolerant accessors below accept the
//! union of snake_case and camelCase and reject an item only when its id
//! is absent.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::enumerator::ReplySink;
use crate::error::HarvestError;
use crate::harvester::Emitter;
use crate::records::{Reply, RootPost, SortMode};

/// Actor handling search-term scrapes.
pub const DEFAULT_ACTOR: &str = "apidojo~tweet-scraper";
/// Production API origin.
pub const DEFAULT_BASE_URL: &str = "https://api.apify.com/v2";

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const MAX_POLL_ATTEMPTS: u32 = 80;
/// Marker the API returns when the monthly plan is exhausted.
const QUOTA_MARKER: &str = "Monthly usage hard limit exceeded";

/// Client for the scraping actor. Cheap to construct per run.
pub struct ApifyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    actor: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl ApifyClient {
    /// Build a client honouring the configured proxy.
    pub fn new(token: impl Into<String>, proxy: Option<&str>) -> Result<Self, HarvestError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(60));
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| HarvestError::Config(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| HarvestError::Api(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            actor: DEFAULT_ACTOR.to_string(),
            poll_interval: POLL_INTERVAL,
            max_poll_attempts: MAX_POLL_ATTEMPTS,
        })
    }

    /// Point the client at a different API origin (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Shorten the poll cadence (tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Harvest the conversation under `root_id`.
    ///
    /// When `include_root` is set the root record (from the dataset, or
    /// synthesised when the dataset lacks it) is emitted before any reply,
    /// preserving the root-first ordering downstream relies on. Returns
    /// the number of replies emitted.
    pub async fn harvest_conversation(
        &self,
        root_id: &str,
        sort: SortMode,
        max_replies: usize,
        include_root: bool,
        emitter: &Emitter,
    ) -> Result<u64, HarvestError> {
        let input = serde_json::json!({
            "searchTerms": [format!("conversation_id:{root_id}")],
            "sort": sort_label(sort),
            "maxItems": max_replies + 1,
        });
        let items = self.run_actor_to_items(input).await?;
        info!(root_id, items = items.len(), "dataset fetched");

        // Only items whose ancestor resolves to the target root count;
        // quote-reposts start their own conversation and fall out here.
        let relevant: Vec<&Value> = items
            .iter()
            .filter(|item| {
                item_id(item).is_some_and(|id| id == root_id)
                    || pick_str(item, &["conversationId", "conversation_id"])
                        .is_some_and(|c| c == root_id)
                    || pick_str(item, &["inReplyToStatusId", "in_reply_to_status_id"])
                        .is_some_and(|p| p == root_id)
            })
            .collect();

        if include_root {
            let root = relevant
                .iter()
                .find(|item| item_id(item).is_some_and(|id| id == root_id))
                .map(|item| root_from_item(item, root_id))
                .unwrap_or_else(|| synthetic_root(root_id));
            emitter.emit_root(&root).await?;
        }

        let mut emitted = 0u64;
        for item in &relevant {
            let Some(reply) = reply_from_item(item, root_id) else {
                continue;
            };
            emitter.on_reply(&reply).await?;
            emitted += 1;
            if emitted % 20 == 0 {
                debug!(root_id, emitted, "persisting replies from API dataset");
            }
        }
        Ok(emitted)
    }

    /// Fetch a profile's recent root posts (`from:<handle>`, newest first).
    /// The caller fans out to [`Self::harvest_conversation`] per root.
    pub async fn fetch_timeline_roots(
        &self,
        handle: &str,
        max_posts: usize,
    ) -> Result<Vec<RootPost>, HarvestError> {
        let input = serde_json::json!({
            "searchTerms": [format!("from:{handle}")],
            "sort": "Latest",
            "maxItems": max_posts,
        });
        let items = self.run_actor_to_items(input).await?;

        let mut roots = Vec::new();
        for item in items.iter().take(max_posts) {
            let Some(id) = item_id(item) else {
                warn!("timeline item without id skipped");
                continue;
            };
            roots.push(root_from_item(item, &id));
        }
        Ok(roots)
    }

    /// Start a run, poll until it leaves `RUNNING`, download the dataset.
    async fn run_actor_to_items(&self, input: Value) -> Result<Vec<Value>, HarvestError> {
        let url = format!(
            "{}/acts/{}/runs?token={}",
            self.base_url, self.actor, self.token
        );
        let response = self
            .http
            .post(&url)
            .json(&input)
            .send()
            .await
            .map_err(|e| HarvestError::Api(format!("run submit failed: {e}")))?;
        let run: Value = self.decode(response).await?;

        let run_id = pick_str(&run["data"], &["id"])
            .ok_or_else(|| HarvestError::Api("run response carried no id".into()))?;
        let mut status = pick_str(&run["data"], &["status"]).unwrap_or_else(|| "RUNNING".into());
        let mut dataset_id = pick_str(&run["data"], &["defaultDatasetId", "default_dataset_id"]);

        let mut attempts = 0u32;
        while status == "RUNNING" || status == "READY" {
            attempts += 1;
            if attempts > self.max_poll_attempts {
                return Err(HarvestError::Api(format!(
                    "run {run_id} still RUNNING after {} polls",
                    self.max_poll_attempts
                )));
            }
            tokio::time::sleep(self.poll_interval).await;

            let url = format!(
                "{}/actor-runs/{}?token={}",
                self.base_url, run_id, self.token
            );
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| HarvestError::Api(format!("run poll failed: {e}")))?;
            let poll: Value = self.decode(response).await?;
            status = pick_str(&poll["data"], &["status"]).unwrap_or_else(|| "RUNNING".into());
            if dataset_id.is_none() {
                dataset_id = pick_str(&poll["data"], &["defaultDatasetId", "default_dataset_id"]);
            }
            debug!(run_id, %status, attempts, "actor run polled");
        }

        if status != "SUCCEEDED" {
            return Err(HarvestError::ApiRunFailed(status));
        }
        let dataset_id =
            dataset_id.ok_or_else(|| HarvestError::Api("run exposed no dataset id".into()))?;

        let url = format!(
            "{}/datasets/{}/items?token={}",
            self.base_url, dataset_id, self.token
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| HarvestError::Api(format!("dataset fetch failed: {e}")))?;
        self.decode(response).await
    }

    /// Decode a response body, mapping quota exhaustion to its own error.
    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, HarvestError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HarvestError::Api(format!("failed to read response body: {e}")))?;
        if body.contains(QUOTA_MARKER) {
            return Err(HarvestError::ApiQuotaExhausted);
        }
        if !status.is_success() {
            return Err(HarvestError::Api(format!("HTTP {status}: {body}")));
        }
        serde_json::from_str(&body)
            .map_err(|e| HarvestError::Api(format!("undecodable response: {e}")))
    }
}

fn sort_label(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Recent => "Latest",
        SortMode::Top => "Top",
    }
}

// ---------------------------------------------------------------------------
// Tolerant item accessors
// ---------------------------------------------------------------------------

fn pick<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let v = item.get(key)?;
        (!v.is_null()).then_some(v)
    })
}

fn pick_str(item: &Value, keys: &[&str]) -> Option<String> {
    match pick(item, keys)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn pick_u64(item: &Value, keys: &[&str]) -> u64 {
    match pick(item, keys) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn item_id(item: &Value) -> Option<String> {
    pick_str(item, &["id", "id_str", "tweetId", "tweet_id"])
}

fn item_text(item: &Value) -> String {
    crate::extract::normalize_media_tags(
        &pick_str(item, &["text", "full_text", "fullText"]).unwrap_or_default(),
    )
}

fn item_created_at(item: &Value) -> DateTime<Utc> {
    let Some(raw) = pick_str(item, &["createdAt", "created_at"]) else {
        return Utc::now();
    };
    DateTime::parse_from_rfc3339(&raw)
        .or_else(|_| DateTime::parse_from_str(&raw, "%a %b %d %H:%M:%S %z %Y"))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn item_author(item: &Value) -> (String, String, String) {
    let author = pick(item, &["author", "user"]).cloned().unwrap_or(Value::Null);
    let id = pick_str(&author, &["id", "id_str"]).unwrap_or_else(|| "unknown".into());
    let name = pick_str(&author, &["name", "displayName"]).unwrap_or_else(|| "Unknown".into());
    let handle = pick_str(&author, &["userName", "username", "screen_name", "screenName"])
        .unwrap_or_else(|| "unknown".into());
    (id, name, handle)
}

fn root_from_item(item: &Value, root_id: &str) -> RootPost {
    let (_, name, handle) = item_author(item);
    RootPost {
        id: root_id.to_string(),
        author_name: name,
        author_handle: handle,
        text: item_text(item),
        created_at: item_created_at(item),
        like_count: pick_u64(item, &["likeCount", "like_count", "favorite_count"]),
        reply_count: pick_u64(item, &["replyCount", "reply_count"]),
        repost_count: pick_u64(item, &["retweetCount", "retweet_count", "repostCount"]),
    }
}

/// Build a reply from a dataset item; `None` for the root's own item or an
/// item without id.
fn reply_from_item(item: &Value, root_id: &str) -> Option<Reply> {
    let id = item_id(item)?;
    if id == root_id {
        return None;
    }
    let (author_id, author_name, author_handle) = item_author(item);
    let reply_to = pick_str(item, &["inReplyToStatusId", "in_reply_to_status_id"])
        .unwrap_or_else(|| root_id.to_string());
    Some(Reply {
        id,
        root_id: root_id.to_string(),
        author_id,
        author_name,
        author_handle,
        text: item_text(item),
        created_at: item_created_at(item),
        like_count: pick_u64(item, &["likeCount", "like_count", "favorite_count"]),
        reply_to,
    })
}

/// Downstream foreign keys expect the root row to exist even when the
/// dataset never surfaced it.
fn synthetic_root(root_id: &str) -> RootPost {
    RootPost {
        id: root_id.to_string(),
        author_name: "Unknown".into(),
        author_handle: "unknown".into(),
        text: String::new(),
        created_at: Utc::now(),
        like_count: 0,
        reply_count: 0,
        repost_count: 0,
    }
}
