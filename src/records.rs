//! Core record types shared across the harvest engine
//!
//! These are the shapes that cross the persistence boundary (`RootPost`,
//! `Reply`), the progress channel (`ScrapeProgress`), and the credential
//! ring (`CredentialBundle`). Field names mirror what the embedding layer
//! stores, so everything derives serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host of the platform web origin.
pub const PLATFORM_HOST: &str = "x.com";

/// Legacy host still serving the same permalinks.
pub const PLATFORM_LEGACY_HOST: &str = "twitter.com";

/// Wildcard cookie domain for credential bundles.
pub const PLATFORM_COOKIE_DOMAIN: &str = ".x.com";

/// A top-level conversation post whose replies are being harvested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPost {
    pub id: String,
    pub author_name: String,
    pub author_handle: String,
    /// Body text; media presence is encoded as bracketed tags appended to it.
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub reply_count: u64,
    pub repost_count: u64,
}

/// A post whose ancestor chain leads to a harvested root post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    /// Id of the root post under whose conversation this reply lives.
    pub root_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_handle: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    /// Nearest ancestor id within the conversation; falls back to `root_id`.
    pub reply_to: String,
}

/// Stage of a harvest run as observed through the progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStage {
    Init,
    Loading,
    FetchingPosts,
    FetchingReplies,
    Complete,
    Error,
}

/// Latest observation of a harvest run, polled by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeProgress {
    pub stage: ScrapeStage,
    pub posts_found: u64,
    pub replies_found: u64,
    pub current_post: u64,
    pub total_posts: u64,
    pub current_credential: u64,
    pub total_credentials: u64,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeProgress {
    /// Fresh record at the given stage with zeroed counters.
    pub fn at_stage(stage: ScrapeStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            posts_found: 0,
            replies_found: 0,
            current_post: 0,
            total_posts: 0,
            current_credential: 0,
            total_credentials: 0,
            message: message.into(),
            updated_at: Utc::now(),
        }
    }
}

/// One browser cookie inside a credential bundle.
///
/// `domain` and `path` are optional in operator-supplied JSON; they default
/// to the platform wildcard domain and `/` when installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CookieEntry {
    pub fn domain_or_default(&self) -> &str {
        self.domain.as_deref().unwrap_or(PLATFORM_COOKIE_DOMAIN)
    }

    pub fn path_or_default(&self) -> &str {
        self.path.as_deref().unwrap_or("/")
    }
}

/// An ordered set of cookies authenticating one operator account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialBundle {
    pub cookies: Vec<CookieEntry>,
}

impl CredentialBundle {
    /// Parse a single bundle from its JSON serialisation (the `X_COOKIES`
    /// config value).
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Parse the `X_COOKIES_LIST` config value.
    ///
    /// Operators paste two shapes: a JSON array of bundles, or an array of
    /// JSON-string bundles. Both are accepted; unparseable elements are
    /// skipped rather than failing the whole list.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(raw) else {
            return Vec::new();
        };
        values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Self::from_json(&s).ok(),
                other => serde_json::from_value(other).ok(),
            })
            .filter(|b: &Self| !b.cookies.is_empty())
            .collect()
    }

    /// The session cookie the platform requires for any reply page.
    pub fn has_auth_token(&self) -> bool {
        self.cookies.iter().any(|c| c.name == "auth_token")
    }
}

/// Reply ordering requested from the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Recent,
    Top,
}

/// Options applied to one reply enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyScrapeOptions {
    pub sort_mode: SortMode,
    pub expand_folded_replies: bool,
}

/// What a harvest run is pointed at; doubles as the progress-channel key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HarvestTarget {
    Account(String),
    Tweet(String),
}

impl HarvestTarget {
    pub fn key(&self) -> String {
        match self {
            Self::Account(handle) => format!("account:{handle}"),
            Self::Tweet(id) => format!("tweet:{id}"),
        }
    }
}

impl std::fmt::Display for HarvestTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}
