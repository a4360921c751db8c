//! Browser capability seam
//!
//! The enumerator and harvesters never talk to CDP directly; they drive a
//! [`HarvestPage`], which yields plain-data snapshots of the live DOM. The
//! production implementation ([`cdp::CdpPage`]) binds to chromiumoxide; tests
//! substitute a scripted fake.

pub mod cdp;
pub mod js;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::HarvestError;
use crate::records::{CredentialBundle, SortMode};

/// One post-card element as observed in a single evaluation round-trip.
///
/// All fields are extracted in-page by [`js::CARDS_SCRIPT`]; the pure
/// functions in [`crate::extract`] turn a snapshot into a record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CardSnapshot {
    /// Ids found in `/status/N` anchors, in DOM order.
    pub status_ids: Vec<String>,
    /// Id from the anchor that wraps the card's `<time>` element.
    pub time_anchor_id: Option<String>,
    /// The `<time datetime>` attribute, RFC 3339.
    pub datetime: Option<String>,
    /// Text of the post-body container; may be empty.
    pub text: String,
    /// Author block flattened to `"<name>@<handle>"`.
    pub author_line: String,
    /// Title of an embedded link card, when present.
    pub card_title: Option<String>,
    pub has_photo: bool,
    pub has_video_player: bool,
    pub has_raw_video: bool,
    /// Raw engagement labels as rendered (`"1.2K"`, `"3,400"`, …).
    pub reply_count: Option<String>,
    pub repost_count: Option<String>,
    pub like_count: Option<String>,
    /// Absolute top of the card's bounding box, in page pixels.
    pub top_y: f64,
}

/// Raw signals for the login-wall predicate, gathered in one round-trip.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginProbe {
    pub has_login_prompt: bool,
    pub has_replies_teaser: bool,
    pub card_count: usize,
}

/// A live page under harvest, reduced to the operations the engine needs.
#[async_trait]
pub trait HarvestPage: Send + Sync {
    /// Navigate and wait for DOMContentLoaded, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), HarvestError>;

    /// Wait until `selector` matches at least one element.
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), HarvestError>;

    /// Snapshot every post card currently in the DOM, in DOM order.
    async fn card_snapshots(&self) -> Result<Vec<CardSnapshot>, HarvestError>;

    /// Absolute y of the first recommendations heading, or `+∞` when the
    /// page has none.
    async fn recommendation_cutoff_y(&self) -> Result<f64, HarvestError>;

    /// Click the tab that switches reply ordering. Returns whether a tab
    /// was found; absence is not an error.
    async fn switch_sort_tab(&self, mode: SortMode) -> Result<bool, HarvestError>;

    /// Click the first visible folded-branch expander. Returns whether one
    /// was clicked; the caller owns the pause between clicks.
    async fn click_expander(&self) -> Result<bool, HarvestError>;

    async fn scroll_last_card_into_view(&self) -> Result<(), HarvestError>;
    async fn scroll_primary_column_to_bottom(&self) -> Result<(), HarvestError>;
    async fn scroll_window_by(&self, pixels: f64) -> Result<(), HarvestError>;
    async fn scroll_to_bottom(&self) -> Result<(), HarvestError>;

    /// Full body text, for unavailable-vs-login probes.
    async fn body_text(&self) -> Result<String, HarvestError>;

    /// Signals for the login-wall predicate.
    async fn login_probe(&self) -> Result<LoginProbe, HarvestError>;

    /// Close the page. Must be called on every exit path.
    async fn close(&self) -> Result<(), HarvestError>;
}

/// Hands out pages backed by some browser. The orchestrator owns one
/// provider; tests inject a scripted one.
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn acquire_page(
        &self,
        credential: Option<&CredentialBundle>,
    ) -> Result<Box<dyn HarvestPage>, HarvestError>;
}
