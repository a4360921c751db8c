//! Single-post harvester
//!
//! Opens one root post by permalink, emits the root, and delegates to the
//! reply enumerator. Distinguishes "post gone" from "login required" via
//! body-text probes when the conversation never renders.

use std::time::Duration;

use tracing::{info, warn};

use super::{Emitter, navigate_with_retry};
use crate::driver::HarvestPage;
use crate::enumerator::{self, EnumeratorBudgets};
use crate::error::HarvestError;
use crate::extract;
use crate::pacing::Pacer;
use crate::records::{PLATFORM_HOST, PLATFORM_LEGACY_HOST, ReplyScrapeOptions, ScrapeStage};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Wait for the first post card after navigation settles.
const CARD_WAIT_TIMEOUT: Duration = Duration::from_secs(25);
/// Extra settle time for the SPA to hydrate after DOMContentLoaded.
const SPA_SETTLE: Duration = Duration::from_secs(4);

/// Harvest one root post and all its replies. Returns the reply count.
pub async fn harvest_single_post(
    page: &dyn HarvestPage,
    root_id: &str,
    options: ReplyScrapeOptions,
    pacer: &Pacer,
    budgets: &EnumeratorBudgets,
    emitter: &Emitter,
) -> Result<u64, HarvestError> {
    emitter.stage(ScrapeStage::Loading, format!("opening post {root_id}"));
    open_permalink(page, root_id).await?;
    pacer.page_load_delay().await;
    tokio::time::sleep(SPA_SETTLE).await;

    if let Err(wait_err) = page.wait_for_selector("article", CARD_WAIT_TIMEOUT).await {
        return Err(diagnose_missing_conversation(page, root_id, wait_err).await);
    }

    let cutoff_y = page.recommendation_cutoff_y().await?;
    let cards = page.card_snapshots().await?;
    let root_card = cards
        .iter()
        .find(|c| c.top_y <= cutoff_y)
        .ok_or_else(|| HarvestError::PostUnavailable(format!("post {root_id} rendered no cards")))?;

    let mut root = extract::extract_root_post(root_card)
        .ok_or_else(|| HarvestError::PostUnavailable(format!("post {root_id} card unreadable")))?;
    // The permalink's first card is the root; trust the requested id over
    // whatever anchor the card exposed.
    root.id = root_id.to_string();

    emitter.stage(ScrapeStage::FetchingReplies, format!("fetching replies for {root_id}"));
    emitter.emit_root(&root).await?;

    let replies =
        enumerator::enumerate_replies(page, root_id, options, pacer, budgets, emitter).await?;
    info!(root_id, replies, "single-post harvest finished");
    Ok(replies)
}

/// Try the permalink candidates in order; a persistent connection failure
/// across all of them is a terminal network error.
async fn open_permalink(page: &dyn HarvestPage, root_id: &str) -> Result<(), HarvestError> {
    let candidates = [
        format!("https://{PLATFORM_HOST}/i/status/{root_id}"),
        format!("https://{PLATFORM_LEGACY_HOST}/i/status/{root_id}"),
    ];

    let mut last_error = None;
    for url in &candidates {
        match navigate_with_retry(page, url, NAVIGATION_TIMEOUT).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(url, "permalink navigation failed: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        HarvestError::Navigation(format!("no permalink candidate reachable for {root_id}"))
    }))
}

/// The conversation never rendered; decide why.
async fn diagnose_missing_conversation(
    page: &dyn HarvestPage,
    root_id: &str,
    wait_err: HarvestError,
) -> HarvestError {
    let body = match page.body_text().await {
        Ok(body) => body,
        Err(_) => return wait_err,
    };
    let lowered = body.to_lowercase();

    const GONE_PROBES: [&str; 4] = [
        "doesn't exist",
        "page doesn't exist",
        "this post is unavailable",
        "该帖子不可用",
    ];
    const LOGIN_PROBES: [&str; 4] = ["log in", "sign up", "登录", "注册"];

    if GONE_PROBES.iter().any(|probe| lowered.contains(probe) || body.contains(probe)) {
        return HarvestError::PostUnavailable(format!("post {root_id} is deleted or restricted"));
    }
    if LOGIN_PROBES.iter().any(|probe| lowered.contains(probe) || body.contains(probe)) {
        return HarvestError::LoginWall(format!("post {root_id} requires an authenticated session"));
    }
    wait_err
}
