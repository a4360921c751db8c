//! Profile-page harvester
//!
//! Collects up to `max_posts` recent root posts from a profile timeline,
//! then fans out to the reply enumerator for each. `max_posts` is only an
//! upper bound: progress indexes over what was actually collected.

use std::time::Duration;

use tracing::{debug, info};

use super::{Emitter, navigate_with_retry};
use crate::driver::HarvestPage;
use crate::enumerator::{self, EnumeratorBudgets};
use crate::error::HarvestError;
use crate::extract;
use crate::pacing::Pacer;
use crate::records::{PLATFORM_HOST, ReplyScrapeOptions, RootPost, ScrapeStage};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Wait for the profile chrome (tab list + first post card).
const PROFILE_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Harvest a profile's recent posts and all their replies.
///
/// Returns `(posts, replies)` emitted.
pub async fn harvest_account(
    page: &dyn HarvestPage,
    handle: &str,
    max_posts: usize,
    options: ReplyScrapeOptions,
    pacer: &Pacer,
    budgets: &EnumeratorBudgets,
    emitter: &Emitter,
) -> Result<(u64, u64), HarvestError> {
    let profile_url = format!("https://{PLATFORM_HOST}/{handle}");
    emitter.stage(ScrapeStage::Loading, format!("opening profile @{handle}"));

    navigate_with_retry(page, &profile_url, NAVIGATION_TIMEOUT).await?;
    pacer.page_load_delay().await;

    page.wait_for_selector("[role=\"tablist\"]", PROFILE_READY_TIMEOUT)
        .await?;
    page.wait_for_selector("article", PROFILE_READY_TIMEOUT)
        .await?;

    emitter.stage(
        ScrapeStage::FetchingPosts,
        format!("collecting up to {max_posts} posts from @{handle}"),
    );
    let roots = collect_roots(page, max_posts, pacer, budgets).await?;
    info!(handle, collected = roots.len(), "root posts collected");

    let total = roots.len() as u64;
    let mut replies_total = 0u64;
    for (index, root) in roots.iter().enumerate() {
        emitter.begin_post(index as u64 + 1, total);
        emitter.emit_root(root).await?;

        let permalink = format!("https://{PLATFORM_HOST}/i/status/{}", root.id);
        navigate_with_retry(page, &permalink, NAVIGATION_TIMEOUT).await?;
        pacer.page_load_delay().await;

        emitter.stage(
            ScrapeStage::FetchingReplies,
            format!("fetching replies for post {}/{total}", index + 1),
        );
        replies_total +=
            enumerator::enumerate_replies(page, &root.id, options, pacer, budgets, emitter).await?;

        pacer.between_posts_delay().await;
    }

    Ok((total, replies_total))
}

/// Scroll the timeline until `max_posts` unique roots above the
/// recommendation cutoff are collected, or the timeline stops yielding.
async fn collect_roots(
    page: &dyn HarvestPage,
    max_posts: usize,
    pacer: &Pacer,
    budgets: &EnumeratorBudgets,
) -> Result<Vec<RootPost>, HarvestError> {
    let mut roots: Vec<RootPost> = Vec::new();
    let mut no_new_rounds = 0u32;

    while roots.len() < max_posts && no_new_rounds < budgets.max_scrolls_no_new {
        let cutoff_y = page.recommendation_cutoff_y().await?;
        let cards = page.card_snapshots().await?;

        let mut new_this_round = 0usize;
        for card in &cards {
            if roots.len() >= max_posts {
                break;
            }
            if card.top_y > cutoff_y {
                continue;
            }
            let Some(root) = extract::extract_root_post(card) else {
                continue;
            };
            if roots.iter().any(|r| r.id == root.id) {
                continue;
            }
            debug!(root_id = %root.id, "collected root post");
            roots.push(root);
            new_this_round += 1;
        }

        if roots.len() >= max_posts {
            break;
        }
        if new_this_round == 0 {
            no_new_rounds += 1;
        } else {
            no_new_rounds = 0;
        }

        page.scroll_last_card_into_view().await?;
        page.scroll_window_by(1600.0).await?;
        pacer.scroll_delay().await;
    }

    Ok(roots)
}
