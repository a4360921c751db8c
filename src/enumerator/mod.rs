//! Reply enumeration: the two-phase scroll + bottom-sweep loop
//!
//! One coherent state machine per root post:
//!
//! ```text
//!   SwitchSort ──► ScrollRound ◄──► ClickExpand
//!                      │ (no-new threshold or budget exhausted)
//!                      ▼
//!                 BottomSweep ──► Done
//! ```
//!
//! Transitions are driven by `new_replies_this_round` and the budget
//! counters; a login wall or page failure is the error terminal. Phase A
//! (`ScrollRound`/`ClickExpand`) walks the conversation with the standard
//! scroll trio; Phase B (`BottomSweep`) hammers `scrollTo(bottom)` to drain
//! lazy-loaded trailing batches Phase A missed. Ids are deduplicated in a
//! seen-set seeded with the root id, so DOM repositioning after scroll
//! never doubles a reply.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::driver::HarvestPage;
use crate::error::HarvestError;
use crate::extract;
use crate::pacing::Pacer;
use crate::records::{Reply, ReplyScrapeOptions};

/// Pause after switching the sort tab.
const SORT_SWITCH_SETTLE: Duration = Duration::from_secs(2);
/// Pause after each folded-branch expansion click.
const EXPAND_SETTLE: Duration = Duration::from_secs(4);
/// Maximum expansion clicks per scroll round.
const MAX_EXPAND_CLICKS: u32 = 8;
/// Extra scroll rounds granted per successful expansion click.
const EXPAND_BUDGET_BONUS: u32 = 2;
/// Window scroll step inside a round, in pixels.
const WINDOW_SCROLL_STEP: f64 = 1600.0;

/// Receives each reply as it is discovered, in DOM order.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn on_reply(&self, reply: &Reply) -> Result<(), HarvestError>;
}

/// Effort bounds for one enumeration, dev/prod defaults with env overrides.
#[derive(Debug, Clone, Copy)]
pub struct EnumeratorBudgets {
    /// Phase A scroll rounds (`SCRAPER_SCROLL_BUDGET`).
    pub scroll_budget: u32,
    /// Consecutive no-new rounds ending Phase A (`SCRAPER_MAX_SCROLLS_NO_NEW`).
    pub max_scrolls_no_new: u32,
    /// Scroll delay on reply pages, replaces the pacing table's scroll delay
    /// (`SCRAPER_REPLY_SCROLL_DELAY_MS`).
    pub reply_scroll_delay_ms: u64,
    /// Phase B round cap (`SCRAPER_BOTTOM_ROUNDS`).
    pub bottom_rounds: u32,
    /// Consecutive no-new rounds ending Phase B (`SCRAPER_BOTTOM_NO_NEW`).
    pub bottom_no_new: u32,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl EnumeratorBudgets {
    /// Defaults for this build profile, each overridable via environment.
    pub fn from_env() -> Self {
        let dev = cfg!(debug_assertions);
        Self {
            scroll_budget: env_u64("SCRAPER_SCROLL_BUDGET", if dev { 120 } else { 1800 }) as u32,
            max_scrolls_no_new: env_u64("SCRAPER_MAX_SCROLLS_NO_NEW", if dev { 10 } else { 40 })
                as u32,
            reply_scroll_delay_ms: env_u64(
                "SCRAPER_REPLY_SCROLL_DELAY_MS",
                if dev { 1200 } else { 4800 },
            ),
            bottom_rounds: env_u64("SCRAPER_BOTTOM_ROUNDS", if dev { 30 } else { 120 }) as u32,
            bottom_no_new: env_u64("SCRAPER_BOTTOM_NO_NEW", if dev { 6 } else { 20 }) as u32,
        }
    }
}

impl Default for EnumeratorBudgets {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Enumerate every reply under one root post.
///
/// Emits replies through `sink` in DOM order under the requested sort and
/// returns the number emitted. Fatal for the current credential when the
/// page shows a login wall.
pub async fn enumerate_replies(
    page: &dyn HarvestPage,
    root_id: &str,
    options: ReplyScrapeOptions,
    pacer: &Pacer,
    budgets: &EnumeratorBudgets,
    sink: &dyn ReplySink,
) -> Result<u64, HarvestError> {
    if extract::is_login_walled(&page.login_probe().await?) {
        return Err(HarvestError::LoginWall(format!(
            "reply page for {root_id} is behind a login wall"
        )));
    }

    // SwitchSort: at most one attempt; an absent tab is not an error.
    if page.switch_sort_tab(options.sort_mode).await? {
        debug!(root_id, sort = ?options.sort_mode, "switched reply sort tab");
        tokio::time::sleep(SORT_SWITCH_SETTLE).await;
    }

    let mut seen: HashSet<String> = HashSet::from([root_id.to_string()]);
    let mut emitted: u64 = 0;

    // Phase A: standard scroll rounds.
    let mut budget = budgets.scroll_budget;
    let mut rounds = 0u32;
    let mut no_new_rounds = 0u32;
    while rounds < budget {
        rounds += 1;
        let new_this_round = harvest_round(page, root_id, &mut seen, sink).await?;
        emitted += new_this_round;

        if new_this_round == 0 {
            no_new_rounds += 1;
            if no_new_rounds >= budgets.max_scrolls_no_new {
                debug!(root_id, rounds, "phase A drained ({no_new_rounds} quiet rounds)");
                break;
            }
        } else {
            no_new_rounds = 0;
        }

        page.scroll_last_card_into_view().await?;
        page.scroll_primary_column_to_bottom().await?;
        page.scroll_window_by(WINDOW_SCROLL_STEP).await?;
        pacer.delay(budgets.reply_scroll_delay_ms).await;

        if options.expand_folded_replies {
            let mut clicks = 0u32;
            while clicks < MAX_EXPAND_CLICKS && page.click_expander().await? {
                clicks += 1;
                tokio::time::sleep(EXPAND_SETTLE).await;
            }
            if clicks > 0 {
                budget = budget.saturating_add(clicks * EXPAND_BUDGET_BONUS);
                debug!(root_id, clicks, budget, "expanded folded branches");
            }
        }
    }

    // Phase B: bottom sweep for lazy-loaded trailing batches.
    let mut bottom_no_new = 0u32;
    for _ in 0..budgets.bottom_rounds {
        if bottom_no_new >= budgets.bottom_no_new {
            break;
        }
        page.scroll_to_bottom().await?;
        pacer.delay(budgets.reply_scroll_delay_ms).await;

        let new_this_round = harvest_round(page, root_id, &mut seen, sink).await?;
        emitted += new_this_round;
        if new_this_round == 0 {
            bottom_no_new += 1;
        } else {
            bottom_no_new = 0;
        }
    }

    info!(root_id, emitted, "reply enumeration finished");
    Ok(emitted)
}

/// One enumeration pass: snapshot the cards, emit every unseen reply above
/// the recommendation cutoff. Returns how many were new.
async fn harvest_round(
    page: &dyn HarvestPage,
    root_id: &str,
    seen: &mut HashSet<String>,
    sink: &dyn ReplySink,
) -> Result<u64, HarvestError> {
    let cutoff_y = page.recommendation_cutoff_y().await?;
    let cards = page.card_snapshots().await?;

    let mut new_count = 0u64;
    for card in &cards {
        if card.top_y > cutoff_y {
            // Below the "More posts" divider: recommendations, not thread.
            continue;
        }
        let Some(id) = extract::extract_id(card, Some(root_id)) else {
            continue;
        };
        if seen.contains(&id) {
            continue;
        }
        match extract::extract_reply(card, root_id) {
            Some(reply) => {
                seen.insert(reply.id.clone());
                sink.on_reply(&reply).await?;
                new_count += 1;
            }
            None => {
                // Per-card extraction failure: skip and move on.
                debug!(root_id, card_id = %id, "card did not yield a reply");
            }
        }
    }
    Ok(new_count)
}
