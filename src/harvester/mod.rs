//! Shared harvester plumbing: emission, progress accounting, retries
//!
//! The [`Emitter`] is the single funnel every harvested record passes
//! through: persist first, then the optional observer callback, then a
//! progress-channel update. Roots always flow through before any of their
//! replies, which is what makes UI filters by root author work while
//! replies are still streaming in.

pub mod account;
pub mod post;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::driver::HarvestPage;
use crate::enumerator::ReplySink;
use crate::error::{HarvestError, is_retryable_navigation};
use crate::progress::ProgressChannel;
use crate::records::{Reply, RootPost, ScrapeProgress, ScrapeStage};
use crate::store::ReplyStore;

/// Observer invoked after a root post is validated and persisted.
pub type RootCallback = Arc<dyn Fn(&RootPost) -> anyhow::Result<()> + Send + Sync>;
/// Observer invoked after a reply is validated and persisted.
pub type ReplyCallback = Arc<dyn Fn(&Reply) -> anyhow::Result<()> + Send + Sync>;

/// Optional observers; errors they return are logged and swallowed.
#[derive(Clone, Default)]
pub struct HarvestCallbacks {
    pub on_root_post: Option<RootCallback>,
    pub on_reply: Option<ReplyCallback>,
}

#[derive(Debug, Clone)]
struct Counters {
    stage: ScrapeStage,
    posts_found: u64,
    replies_found: u64,
    current_post: u64,
    total_posts: u64,
    current_credential: u64,
    total_credentials: u64,
}

/// Emission funnel for one harvest run.
pub struct Emitter {
    store: Arc<dyn ReplyStore>,
    progress: Arc<ProgressChannel>,
    target_key: String,
    callbacks: HarvestCallbacks,
    counters: Mutex<Counters>,
}

impl Emitter {
    pub fn new(
        store: Arc<dyn ReplyStore>,
        progress: Arc<ProgressChannel>,
        target_key: String,
        callbacks: HarvestCallbacks,
    ) -> Self {
        Self {
            store,
            progress,
            target_key,
            callbacks,
            counters: Mutex::new(Counters {
                stage: ScrapeStage::Init,
                posts_found: 0,
                replies_found: 0,
                current_post: 0,
                total_posts: 0,
                current_credential: 0,
                total_credentials: 0,
            }),
        }
    }

    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    pub fn set_credentials(&self, current: u64, total: u64) {
        let mut c = self.counters.lock();
        c.current_credential = current;
        c.total_credentials = total;
    }

    /// Move to a new stage and publish it.
    pub fn stage(&self, stage: ScrapeStage, message: impl Into<String>) {
        self.counters.lock().stage = stage;
        self.publish(message.into());
    }

    /// Position within the collected roots (account harvests).
    pub fn begin_post(&self, current: u64, total: u64) {
        let mut c = self.counters.lock();
        c.current_post = current;
        c.total_posts = total;
    }

    pub fn replies_found(&self) -> u64 {
        self.counters.lock().replies_found
    }

    pub fn posts_found(&self) -> u64 {
        self.counters.lock().posts_found
    }

    fn publish(&self, message: String) {
        let c = self.counters.lock().clone();
        let progress = ScrapeProgress {
            stage: c.stage,
            posts_found: c.posts_found,
            replies_found: c.replies_found,
            current_post: c.current_post,
            total_posts: c.total_posts,
            current_credential: c.current_credential,
            total_credentials: c.total_credentials,
            message,
            updated_at: chrono::Utc::now(),
        };
        self.progress.set(&self.target_key, progress);
    }

    /// Persist a root post, notify the observer, publish progress.
    pub async fn emit_root(&self, root: &RootPost) -> Result<(), HarvestError> {
        self.store.upsert_root_post(root).await?;
        if let Some(callback) = &self.callbacks.on_root_post
            && let Err(e) = callback(root)
        {
            warn!(root_id = %root.id, "root-post callback failed: {e:#}");
        }
        let message = {
            let mut c = self.counters.lock();
            c.posts_found += 1;
            format!("collected post {} by @{}", root.id, root.author_handle)
        };
        self.publish(message);
        Ok(())
    }
}

#[async_trait]
impl ReplySink for Emitter {
    async fn on_reply(&self, reply: &Reply) -> Result<(), HarvestError> {
        self.store.upsert_reply(reply).await?;
        if let Some(callback) = &self.callbacks.on_reply
            && let Err(e) = callback(reply)
        {
            warn!(reply_id = %reply.id, "reply callback failed: {e:#}");
        }
        let message = {
            let mut c = self.counters.lock();
            c.replies_found += 1;
            format!("fetched {} replies", c.replies_found)
        };
        self.publish(message);
        Ok(())
    }
}

/// Backoff ladder between navigation retries.
const NAVIGATION_BACKOFF: [Duration; 3] = [
    Duration::from_secs(3),
    Duration::from_secs(5),
    Duration::from_secs(7),
];

/// Navigate with the retry ladder: only connection-level failures are
/// retried, everything else surfaces immediately.
pub(crate) async fn navigate_with_retry(
    page: &dyn HarvestPage,
    url: &str,
    timeout: Duration,
) -> Result<(), HarvestError> {
    let mut last_error = match page.goto(url, timeout).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    for backoff in NAVIGATION_BACKOFF {
        let HarvestError::Navigation(message) = &last_error else {
            return Err(last_error);
        };
        if !is_retryable_navigation(message) {
            return Err(last_error);
        }
        debug!(url, "navigation failed ({message}); retrying in {backoff:?}");
        tokio::time::sleep(backoff).await;
        match page.goto(url, timeout).await {
            Ok(()) => return Ok(()),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}
