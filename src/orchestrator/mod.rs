//! Harvest orchestration: method selection, wall-clock cap, API fallback
//!
//! Entry points for one harvest run. `browser`/`auto` drive the headless
//! browser under a hard wall-clock cap; a browser-launch failure with an
//! available `APIFY_TOKEN` transparently switches to the scraping API, as
//! does any other terminal error in `auto` mode. Fatal conditions never
//! cross the public surface as panics or raw errors: every run ends with a
//! terminal progress record and a structured [`ScrapeOutcome`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::apify::ApifyClient;
use crate::browser::SharedBrowser;
use crate::browser::setup::resolve_proxy;
use crate::credentials::CredentialRotator;
use crate::driver::PageProvider;
use crate::driver::cdp::CdpProvider;
use crate::enumerator::EnumeratorBudgets;
use crate::error::{HarvestError, is_browser_launch_failure};
use crate::harvester::{self, Emitter, HarvestCallbacks};
use crate::pacing::{Pacer, PacingPreset};
use crate::progress::ProgressChannel;
use crate::records::{CredentialBundle, HarvestTarget, ReplyScrapeOptions, ScrapeStage};
use crate::store::{
    ConfigStore, KEY_APIFY_TOKEN, KEY_PROXY_URL, KEY_SCRAPE_PACING_PRESET, KEY_X_COOKIES,
    KEY_X_COOKIES_LIST, ReplyStore,
};

/// Hard wall-clock cap per entry-point run.
pub const DEFAULT_WALL_CLOCK_CAP: Duration = Duration::from_secs(600);
/// Secondary race cap the orchestrator puts around context creation.
const CONTEXT_RACE_CAP: Duration = Duration::from_secs(15);
/// Reply ceiling handed to the scraping API per conversation.
const API_MAX_REPLIES: usize = 1000;

/// How a harvest should reach the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrapeMethod {
    Browser,
    Api,
    #[default]
    Auto,
}

impl ScrapeMethod {
    /// Parse the method name; `"playwright"` is the legacy alias for the
    /// browser engine. Unknown names mean `auto`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "browser" | "playwright" => Self::Browser,
            "api" | "apify" => Self::Api,
            _ => Self::Auto,
        }
    }
}

/// Structured result of one harvest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeOutcome {
    pub success: bool,
    /// Engine that produced the final result: `"browser"` or `"api"`.
    pub method: &'static str,
    pub posts_found: u64,
    pub replies_found: u64,
    pub error: Option<String>,
}

/// What one run is asked to do.
#[derive(Debug, Clone)]
enum HarvestJob {
    Account { handle: String, max_posts: usize },
    Post { root_id: String },
}

impl HarvestJob {
    fn target(&self) -> HarvestTarget {
        match self {
            Self::Account { handle, .. } => HarvestTarget::Account(handle.clone()),
            Self::Post { root_id } => HarvestTarget::Tweet(root_id.clone()),
        }
    }
}

/// Coordinates one harvest at a time against the shared resources.
pub struct Orchestrator {
    store: Arc<dyn ReplyStore>,
    config: Arc<dyn ConfigStore>,
    progress: Arc<ProgressChannel>,
    provider: Arc<dyn PageProvider>,
    rotator: Arc<CredentialRotator>,
    pacer: Arc<Pacer>,
    budgets: EnumeratorBudgets,
    callbacks: HarvestCallbacks,
    wall_clock_cap: Duration,
    api_base_url: Option<String>,
    api_poll_interval: Option<Duration>,
}

impl Orchestrator {
    /// Wire an orchestrator against explicit collaborators; tests inject a
    /// scripted provider here.
    pub fn new(
        store: Arc<dyn ReplyStore>,
        config: Arc<dyn ConfigStore>,
        progress: Arc<ProgressChannel>,
        provider: Arc<dyn PageProvider>,
    ) -> Self {
        Self {
            store,
            config,
            progress,
            provider,
            rotator: Arc::new(CredentialRotator::new()),
            pacer: Arc::new(Pacer::default()),
            budgets: EnumeratorBudgets::from_env(),
            callbacks: HarvestCallbacks::default(),
            wall_clock_cap: DEFAULT_WALL_CLOCK_CAP,
            api_base_url: None,
            api_poll_interval: None,
        }
    }

    /// Production wiring: shared browser, global rotator/pacer/progress.
    pub fn with_browser(store: Arc<dyn ReplyStore>, config: Arc<dyn ConfigStore>) -> Self {
        let browser = Arc::new(SharedBrowser::new());
        let provider = Arc::new(CdpProvider::new(browser, Arc::clone(&config)));
        let mut this = Self::new(store, config, crate::progress::global_progress(), provider);
        this.rotator = crate::credentials::global_rotator();
        this.pacer = crate::pacing::global_pacer();
        this
    }

    pub fn with_rotator(mut self, rotator: Arc<CredentialRotator>) -> Self {
        self.rotator = rotator;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_budgets(mut self, budgets: EnumeratorBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_callbacks(mut self, callbacks: HarvestCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_wall_clock_cap(mut self, cap: Duration) -> Self {
        self.wall_clock_cap = cap;
        self
    }

    /// Point the fallback client at a different API origin (tests).
    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(base_url.into());
        self
    }

    pub fn with_api_poll_interval(mut self, interval: Duration) -> Self {
        self.api_poll_interval = Some(interval);
        self
    }

    /// Harvest a profile's recent posts and their replies.
    pub async fn scrape_account(
        &self,
        handle: &str,
        max_posts: usize,
        options: ReplyScrapeOptions,
        method: ScrapeMethod,
    ) -> ScrapeOutcome {
        let job = HarvestJob::Account {
            handle: handle.to_string(),
            max_posts,
        };
        self.run(job, options, method).await
    }

    /// Harvest one root post and its replies; the engine is auto-selected.
    pub async fn scrape_root_post(
        &self,
        root_id: &str,
        options: ReplyScrapeOptions,
    ) -> ScrapeOutcome {
        self.scrape_root_post_with(root_id, options, ScrapeMethod::Auto)
            .await
    }

    pub async fn scrape_root_post_with(
        &self,
        root_id: &str,
        options: ReplyScrapeOptions,
        method: ScrapeMethod,
    ) -> ScrapeOutcome {
        let job = HarvestJob::Post {
            root_id: root_id.to_string(),
        };
        self.run(job, options, method).await
    }

    async fn run(
        &self,
        job: HarvestJob,
        options: ReplyScrapeOptions,
        method: ScrapeMethod,
    ) -> ScrapeOutcome {
        let target = job.target();
        let key = target.key();
        self.progress.clear(&key);
        self.apply_pacing_preset().await;

        let emitter = Emitter::new(
            Arc::clone(&self.store),
            Arc::clone(&self.progress),
            key.clone(),
            self.callbacks.clone(),
        );
        emitter.stage(ScrapeStage::Init, format!("starting harvest of {target}"));

        let credential = self.pick_credential(&emitter).await;
        let token = self
            .config
            .get(KEY_APIFY_TOKEN)
            .await
            .filter(|t| !t.trim().is_empty());

        let (method_used, result) = match method {
            ScrapeMethod::Api => (
                "api",
                self.api_attempt(&job, options, &emitter, token).await,
            ),
            ScrapeMethod::Browser | ScrapeMethod::Auto => {
                let browser_result = self
                    .browser_attempt(&job, options, &emitter, credential.as_ref())
                    .await;
                match browser_result {
                    Ok(()) => ("browser", Ok(())),
                    Err(e) => {
                        let fallback_allowed = token.is_some()
                            && (method == ScrapeMethod::Auto || is_browser_launch_failure(&e));
                        if fallback_allowed {
                            warn!(target = %key, "browser path failed ({e}); switching to API");
                            emitter.stage(
                                ScrapeStage::Loading,
                                "browser unavailable; switching to the scraping API",
                            );
                            ("api", self.api_attempt(&job, options, &emitter, token).await)
                        } else {
                            ("browser", Err(e))
                        }
                    }
                }
            }
        };

        let posts_found = emitter.posts_found();
        let replies_found = emitter.replies_found();
        match result {
            Ok(()) => {
                emitter.stage(
                    ScrapeStage::Complete,
                    format!("harvest complete: {posts_found} posts, {replies_found} replies"),
                );
                info!(target = %key, posts_found, replies_found, method = method_used, "harvest complete");
                ScrapeOutcome {
                    success: true,
                    method: method_used,
                    posts_found,
                    replies_found,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                emitter.stage(ScrapeStage::Error, message.clone());
                warn!(target = %key, method = method_used, "harvest failed: {message}");
                ScrapeOutcome {
                    success: false,
                    method: method_used,
                    posts_found,
                    replies_found,
                    error: Some(message),
                }
            }
        }
    }

    /// Browser attempt under the wall-clock cap; the page is closed on
    /// every exit path and the browser stays warm for the next run.
    async fn browser_attempt(
        &self,
        job: &HarvestJob,
        options: ReplyScrapeOptions,
        emitter: &Emitter,
        credential: Option<&CredentialBundle>,
    ) -> Result<(), HarvestError> {
        let page = tokio::time::timeout(CONTEXT_RACE_CAP, self.provider.acquire_page(credential))
            .await
            .map_err(|_| HarvestError::Timeout("context acquire", CONTEXT_RACE_CAP))??;

        let attempt = async {
            match job {
                HarvestJob::Account { handle, max_posts } => {
                    harvester::account::harvest_account(
                        page.as_ref(),
                        handle,
                        *max_posts,
                        options,
                        &self.pacer,
                        &self.budgets,
                        emitter,
                    )
                    .await
                    .map(|_| ())
                }
                HarvestJob::Post { root_id } => harvester::post::harvest_single_post(
                    page.as_ref(),
                    root_id,
                    options,
                    &self.pacer,
                    &self.budgets,
                    emitter,
                )
                .await
                .map(|_| ()),
            }
        };

        let result = match tokio::time::timeout(self.wall_clock_cap, attempt).await {
            Ok(result) => result,
            Err(_) => Err(HarvestError::WallClock(self.wall_clock_cap)),
        };

        // The page closes on every exit path, wall-clock timeout included;
        // the browser itself stays warm.
        if let Err(e) = page.close().await {
            warn!("failed to close page: {e}");
        }
        result
    }

    async fn api_attempt(
        &self,
        job: &HarvestJob,
        options: ReplyScrapeOptions,
        emitter: &Emitter,
        token: Option<String>,
    ) -> Result<(), HarvestError> {
        let token = token.ok_or_else(|| {
            HarvestError::Config("APIFY_TOKEN is not configured; cannot use the API engine".into())
        })?;
        let proxy = resolve_proxy(self.config.get(KEY_PROXY_URL).await);

        let mut client = ApifyClient::new(token, proxy.as_deref())?;
        if let Some(base_url) = &self.api_base_url {
            client = client.with_base_url(base_url.clone());
        }
        if let Some(interval) = self.api_poll_interval {
            client = client.with_poll_interval(interval);
        }

        let attempt = async {
            match job {
                HarvestJob::Account { handle, max_posts } => {
                    let roots = client.fetch_timeline_roots(handle, *max_posts).await?;
                    let total = roots.len() as u64;
                    for (index, root) in roots.iter().enumerate() {
                        emitter.begin_post(index as u64 + 1, total);
                        emitter.emit_root(root).await?;
                        client
                            .harvest_conversation(
                                &root.id,
                                options.sort_mode,
                                API_MAX_REPLIES,
                                false,
                                emitter,
                            )
                            .await?;
                    }
                    Ok(())
                }
                HarvestJob::Post { root_id } => client
                    .harvest_conversation(root_id, options.sort_mode, API_MAX_REPLIES, true, emitter)
                    .await
                    .map(|_| ()),
            }
        };

        match tokio::time::timeout(self.wall_clock_cap, attempt).await {
            Ok(result) => result,
            Err(_) => Err(HarvestError::WallClock(self.wall_clock_cap)),
        }
    }

    /// Seed the ring from config on first use, then snapshot one bundle
    /// for this run.
    async fn pick_credential(&self, emitter: &Emitter) -> Option<CredentialBundle> {
        if self.rotator.count() == 0 {
            let mut bundles = Vec::new();
            if let Some(raw) = self.config.get(KEY_X_COOKIES_LIST).await {
                bundles = CredentialBundle::parse_list(&raw);
            }
            if bundles.is_empty()
                && let Some(raw) = self.config.get(KEY_X_COOKIES).await
                && let Ok(bundle) = CredentialBundle::from_json(&raw)
                && !bundle.cookies.is_empty()
            {
                bundles.push(bundle);
            }
            if !bundles.is_empty() {
                self.rotator.set_all(bundles);
            }
        }

        let total = self.rotator.count() as u64;
        let index = self.rotator.current_index() as u64;
        let bundle = self.rotator.next();
        match &bundle {
            Some(b) => {
                emitter.set_credentials(index + 1, total);
                if !b.has_auth_token() {
                    warn!("selected credential bundle has no auth_token; a login wall is likely");
                }
            }
            None => emitter.set_credentials(0, 0),
        }
        bundle
    }

    async fn apply_pacing_preset(&self) {
        if let Some(name) = self.config.get(KEY_SCRAPE_PACING_PRESET).await {
            self.pacer.set_preset(PacingPreset::parse(&name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing_with_legacy_alias() {
        assert_eq!(ScrapeMethod::parse("browser"), ScrapeMethod::Browser);
        assert_eq!(ScrapeMethod::parse("playwright"), ScrapeMethod::Browser);
        assert_eq!(ScrapeMethod::parse("api"), ScrapeMethod::Api);
        assert_eq!(ScrapeMethod::parse("apify"), ScrapeMethod::Api);
        assert_eq!(ScrapeMethod::parse("auto"), ScrapeMethod::Auto);
        assert_eq!(ScrapeMethod::parse("whatever"), ScrapeMethod::Auto);
    }
}
