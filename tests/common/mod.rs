//! Scripted browser driver and store doubles shared by the integration
//! tests. `FakePage` serves canned DOM snapshots per URL and advances
//! through "views" as the engine scrolls, mimicking lazy loading.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use threadharvest::driver::{CardSnapshot, HarvestPage, LoginProbe, PageProvider};
use threadharvest::enumerator::EnumeratorBudgets;
use threadharvest::error::HarvestError;
use threadharvest::pacing::{Pacer, PacingConfig};
use threadharvest::records::{CredentialBundle, SortMode};

/// One scripted page (a URL the engine can navigate to).
#[derive(Clone, Default)]
pub struct FakeDocument {
    /// Successive card snapshots; scrolling advances to the next view.
    pub views: Vec<Vec<CardSnapshot>>,
    pub cutoff_y: f64,
    pub login_probe: LoginProbe,
    pub body_text: String,
    /// Whether the sort tab exists (first switch attempt reports a click).
    pub sort_tab_present: bool,
    /// Scripted expander clicks: each `true` is one successful click.
    pub expander_clicks: Vec<bool>,
    /// When false, `wait_for_selector` times out on this document.
    pub selector_ok: bool,
}

impl FakeDocument {
    pub fn with_views(views: Vec<Vec<CardSnapshot>>) -> Self {
        Self {
            views,
            cutoff_y: f64::INFINITY,
            selector_ok: true,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct FakePageState {
    current_url: Option<String>,
    view_index: HashMap<String, usize>,
    expander_cursor: HashMap<String, usize>,
    sort_switched: HashMap<String, bool>,
    visited: Vec<String>,
    sort_attempts: u32,
    closed: bool,
}

/// Scripted implementation of [`HarvestPage`].
#[derive(Default)]
pub struct FakePage {
    documents: Mutex<HashMap<String, FakeDocument>>,
    state: Mutex<FakePageState>,
    /// Scripted navigation failures by URL (consumed once per attempt).
    goto_errors: Mutex<HashMap<String, Vec<String>>>,
    /// When set, `goto` never completes (wall-clock timeout tests).
    pub hang_on_goto: std::sync::atomic::AtomicBool,
}

impl FakePage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_document(&self, url: &str, doc: FakeDocument) {
        self.documents.lock().insert(url.to_string(), doc);
    }

    /// Queue navigation errors for a URL; once drained, navigation succeeds.
    pub fn fail_goto(&self, url: &str, messages: &[&str]) {
        self.goto_errors.lock().insert(
            url.to_string(),
            messages.iter().map(|m| m.to_string()).collect(),
        );
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().visited.clone()
    }

    pub fn sort_attempts(&self) -> u32 {
        self.state.lock().sort_attempts
    }

    pub fn closed(&self) -> bool {
        self.state.lock().closed
    }

    fn current_doc(&self) -> Result<(String, FakeDocument), HarvestError> {
        let state = self.state.lock();
        let url = state
            .current_url
            .clone()
            .ok_or_else(|| HarvestError::Page("no page loaded".into()))?;
        let doc = self
            .documents
            .lock()
            .get(&url)
            .cloned()
            .ok_or_else(|| HarvestError::Page(format!("no document for {url}")))?;
        Ok((url, doc))
    }

    fn advance_view(&self, url: &str, views: usize) {
        if views == 0 {
            return;
        }
        let mut state = self.state.lock();
        let index = state.view_index.entry(url.to_string()).or_insert(0);
        *index = (*index + 1).min(views - 1);
    }
}

#[async_trait]
impl HarvestPage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), HarvestError> {
        if self.hang_on_goto.load(std::sync::atomic::Ordering::Relaxed) {
            std::future::pending::<()>().await;
        }
        if let Some(queue) = self.goto_errors.lock().get_mut(url)
            && !queue.is_empty()
        {
            return Err(HarvestError::Navigation(queue.remove(0)));
        }
        let mut state = self.state.lock();
        state.visited.push(url.to_string());
        state.current_url = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        _selector: &str,
        timeout: Duration,
    ) -> Result<(), HarvestError> {
        let (_, doc) = self.current_doc()?;
        if doc.selector_ok {
            Ok(())
        } else {
            Err(HarvestError::Timeout("selector wait", timeout))
        }
    }

    async fn card_snapshots(&self) -> Result<Vec<CardSnapshot>, HarvestError> {
        let (url, doc) = self.current_doc()?;
        let index = *self.state.lock().view_index.get(&url).unwrap_or(&0);
        Ok(doc
            .views
            .get(index.min(doc.views.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_default())
    }

    async fn recommendation_cutoff_y(&self) -> Result<f64, HarvestError> {
        Ok(self.current_doc()?.1.cutoff_y)
    }

    async fn switch_sort_tab(&self, _mode: SortMode) -> Result<bool, HarvestError> {
        let (url, doc) = self.current_doc()?;
        let mut state = self.state.lock();
        state.sort_attempts += 1;
        if !doc.sort_tab_present {
            return Ok(false);
        }
        let switched = state.sort_switched.entry(url).or_insert(false);
        if *switched {
            Ok(false)
        } else {
            *switched = true;
            Ok(true)
        }
    }

    async fn click_expander(&self) -> Result<bool, HarvestError> {
        let (url, doc) = self.current_doc()?;
        let mut state = self.state.lock();
        let cursor = state.expander_cursor.entry(url).or_insert(0);
        let clicked = doc.expander_clicks.get(*cursor).copied().unwrap_or(false);
        *cursor += 1;
        Ok(clicked)
    }

    async fn scroll_last_card_into_view(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn scroll_primary_column_to_bottom(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn scroll_window_by(&self, _pixels: f64) -> Result<(), HarvestError> {
        let (url, doc) = self.current_doc()?;
        self.advance_view(&url, doc.views.len());
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), HarvestError> {
        let (url, doc) = self.current_doc()?;
        self.advance_view(&url, doc.views.len());
        Ok(())
    }

    async fn body_text(&self) -> Result<String, HarvestError> {
        Ok(self.current_doc()?.1.body_text)
    }

    async fn login_probe(&self) -> Result<LoginProbe, HarvestError> {
        Ok(self.current_doc()?.1.login_probe)
    }

    async fn close(&self) -> Result<(), HarvestError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Page wrapper so one `Arc<FakePage>` can be handed out as a boxed trait
/// object while the test keeps its own handle for assertions.
pub struct SharedFakePage(pub Arc<FakePage>);

#[async_trait]
impl HarvestPage for SharedFakePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), HarvestError> {
        self.0.goto(url, timeout).await
    }
    async fn wait_for_selector(&self, s: &str, t: Duration) -> Result<(), HarvestError> {
        self.0.wait_for_selector(s, t).await
    }
    async fn card_snapshots(&self) -> Result<Vec<CardSnapshot>, HarvestError> {
        self.0.card_snapshots().await
    }
    async fn recommendation_cutoff_y(&self) -> Result<f64, HarvestError> {
        self.0.recommendation_cutoff_y().await
    }
    async fn switch_sort_tab(&self, mode: SortMode) -> Result<bool, HarvestError> {
        self.0.switch_sort_tab(mode).await
    }
    async fn click_expander(&self) -> Result<bool, HarvestError> {
        self.0.click_expander().await
    }
    async fn scroll_last_card_into_view(&self) -> Result<(), HarvestError> {
        self.0.scroll_last_card_into_view().await
    }
    async fn scroll_primary_column_to_bottom(&self) -> Result<(), HarvestError> {
        self.0.scroll_primary_column_to_bottom().await
    }
    async fn scroll_window_by(&self, pixels: f64) -> Result<(), HarvestError> {
        self.0.scroll_window_by(pixels).await
    }
    async fn scroll_to_bottom(&self) -> Result<(), HarvestError> {
        self.0.scroll_to_bottom().await
    }
    async fn body_text(&self) -> Result<String, HarvestError> {
        self.0.body_text().await
    }
    async fn login_probe(&self) -> Result<LoginProbe, HarvestError> {
        self.0.login_probe().await
    }
    async fn close(&self) -> Result<(), HarvestError> {
        self.0.close().await
    }
}

/// Provider returning either the scripted page or a scripted failure.
pub struct FakeProvider {
    page: Option<Arc<FakePage>>,
    error: Mutex<Option<HarvestError>>,
}

impl FakeProvider {
    pub fn with_page(page: Arc<FakePage>) -> Arc<Self> {
        Arc::new(Self {
            page: Some(page),
            error: Mutex::new(None),
        })
    }

    pub fn failing(error: HarvestError) -> Arc<Self> {
        Arc::new(Self {
            page: None,
            error: Mutex::new(Some(error)),
        })
    }
}

#[async_trait]
impl PageProvider for FakeProvider {
    async fn acquire_page(
        &self,
        _credential: Option<&CredentialBundle>,
    ) -> Result<Box<dyn HarvestPage>, HarvestError> {
        if let Some(error) = self.error.lock().take() {
            return Err(error);
        }
        match &self.page {
            Some(page) => Ok(Box::new(SharedFakePage(Arc::clone(page)))),
            None => Err(HarvestError::BrowserLaunch("no scripted page".into())),
        }
    }
}

/// A reply card at the given coordinates.
pub fn reply_card(id: &str, author: &str, top_y: f64) -> CardSnapshot {
    CardSnapshot {
        status_ids: vec![id.to_string()],
        time_anchor_id: Some(id.to_string()),
        datetime: Some("2024-06-01T10:00:00.000Z".to_string()),
        text: format!("reply {id}"),
        author_line: format!("{author}@{author}"),
        like_count: Some("3".to_string()),
        top_y,
        ..CardSnapshot::default()
    }
}

/// A root-post card as seen on a profile timeline or conversation head.
pub fn root_card(id: &str, author: &str, top_y: f64) -> CardSnapshot {
    CardSnapshot {
        status_ids: vec![id.to_string()],
        time_anchor_id: Some(id.to_string()),
        datetime: Some("2024-06-01T09:00:00.000Z".to_string()),
        text: format!("root {id}"),
        author_line: format!("{author}@{author}"),
        reply_count: Some("5".to_string()),
        like_count: Some("10".to_string()),
        repost_count: Some("2".to_string()),
        top_y,
        ..CardSnapshot::default()
    }
}

/// Tight budgets so tests finish in a handful of rounds.
pub fn test_budgets() -> EnumeratorBudgets {
    EnumeratorBudgets {
        scroll_budget: 6,
        max_scrolls_no_new: 2,
        reply_scroll_delay_ms: 10,
        bottom_rounds: 3,
        bottom_no_new: 1,
    }
}

/// Install a test subscriber once so `RUST_LOG`-driven debugging works.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Jitter-free pacer with near-zero delays.
pub fn test_pacer() -> Pacer {
    Pacer::new(PacingConfig {
        page_load_delay_ms: 1,
        scroll_delay_ms: 1,
        between_posts_delay_ms: 1,
        random_jitter: false,
        jitter_min_ms: 0,
        jitter_max_ms: 0,
    })
}
