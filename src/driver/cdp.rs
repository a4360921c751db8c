//! chromiumoxide implementation of the page capability trait
//!
//! Each trait method is one JS evaluation round-trip (or a navigation),
//! decoded straight into the snapshot types via serde.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::js;
use super::{CardSnapshot, HarvestPage, LoginProbe, PageProvider};
use crate::browser::SharedBrowser;
use crate::browser::setup::resolve_proxy;
use crate::error::HarvestError;
use crate::records::{CredentialBundle, SortMode};
use crate::store::{ConfigStore, KEY_PROXY_URL};

/// Sort-tab labels as rendered by the platform.
const RECENT_TAB_LABELS: [&str; 2] = ["Latest", "最新"];
const TOP_TAB_LABELS: [&str; 2] = ["Top", "热门"];

/// A live CDP-driven page.
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, HarvestError> {
        self.page
            .evaluate(script)
            .await
            .map_err(HarvestError::page)?
            .into_value()
            .map_err(HarvestError::page)
    }
}

#[async_trait]
impl HarvestPage for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), HarvestError> {
        debug!(url, "navigating");
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HarvestError::Navigation(e.to_string())),
            Err(_) => Err(HarvestError::Navigation(format!(
                "navigation to {url} timeout after {timeout:?}"
            ))),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), HarvestError> {
        let probe = format!(
            "!!document.querySelector({})",
            serde_json::to_string(selector).map_err(HarvestError::page)?
        );
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.eval::<bool>(&probe).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(HarvestError::Timeout("selector wait", timeout));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn card_snapshots(&self) -> Result<Vec<CardSnapshot>, HarvestError> {
        self.eval(js::CARDS_SCRIPT).await
    }

    async fn recommendation_cutoff_y(&self) -> Result<f64, HarvestError> {
        let y: Option<f64> = self.eval(&js::cutoff_script()).await?;
        Ok(y.unwrap_or(f64::INFINITY))
    }

    async fn switch_sort_tab(&self, mode: SortMode) -> Result<bool, HarvestError> {
        let labels = match mode {
            SortMode::Recent => &RECENT_TAB_LABELS,
            SortMode::Top => &TOP_TAB_LABELS,
        };
        let outcome: String = self.eval(&js::sort_tab_script(labels)).await?;
        Ok(outcome == "clicked")
    }

    async fn click_expander(&self) -> Result<bool, HarvestError> {
        self.eval(&js::expand_script()).await
    }

    async fn scroll_last_card_into_view(&self) -> Result<(), HarvestError> {
        self.eval::<serde_json::Value>(js::SCROLL_LAST_CARD_SCRIPT)
            .await
            .map(|_| ())
    }

    async fn scroll_primary_column_to_bottom(&self) -> Result<(), HarvestError> {
        self.eval::<serde_json::Value>(js::SCROLL_PRIMARY_COLUMN_SCRIPT)
            .await
            .map(|_| ())
    }

    async fn scroll_window_by(&self, pixels: f64) -> Result<(), HarvestError> {
        self.eval::<serde_json::Value>(&js::scroll_window_by_script(pixels))
            .await
            .map(|_| ())
    }

    async fn scroll_to_bottom(&self) -> Result<(), HarvestError> {
        self.eval::<serde_json::Value>(js::SCROLL_TO_BOTTOM_SCRIPT)
            .await
            .map(|_| ())
    }

    async fn body_text(&self) -> Result<String, HarvestError> {
        self.eval(js::BODY_TEXT_SCRIPT).await
    }

    async fn login_probe(&self) -> Result<LoginProbe, HarvestError> {
        self.eval(js::LOGIN_PROBE_SCRIPT).await
    }

    async fn close(&self) -> Result<(), HarvestError> {
        // Page::close consumes; the clone shares the same CDP target.
        self.page.clone().close().await.map_err(HarvestError::page)
    }
}

/// Production page provider over the shared browser.
pub struct CdpProvider {
    browser: Arc<SharedBrowser>,
    config: Arc<dyn ConfigStore>,
}

impl CdpProvider {
    pub fn new(browser: Arc<SharedBrowser>, config: Arc<dyn ConfigStore>) -> Self {
        Self { browser, config }
    }
}

#[async_trait]
impl PageProvider for CdpProvider {
    async fn acquire_page(
        &self,
        credential: Option<&CredentialBundle>,
    ) -> Result<Box<dyn HarvestPage>, HarvestError> {
        let proxy = resolve_proxy(self.config.get(KEY_PROXY_URL).await);
        let page = self.browser.acquire_page(proxy, credential).await?;
        Ok(Box::new(CdpPage::new(page)))
    }
}
