//! Lazily-launched shared browser instance
//!
//! One headless browser serves the whole process; launch and teardown are
//! guarded by an async mutex. A changed proxy closes the warm instance so
//! the next acquire relaunches with the new launch argument. Page creation
//! installs the credential cookies and randomises user agent and viewport.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
use rand::Rng;
use rand::prelude::IndexedRandom;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::setup::{self, USER_AGENTS};
use crate::error::HarvestError;
use crate::records::CredentialBundle;

/// Hard cap on one page acquisition, launch included.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

struct BrowserHandle {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: PathBuf,
    proxy: Option<String>,
}

impl BrowserHandle {
    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("failed to close browser: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            warn!(
                "failed to remove profile dir {}: {e}",
                self.user_data_dir.display()
            );
        }
    }
}

/// Process-wide browser singleton.
#[derive(Default)]
pub struct SharedBrowser {
    inner: Mutex<Option<BrowserHandle>>,
}

impl SharedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh page with the given credential installed.
    ///
    /// Launches the browser on first use; relaunches when `proxy` differs
    /// from the one the warm instance was started with. The whole call is
    /// bounded by [`ACQUIRE_TIMEOUT`].
    pub async fn acquire_page(
        &self,
        proxy: Option<String>,
        credential: Option<&CredentialBundle>,
    ) -> Result<Page, HarvestError> {
        tokio::time::timeout(ACQUIRE_TIMEOUT, self.acquire_page_inner(proxy, credential))
            .await
            .map_err(|_| HarvestError::Timeout("context acquire", ACQUIRE_TIMEOUT))?
    }

    async fn acquire_page_inner(
        &self,
        proxy: Option<String>,
        credential: Option<&CredentialBundle>,
    ) -> Result<Page, HarvestError> {
        let mut guard = self.inner.lock().await;

        let proxy_changed = guard.as_ref().is_some_and(|handle| handle.proxy != proxy);
        if proxy_changed {
            info!("proxy changed; closing warm browser for relaunch");
            if let Some(handle) = guard.take() {
                handle.shutdown().await;
            }
        }

        if guard.is_none() {
            let (browser, handler, user_data_dir) =
                setup::launch_browser(proxy.as_deref()).await?;
            *guard = Some(BrowserHandle {
                browser,
                handler,
                user_data_dir,
                proxy: proxy.clone(),
            });
        }

        let handle = guard.as_ref().expect("browser launched above");
        let page = handle
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::Page(format!("failed to create page: {e}")))?;

        configure_page(&page, credential).await?;
        Ok(page)
    }

    /// Close the warm browser, if any. The next acquire relaunches.
    pub async fn close(&self) {
        if let Some(handle) = self.inner.lock().await.take() {
            handle.shutdown().await;
        }
    }

    pub async fn is_warm(&self) -> bool {
        self.inner.lock().await.is_some()
    }
}

/// Randomise user agent and viewport, then install the bundle cookies.
async fn configure_page(
    page: &Page,
    credential: Option<&CredentialBundle>,
) -> Result<(), HarvestError> {
    let user_agent = *USER_AGENTS
        .choose(&mut rand::rng())
        .expect("user agent set is non-empty");
    let ua_override = SetUserAgentOverrideParams::builder()
        .user_agent(user_agent)
        .build()
        .map_err(HarvestError::Page)?;
    page.execute(ua_override).await.map_err(HarvestError::page)?;

    let (width, height) = {
        let mut rng = rand::rng();
        (
            rng.random_range(1280..=1920_i64),
            rng.random_range(800..=1080_i64),
        )
    };
    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(width)
        .height(height)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(HarvestError::Page)?;
    page.execute(metrics).await.map_err(HarvestError::page)?;

    if let Some(bundle) = credential {
        let mut params = Vec::with_capacity(bundle.cookies.len());
        for cookie in &bundle.cookies {
            let param = CookieParam::builder()
                .name(&cookie.name)
                .value(&cookie.value)
                .domain(cookie.domain_or_default())
                .path(cookie.path_or_default())
                .build()
                .map_err(HarvestError::Page)?;
            params.push(param);
        }
        if !params.is_empty() {
            page.set_cookies(params).await.map_err(HarvestError::page)?;
        }
    }

    Ok(())
}
