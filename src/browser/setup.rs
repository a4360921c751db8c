//! Browser discovery and launch
//!
//! The launcher walks a candidate chain: the managed slim Chromium from the
//! fetcher cache (release/Linux), then a locally installed Chrome/Chromium
//! (platform path probe, overridable via `CHROME_EXECUTABLE_PATH`), then a
//! channel browser found on `PATH` (debug builds). The first candidate that
//! both resolves and launches wins.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::error::HarvestError;

/// Fixed desktop user agents; each page context draws one at random.
pub const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.205 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.110 Safari/537.36",
];

/// Resolve the proxy to launch with: explicit config value first, then the
/// conventional environment variables. Unparseable values are skipped.
pub fn resolve_proxy(config_value: Option<String>) -> Option<String> {
    let mut candidates = Vec::new();
    if let Some(value) = config_value {
        candidates.push(value);
    }
    for var in ["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy", "http_proxy"] {
        if let Ok(value) = std::env::var(var) {
            candidates.push(value);
        }
    }

    for candidate in candidates {
        let candidate = candidate.trim().to_string();
        if candidate.is_empty() {
            continue;
        }
        match url::Url::parse(&candidate) {
            Ok(_) => return Some(candidate),
            Err(e) => warn!("ignoring unparseable proxy value {candidate:?}: {e}"),
        }
    }
    None
}

/// Find a locally installed Chrome/Chromium with platform-specific search
/// paths. `CHROME_EXECUTABLE_PATH` overrides all other methods.
pub fn find_local_browser() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_EXECUTABLE_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("using browser from CHROME_EXECUTABLE_PATH: {}", path.display());
            return Some(path);
        }
        warn!(
            "CHROME_EXECUTABLE_PATH points to a non-existent file: {}",
            path.display()
        );
    }

    let paths: Vec<&str> = if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("found browser at: {}", path.display());
            return Some(path);
        }
    }
    None
}

/// Probe `PATH` for a named channel browser. Debug-build fallback only.
fn find_channel_browser() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return None;
    }
    for cmd in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        let output = Command::new("which").arg(cmd).output();
        if let Ok(output) = output
            && output.status.success()
        {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                let path = PathBuf::from(path_str);
                info!("found channel browser via 'which': {}", path.display());
                return Some(path);
            }
        }
    }
    None
}

/// Download (or reuse) the managed slim Chromium from the fetcher cache.
async fn bundled_slim_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("threadharvest")
        .join("chromium");
    std::fs::create_dir_all(&cache_dir).context("failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("failed to fetch slim browser")?;
    info!("slim browser available at: {}", revision.folder_path.display());
    Ok(revision.executable_path)
}

/// Candidate executables in launch order.
async fn launch_candidates() -> Vec<(String, PathBuf)> {
    let mut candidates = Vec::new();

    // Managed slim browser first in production Linux deployments, where a
    // full desktop Chrome is usually absent.
    if cfg!(all(target_os = "linux", not(debug_assertions))) {
        match bundled_slim_browser().await {
            Ok(path) => candidates.push(("bundled".to_string(), path)),
            Err(e) => warn!("bundled slim browser unavailable: {e:#}"),
        }
    }

    if let Some(path) = find_local_browser() {
        candidates.push(("local".to_string(), path));
    }

    if cfg!(debug_assertions)
        && let Some(path) = find_channel_browser()
        && !candidates.iter().any(|(_, p)| p == &path)
    {
        candidates.push(("channel".to_string(), path));
    }

    candidates
}

fn browser_config(
    executable: PathBuf,
    user_data_dir: PathBuf,
    proxy: Option<&str>,
) -> Result<chromiumoxide::browser::BrowserConfig, String> {
    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir)
        .chrome_executable(executable)
        .headless_mode(HeadlessMode::default())
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-desktop-notifications")
        .arg("--disable-software-rasterizer")
        .arg("--disable-setuid-sandbox")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox")
        .arg("--ignore-certificate-errors")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-ipc-flooding-protection")
        .arg("--disable-prompt-on-repost")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--hide-scrollbars")
        .arg("--mute-audio");

    if let Some(proxy) = proxy {
        builder = builder.arg(format!("--proxy-server={proxy}"));
    }

    builder.build()
}

/// Launch a headless browser through the candidate chain.
///
/// Returns the browser, the handler task driving its CDP connection, and
/// the profile directory to remove after shutdown.
pub async fn launch_browser(
    proxy: Option<&str>,
) -> Result<(Browser, JoinHandle<()>, PathBuf), HarvestError> {
    let candidates = launch_candidates().await;
    if candidates.is_empty() {
        return Err(HarvestError::BrowserLaunch(
            "no Chrome/Chromium executable found; set CHROME_EXECUTABLE_PATH".into(),
        ));
    }

    let user_data_dir =
        std::env::temp_dir().join(format!("threadharvest_chrome_{}", std::process::id()));
    std::fs::create_dir_all(&user_data_dir)
        .map_err(|e| HarvestError::BrowserLaunch(format!("failed to create profile dir: {e}")))?;

    let mut failures = Vec::new();
    for (kind, executable) in candidates {
        let config = match browser_config(executable.clone(), user_data_dir.clone(), proxy) {
            Ok(config) => config,
            Err(e) => {
                failures.push(format!("{kind}: bad config: {e}"));
                continue;
            }
        };

        info!(candidate = %kind, executable = %executable.display(), "launching browser");
        match Browser::launch(config).await {
            Ok((browser, mut handler)) => {
                let handler_task = task::spawn(async move {
                    while let Some(event) = handler.next().await {
                        if let Err(e) = event {
                            let message = e.to_string();
                            // Chrome emits CDP events chromiumoxide does not
                            // model; those deserialisation misses are noise.
                            let benign = message
                                .contains("data did not match any variant of untagged enum Message")
                                || message.contains("Failed to deserialize WS response");
                            if benign {
                                trace!("suppressed benign CDP error: {message}");
                            } else {
                                error!("browser handler error: {message}");
                            }
                        }
                    }
                    info!("browser handler task completed");
                });
                return Ok((browser, handler_task, user_data_dir));
            }
            Err(e) => {
                warn!(candidate = %kind, "launch failed: {e}");
                failures.push(format!("{kind}: {e}"));
            }
        }
    }

    Err(HarvestError::BrowserLaunch(failures.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_prefers_config_over_env() {
        assert_eq!(
            resolve_proxy(Some("socks5://host:1080".into())),
            Some("socks5://host:1080".into())
        );
        assert_eq!(
            resolve_proxy(Some("http://127.0.0.1:7897".into())),
            Some("http://127.0.0.1:7897".into())
        );
        assert_eq!(resolve_proxy(Some("   ".into())), resolve_proxy(None));
        // junk values never reach the launch arguments
        assert_eq!(resolve_proxy(Some("not a url".into())), resolve_proxy(None));
    }

    #[test]
    fn user_agent_set_is_fixed_and_desktop() {
        assert_eq!(USER_AGENTS.len(), 3);
        for ua in USER_AGENTS {
            assert!(ua.contains("Chrome/"));
            assert!(!ua.contains("Mobile"));
        }
    }
}
