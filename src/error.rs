//! Error types for harvest operations
//!
//! One enum covers the whole engine; the orchestrator relies on the
//! error-shape predicates below to decide between retry, API fallback,
//! and terminal reporting.

use std::time::Duration;

/// Errors surfaced by the harvest engine.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// No usable credential, or the platform answered with a login wall.
    /// User-actionable: reconfigure cookies.
    #[error("login required: {0}; reconfigure X_COOKIES with a fresh auth_token")]
    LoginWall(String),

    /// The browser could not be launched by any candidate in the chain.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Navigation kept failing after the retry ladder across all candidate URLs.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The root post is deleted, restricted, or otherwise gone.
    #[error("root post unavailable: {0}")]
    PostUnavailable(String),

    /// The hard wall-clock cap for one entry-point run elapsed.
    #[error("harvest exceeded the wall-clock cap of {0:?}; partial results were kept")]
    WallClock(Duration),

    /// A bounded operation (context acquire, selector wait) timed out.
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    /// The scraping API reported a non-SUCCEEDED terminal run status.
    #[error("scraping API run ended with status {0}")]
    ApiRunFailed(String),

    /// The scraping API monthly quota is exhausted; never retried.
    #[error("scraping API monthly usage limit exceeded; check the Apify plan")]
    ApiQuotaExhausted,

    /// Any other scraping-API failure (transport, missing dataset, bad token).
    #[error("scraping API error: {0}")]
    Api(String),

    /// CDP evaluation or page interaction failure.
    #[error("page operation failed: {0}")]
    Page(String),

    /// The persistence adapter rejected a record.
    #[error("persistence error: {0}")]
    Store(String),

    /// Required configuration is absent or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HarvestError {
    /// Shorthand used by driver implementations.
    pub fn page(err: impl std::fmt::Display) -> Self {
        Self::Page(err.to_string())
    }
}

/// Whether a navigation failure is worth retrying.
///
/// Only connection-level hiccups qualify; everything else (404s, blocked
/// pages, CDP protocol errors) fails fast.
pub fn is_retryable_navigation(message: &str) -> bool {
    const RETRYABLE: [&str; 4] = [
        "ERR_CONNECTION_CLOSED",
        "ERR_CONNECTION_RESET",
        "NETWORK",
        "timeout",
    ];
    RETRYABLE
        .iter()
        .any(|needle| message.to_uppercase().contains(&needle.to_uppercase()))
}

/// Whether an error means the browser itself never came up.
///
/// In auto mode this is the signal to swap to the scraping API instead of
/// failing the run.
pub fn is_browser_launch_failure(err: &HarvestError) -> bool {
    match err {
        HarvestError::BrowserLaunch(_) => true,
        HarvestError::Timeout(what, _) => *what == "browser launch" || *what == "context acquire",
        HarvestError::Page(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("failed to launch")
                || msg.contains("executable not found")
                || msg.contains("websocket")
        }
        _ => false,
    }
}
