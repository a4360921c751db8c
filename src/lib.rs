//! threadharvest: browser-driven reply-thread harvesting for X/Twitter
//!
//! The engine opens a monitored profile or a single root post in a headless
//! Chromium, enumerates every reply under the conversation with the
//! two-phase scroll + bottom-sweep loop, and streams records into a narrow
//! persistence interface while a keyed progress channel feeds a polling UI.
//! When the browser cannot launch (or `auto` mode hits any terminal error)
//! the orchestrator transparently switches to a third-party scraping-API
//! actor with the same persistence path.
//!
//! The embedding application supplies the [`store::ReplyStore`] and
//! [`store::ConfigStore`] implementations and calls the
//! [`orchestrator::Orchestrator`] entry points; everything else (pacing,
//! credential rotation, browser lifecycle, progress) is engine-internal.

pub mod apify;
pub mod browser;
pub mod credentials;
pub mod driver;
pub mod enumerator;
pub mod error;
pub mod extract;
pub mod harvester;
pub mod orchestrator;
pub mod pacing;
pub mod progress;
pub mod records;
pub mod store;

pub use apify::ApifyClient;
pub use browser::SharedBrowser;
pub use credentials::{CredentialRotator, global_rotator};
pub use driver::{CardSnapshot, HarvestPage, LoginProbe, PageProvider};
pub use enumerator::{EnumeratorBudgets, ReplySink, enumerate_replies};
pub use error::{HarvestError, is_browser_launch_failure, is_retryable_navigation};
pub use harvester::{Emitter, HarvestCallbacks, ReplyCallback, RootCallback};
pub use orchestrator::{Orchestrator, ScrapeMethod, ScrapeOutcome};
pub use pacing::{Pacer, PacingConfig, PacingPreset, global_pacer};
pub use progress::{ProgressChannel, global_progress};
pub use records::{
    CookieEntry, CredentialBundle, HarvestTarget, Reply, ReplyScrapeOptions, RootPost,
    ScrapeProgress, ScrapeStage, SortMode,
};
pub use store::{ConfigStore, MemoryConfig, MemoryStore, ReplyStore};
