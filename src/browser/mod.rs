//! Browser lifecycle: executable discovery, launch, and the shared instance.

pub mod setup;
pub mod shared;

pub use setup::{find_local_browser, resolve_proxy};
pub use shared::SharedBrowser;
