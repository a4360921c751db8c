//! Harvest pacing: preset delay tables with randomised jitter
//!
//! Every suspension between page actions goes through [`Pacer::delay`].
//! Presets trade throughput against detection risk; the active config is
//! process-global (the UI flips presets between runs) with an instance API
//! for test isolation.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Named pacing presets, slowest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PacingPreset {
    UltraSlow,
    Slow,
    #[default]
    Normal,
    Fast,
}

impl PacingPreset {
    /// Parse a preset name as stored in config; unknown names fall back to
    /// `Normal`.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "ultraSlow" | "ultra_slow" => Self::UltraSlow,
            "slow" => Self::Slow,
            "fast" => Self::Fast,
            _ => Self::Normal,
        }
    }
}

/// Delay table applied between harvest actions, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingConfig {
    pub page_load_delay_ms: u64,
    pub scroll_delay_ms: u64,
    pub between_posts_delay_ms: u64,
    pub random_jitter: bool,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl PacingConfig {
    pub fn preset(preset: PacingPreset) -> Self {
        match preset {
            PacingPreset::UltraSlow => Self {
                page_load_delay_ms: 5000,
                scroll_delay_ms: 4000,
                between_posts_delay_ms: 10000,
                random_jitter: true,
                jitter_min_ms: 2000,
                jitter_max_ms: 5000,
            },
            PacingPreset::Slow => Self {
                page_load_delay_ms: 3000,
                scroll_delay_ms: 2500,
                between_posts_delay_ms: 5000,
                random_jitter: true,
                jitter_min_ms: 1000,
                jitter_max_ms: 3000,
            },
            PacingPreset::Normal => Self {
                page_load_delay_ms: 2000,
                scroll_delay_ms: 1500,
                between_posts_delay_ms: 3000,
                random_jitter: true,
                jitter_min_ms: 500,
                jitter_max_ms: 1500,
            },
            PacingPreset::Fast => Self {
                page_load_delay_ms: 1000,
                scroll_delay_ms: 800,
                between_posts_delay_ms: 1500,
                random_jitter: true,
                jitter_min_ms: 200,
                jitter_max_ms: 800,
            },
        }
    }

    /// Same table with jitter disabled; used by deterministic tests.
    pub fn preset_without_jitter(preset: PacingPreset) -> Self {
        Self {
            random_jitter: false,
            ..Self::preset(preset)
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self::preset(PacingPreset::Normal)
    }
}

/// Holds the current pacing config and performs jittered sleeps.
#[derive(Debug, Default)]
pub struct Pacer {
    config: Mutex<PacingConfig>,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    pub fn set(&self, config: PacingConfig) {
        *self.config.lock() = config;
    }

    pub fn set_preset(&self, preset: PacingPreset) {
        self.set(PacingConfig::preset(preset));
    }

    pub fn config(&self) -> PacingConfig {
        *self.config.lock()
    }

    /// Compute the sleep for a base delay: `base + uniform(jitter)` when
    /// jitter is enabled, `base` otherwise.
    pub fn jittered(&self, base_ms: u64) -> Duration {
        let config = self.config();
        let extra = if config.random_jitter && config.jitter_max_ms > config.jitter_min_ms {
            rand::rng().random_range(config.jitter_min_ms..=config.jitter_max_ms)
        } else if config.random_jitter {
            config.jitter_min_ms
        } else {
            0
        };
        Duration::from_millis(base_ms + extra)
    }

    /// Suspend the caller for the jittered delay.
    pub async fn delay(&self, base_ms: u64) {
        tokio::time::sleep(self.jittered(base_ms)).await;
    }

    pub async fn page_load_delay(&self) {
        let base = self.config().page_load_delay_ms;
        self.delay(base).await;
    }

    pub async fn scroll_delay(&self) {
        let base = self.config().scroll_delay_ms;
        self.delay(base).await;
    }

    pub async fn between_posts_delay(&self) {
        let base = self.config().between_posts_delay_ms;
        self.delay(base).await;
    }
}

/// Process-global pacer used by production harvests.
static GLOBAL_PACER: Lazy<Arc<Pacer>> = Lazy::new(|| Arc::new(Pacer::default()));

pub fn global_pacer() -> Arc<Pacer> {
    Arc::clone(&GLOBAL_PACER)
}
