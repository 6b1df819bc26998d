//! Human-like pacing between browser operations.
//!
//! Every navigation and simulated interaction is followed by a sleep drawn
//! uniformly from a per-category bound. The bounds are plain data, so the
//! policy can be shared freely between tasks.

use std::env;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Operation classes that get their own delay bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayCategory {
    /// Generic user action (between keys, after opening a tab).
    Interaction,
    /// Pause between typed characters.
    Typing,
    Scroll,
    Click,
    /// Wait after a navigation.
    PageLoad,
}

/// A `[min, max]` range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayBounds {
    pub min: f64,
    pub max: f64,
}

impl DelayBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp negatives to zero and swap an inverted pair.
    fn normalized(self) -> Self {
        let min = self.min.max(0.0);
        let max = self.max.max(0.0);
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }
}

/// One bound per category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayTable {
    pub interaction: DelayBounds,
    pub typing: DelayBounds,
    pub scroll: DelayBounds,
    pub click: DelayBounds,
    pub page_load: DelayBounds,
}

impl DelayTable {
    pub const NORMAL: DelayTable = DelayTable {
        interaction: DelayBounds::new(2.0, 5.0),
        typing: DelayBounds::new(0.05, 0.2),
        scroll: DelayBounds::new(1.5, 4.0),
        click: DelayBounds::new(0.8, 2.0),
        page_load: DelayBounds::new(3.0, 7.0),
    };

    pub const FAST: DelayTable = DelayTable {
        interaction: DelayBounds::new(0.3, 0.8),
        typing: DelayBounds::new(0.02, 0.05),
        scroll: DelayBounds::new(0.5, 1.0),
        click: DelayBounds::new(0.2, 0.5),
        page_load: DelayBounds::new(1.0, 2.0),
    };

    pub const ZERO: DelayTable = DelayTable {
        interaction: DelayBounds::new(0.0, 0.0),
        typing: DelayBounds::new(0.0, 0.0),
        scroll: DelayBounds::new(0.0, 0.0),
        click: DelayBounds::new(0.0, 0.0),
        page_load: DelayBounds::new(0.0, 0.0),
    };

    pub fn get(&self, category: DelayCategory) -> DelayBounds {
        match category {
            DelayCategory::Interaction => self.interaction,
            DelayCategory::Typing => self.typing,
            DelayCategory::Scroll => self.scroll,
            DelayCategory::Click => self.click,
            DelayCategory::PageLoad => self.page_load,
        }
    }

    fn get_mut(&mut self, category: DelayCategory) -> &mut DelayBounds {
        match category {
            DelayCategory::Interaction => &mut self.interaction,
            DelayCategory::Typing => &mut self.typing,
            DelayCategory::Scroll => &mut self.scroll,
            DelayCategory::Click => &mut self.click,
            DelayCategory::PageLoad => &mut self.page_load,
        }
    }
}

/// Delay configuration as loaded from the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default = "default_normal")]
    pub normal: DelayTable,
    #[serde(default = "default_fast")]
    pub fast: DelayTable,
}

fn default_normal() -> DelayTable {
    DelayTable::NORMAL
}

fn default_fast() -> DelayTable {
    DelayTable::FAST
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            normal: DelayTable::NORMAL,
            fast: DelayTable::FAST,
        }
    }
}

/// Environment variable pairs for the normal-mode table.
const ENV_BOUNDS: &[(DelayCategory, &str, &str)] = &[
    (DelayCategory::Interaction, "MIN_ACTION_DELAY", "MAX_ACTION_DELAY"),
    (DelayCategory::Typing, "MIN_TYPING_DELAY", "MAX_TYPING_DELAY"),
    (DelayCategory::Scroll, "MIN_SCROLL_DELAY", "MAX_SCROLL_DELAY"),
    (DelayCategory::Click, "MIN_CLICK_DELAY", "MAX_CLICK_DELAY"),
    (DelayCategory::PageLoad, "MIN_PAGE_LOAD_DELAY", "MAX_PAGE_LOAD_DELAY"),
];

impl DelayConfig {
    /// Apply `MIN_*_DELAY` / `MAX_*_DELAY` overrides to the normal table.
    pub fn with_env_overrides(mut self) -> Self {
        for (category, min_var, max_var) in ENV_BOUNDS {
            let bounds = self.normal.get_mut(*category);
            if let Some(min) = env_seconds(min_var) {
                bounds.min = min;
            }
            if let Some(max) = env_seconds(max_var) {
                bounds.max = max;
            }
        }
        self
    }
}

fn env_seconds(var: &str) -> Option<f64> {
    env::var(var).ok().and_then(|v| v.trim().parse::<f64>().ok())
}

/// Maps `(category, fast_mode)` to a sleep range.
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    normal: DelayTable,
    fast: DelayTable,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(&DelayConfig::default())
    }
}

impl DelayPolicy {
    pub fn new(config: &DelayConfig) -> Self {
        Self {
            normal: config.normal,
            fast: config.fast,
        }
    }

    /// A policy that never sleeps.
    pub fn instant() -> Self {
        Self {
            normal: DelayTable::ZERO,
            fast: DelayTable::ZERO,
        }
    }

    /// Sleep range for a category.
    pub fn bounds(&self, category: DelayCategory, fast_mode: bool) -> (Duration, Duration) {
        let table = if fast_mode { &self.fast } else { &self.normal };
        let b = table.get(category).normalized();
        (Duration::from_secs_f64(b.min), Duration::from_secs_f64(b.max))
    }

    /// Draw a uniform duration within the category's range.
    pub fn sample(&self, category: DelayCategory, fast_mode: bool) -> Duration {
        let (min, max) = self.bounds(category, fast_mode);
        if max <= min {
            return min;
        }
        let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Sleep for a sampled duration. Not cancellable once started.
    pub async fn pause(&self, category: DelayCategory, fast_mode: bool) {
        let delay = self.sample(category, fast_mode);
        if delay.is_zero() {
            return;
        }
        trace!("Pausing {:?} for {:?}", category, delay);
        tokio::time::sleep(delay).await;
    }
}
