//! `[images]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [images]
//! budget = 1          # concurrent extractions
//! debounce_ms = 8     # quiet period after the last scroll event
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Progressive image extraction schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Maximum number of extractions in flight.
    pub budget: usize,

    /// Scroll debounce before the queue is re-partitioned.
    pub debounce_ms: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            budget: 1,
            debounce_ms: 8,
        }
    }
}

impl ImagesConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_images_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.images.budget, 1);
        assert_eq!(config.images.debounce_ms, 8);
    }

    #[test]
    fn test_images_budget() {
        let config = test_parse_config("[images]\nbudget = 4");
        assert_eq!(config.images.budget, 4);
    }
}
