//! Key manager configuration.

use std::time::Duration;

use crate::core::{MAX_CLOCK_DIFFERENCE, ROTATION_CHECK_INTERVAL};

/// Key manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyManagerConfig {
    /// Interval between rotation checks.
    pub rotation_check_interval: Duration,

    /// Maximum tolerated clock difference between peers. Added to a
    /// transport's maximum latency to get the rotation period.
    pub max_clock_difference: Duration,
}

impl KeyManagerConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> KeyManagerConfigBuilder {
        KeyManagerConfigBuilder::new()
    }
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            rotation_check_interval: ROTATION_CHECK_INTERVAL,
            max_clock_difference: MAX_CLOCK_DIFFERENCE,
        }
    }
}

/// Builder for [`KeyManagerConfig`].
#[derive(Debug)]
pub struct KeyManagerConfigBuilder {
    config: KeyManagerConfig,
}

impl KeyManagerConfigBuilder {
    /// Create a builder holding the default configuration.
    pub fn new() -> Self {
        Self {
            config: KeyManagerConfig::default(),
        }
    }

    /// Set the interval between rotation checks.
    pub fn rotation_check_interval(mut self, interval: Duration) -> Self {
        self.config.rotation_check_interval = interval;
        self
    }

    /// Set the maximum tolerated clock difference.
    pub fn max_clock_difference(mut self, difference: Duration) -> Self {
        self.config.max_clock_difference = difference;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> KeyManagerConfig {
        self.config
    }
}

impl Default for KeyManagerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
