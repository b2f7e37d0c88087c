// Detector configuration

use crate::aggregate::{CONTEXT_WINDOW, TREND_WINDOW};
use crate::error::{DetectorError, Result};
use crate::history::HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Tunables for sampling cadence, history size and aggregate windows
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Period between ticks
    pub tick_interval_ms: u64,
    /// Maximum retained samples
    pub history_capacity: usize,
    /// Per-tick classifier deadline; `None` waits indefinitely
    pub tick_timeout_ms: Option<u64>,
    /// Samples plotted on the timeline
    pub trend_window: usize,
    /// Samples handed to the chat consumer
    pub context_window: usize,
    /// Entries shown in the summary legend
    pub summary_top: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            history_capacity: HISTORY_CAPACITY,
            tick_timeout_ms: None,
            trend_window: TREND_WINDOW,
            context_window: CONTEXT_WINDOW,
            summary_top: 5,
        }
    }
}

impl DetectorConfig {
    /// Parses and validates a JSON document; absent fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&raw)?;
        info!("Loaded detector config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(DetectorError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(DetectorError::Config(
                "history_capacity must be positive".to_string(),
            ));
        }
        if self.tick_timeout_ms == Some(0) {
            return Err(DetectorError::Config(
                "tick_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn tick_timeout(&self) -> Option<Duration> {
        self.tick_timeout_ms.map(Duration::from_millis)
    }
}
