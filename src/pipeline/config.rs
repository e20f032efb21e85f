//! Pipeline configuration.

use crate::reading::Unit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`StreamPipeline`](crate::pipeline::StreamPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Quiet period before a value is delivered, in milliseconds
    pub debounce_ms: u64,
    /// Whether consecutive identical converted values are dropped
    pub suppress_duplicates: bool,
    /// Unit selected when the owner first creates its unit control
    pub initial_unit: Unit,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: crate::DEFAULT_DEBOUNCE_MS,
            suppress_duplicates: true,
            initial_unit: Unit::Celsius,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce window.
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Enable or disable duplicate suppression.
    pub fn with_duplicate_suppression(mut self, enabled: bool) -> Self {
        self.suppress_duplicates = enabled;
        self
    }

    /// Set the initial display unit.
    pub fn with_initial_unit(mut self, unit: Unit) -> Self {
        self.initial_unit = unit;
        self
    }

    /// The debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
