use crate::error::{HlaviError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// How the drag controller picks the "over" target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionStrategy {
    /// Innermost droppable containing the pointer
    PointerWithin,
    /// Droppable whose center is nearest the pointer
    ClosestCenter,
}

/// Tuning for the board synchronization engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Distance a mouse press must travel before it becomes a drag
    pub pointer_activation_distance: f64,
    /// How long a touch must be held before it becomes a drag
    pub touch_activation_delay_ms: u64,
    /// Movement allowed while waiting out the touch delay
    pub touch_tolerance: f64,
    pub collision: CollisionStrategy,
    /// Capacity of the signal and event broadcast channels
    pub signal_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pointer_activation_distance: 8.0,
            touch_activation_delay_ms: 250,
            touch_tolerance: 5.0,
            collision: CollisionStrategy::PointerWithin,
            signal_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Loads configuration from a JSON file. Missing fields take defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HlaviError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path).await?;
        let config: SyncConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.pointer_activation_distance.is_finite() || self.pointer_activation_distance < 0.0 {
            return Err(HlaviError::ConfigError(
                "pointer_activation_distance must be a non-negative number".to_string(),
            ));
        }
        if !self.touch_tolerance.is_finite() || self.touch_tolerance < 0.0 {
            return Err(HlaviError::ConfigError(
                "touch_tolerance must be a non-negative number".to_string(),
            ));
        }
        if self.signal_capacity == 0 {
            return Err(HlaviError::ConfigError(
                "signal_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn touch_activation_delay(&self) -> Duration {
        Duration::from_millis(self.touch_activation_delay_ms)
    }
}
