//! Player configuration.
//!
//! Every field has a default, so a partial JSON object is valid input.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::NotificationChannel;

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Autoplay flag used when a load does not say otherwise.
    pub play_when_ready: bool,
    /// Reject Playing/Paused/Ended until the engine reported Ready.
    pub strict_transitions: bool,
    /// Name of the coordinator's actor thread.
    pub actor_thread_name: String,
    pub notification: NotificationChannel,
    pub simulation: SimulationConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            play_when_ready: true,
            strict_transitions: true,
            actor_thread_name: "sonata-coordinator".to_string(),
            notification: NotificationChannel::playback(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Parse a JSON config. Invalid input falls back to defaults.
    pub fn from_json(json: &str) -> Self {
        if json.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(json) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("sonata: invalid player config, using defaults: {}", e);
                Self::default()
            }
        }
    }
}

/// Timing of the [`SimulatedEngine`](crate::engine::SimulatedEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time spent in Buffering after prepare or seek.
    pub buffering_delay_ms: u64,
    /// Position clock resolution.
    pub tick_interval_ms: u64,
    /// Length used for items without a duration. `None` plays forever.
    pub fallback_duration_ms: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            buffering_delay_ms: 150,
            tick_interval_ms: 20,
            fallback_duration_ms: None,
        }
    }
}

impl SimulationConfig {
    pub fn buffering_delay(&self) -> Duration {
        Duration::from_millis(self.buffering_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
