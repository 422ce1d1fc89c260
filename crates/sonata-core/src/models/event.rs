//! Events fanned out to subscribers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::{AudioItem, PlaybackState, TransitionReason};

/// An observed, successful change. Errors never travel as events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum PlayerEvent {
    StateChanged(PlaybackState),
    ItemTransitioned {
        reason: TransitionReason,
        item: Option<Arc<AudioItem>>,
    },
}

impl PlayerEvent {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The new state, if this is a state event.
    pub fn state(&self) -> Option<PlaybackState> {
        match self {
            PlayerEvent::StateChanged(s) => Some(*s),
            PlayerEvent::ItemTransitioned { .. } => None,
        }
    }
}
