//! Public playback state, item transition reasons and seek units.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What the current audio session is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Buffering,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
}

impl PlaybackState {
    pub const ALL: [PlaybackState; 7] = [
        PlaybackState::Idle,
        PlaybackState::Buffering,
        PlaybackState::Loading,
        PlaybackState::Ready,
        PlaybackState::Playing,
        PlaybackState::Paused,
        PlaybackState::Ended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Ended => "ended",
        }
    }

    /// True while media is loaded and has not ended or been reset.
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackState::Idle | PlaybackState::Ended)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the current item changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Playback moved on to the next item by itself.
    Auto,
    /// The item queue was modified.
    QueueChanged,
    /// The same item started over because of repeat.
    Repeat,
    /// A seek landed in a different item.
    SeekToAnotherItem,
}

/// Unit of a seek offset. Mirrors the usual duration units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert `duration` in this unit to milliseconds.
    ///
    /// Truncates toward zero and saturates at the `i64` bounds.
    pub fn to_millis(self, duration: i64) -> i64 {
        match self {
            TimeUnit::Nanoseconds => duration / 1_000_000,
            TimeUnit::Microseconds => duration / 1_000,
            TimeUnit::Milliseconds => duration,
            TimeUnit::Seconds => duration.saturating_mul(1_000),
            TimeUnit::Minutes => duration.saturating_mul(60_000),
            TimeUnit::Hours => duration.saturating_mul(3_600_000),
            TimeUnit::Days => duration.saturating_mul(86_400_000),
        }
    }

    /// Numeric code used over FFI (0 = nanoseconds … 6 = days).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TimeUnit::Nanoseconds),
            1 => Some(TimeUnit::Microseconds),
            2 => Some(TimeUnit::Milliseconds),
            3 => Some(TimeUnit::Seconds),
            4 => Some(TimeUnit::Minutes),
            5 => Some(TimeUnit::Hours),
            6 => Some(TimeUnit::Days),
            _ => None,
        }
    }
}
