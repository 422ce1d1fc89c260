//! Errors returned at the call site of a coordinator command.
//!
//! None of these ever travel through the event publisher. Subscribers only
//! see successful state observations.

use crate::models::PlaybackState;

/// Failure of a command issued to the coordinator or its engine adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    /// A command argument was rejected before reaching the engine.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine was released or never initialised.
    #[error("playback engine unavailable")]
    EngineUnavailable,

    /// The coordinator was stopped; it accepts no further commands.
    #[error("player already stopped")]
    AlreadyStopped,

    /// The requested or reported transition is impossible from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: PlaybackState,
        to: PlaybackState,
    },
}

pub type PlayerResult<T> = Result<T, PlayerError>;

/// Log errors from fire-and-forget operations without panicking.
pub(crate) fn log_err<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            log::warn!("sonata: {} failed: {}", context, e);
            false
        }
    }
}
