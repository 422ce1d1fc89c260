//! Playback engine seam.
//!
//! The coordinator never decodes or renders anything. It drives an injected
//! [`PlaybackEngine`] and listens to the raw signals that engine reports
//! through a [`CallbackSink`]. Concrete engines implement the trait instead
//! of specialising a player type.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::models::{AudioItem, TransitionReason};

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "native")]
pub mod native;
pub mod simulated;

#[cfg(feature = "native")]
pub use native::{NativeConfig, NativeEngine};
pub use simulated::SimulatedEngine;

/// Raw playback state code reported by an engine.
///
/// Codes match the numeric constants common Android engines use, so hosted
/// engines can forward them unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    Buffering,
    Ready,
    Ended,
}

impl EngineState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(EngineState::Idle),
            2 => Some(EngineState::Buffering),
            3 => Some(EngineState::Ready),
            4 => Some(EngineState::Ended),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            EngineState::Idle => 1,
            EngineState::Buffering => 2,
            EngineState::Ready => 3,
            EngineState::Ended => 4,
        }
    }
}

/// Raw reason an engine gives for switching to another media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineTransitionReason {
    Repeat,
    Auto,
    Seek,
    PlaylistChanged,
}

impl EngineTransitionReason {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(EngineTransitionReason::Repeat),
            1 => Some(EngineTransitionReason::Auto),
            2 => Some(EngineTransitionReason::Seek),
            3 => Some(EngineTransitionReason::PlaylistChanged),
            _ => None,
        }
    }
}

impl From<EngineTransitionReason> for TransitionReason {
    fn from(reason: EngineTransitionReason) -> Self {
        match reason {
            EngineTransitionReason::Auto => TransitionReason::Auto,
            EngineTransitionReason::PlaylistChanged => TransitionReason::QueueChanged,
            EngineTransitionReason::Repeat => TransitionReason::Repeat,
            EngineTransitionReason::Seek => TransitionReason::SeekToAnotherItem,
        }
    }
}

/// One callback from the engine's listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    PlaybackStateChanged(EngineState),
    IsLoadingChanged(bool),
    IsPlayingChanged(bool),
    /// The engine's own autoplay flag changed, e.g. paused from a
    /// notification button.
    PlayWhenReadyChanged(bool),
    ItemTransition(EngineTransitionReason),
}

/// Message into the coordinator's actor thread.
#[derive(Debug)]
pub(crate) enum Inbound {
    Signal { generation: u64, signal: EngineSignal },
    Shutdown,
}

/// Where an engine reports signals for one load.
///
/// Every signal is tagged with the generation of the load that produced the
/// sink. Once a newer load exists, whatever an older sink reports is dropped
/// by the coordinator.
#[derive(Debug, Clone)]
pub struct CallbackSink {
    generation: u64,
    tx: Sender<Inbound>,
}

impl CallbackSink {
    pub(crate) fn new(generation: u64, tx: Sender<Inbound>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a signal. Never blocks; a no-op once the coordinator is gone.
    pub fn send(&self, signal: EngineSignal) {
        let msg = Inbound::Signal {
            generation: self.generation,
            signal,
        };
        if self.tx.send(msg).is_err() {
            log::trace!("sonata: coordinator gone, dropped {:?}", signal);
        }
    }

    pub fn state(&self, state: EngineState) {
        self.send(EngineSignal::PlaybackStateChanged(state));
    }

    pub fn loading(&self, is_loading: bool) {
        self.send(EngineSignal::IsLoadingChanged(is_loading));
    }

    pub fn playing(&self, is_playing: bool) {
        self.send(EngineSignal::IsPlayingChanged(is_playing));
    }

    pub fn play_when_ready(&self, play_when_ready: bool) {
        self.send(EngineSignal::PlayWhenReadyChanged(play_when_ready));
    }

    pub fn transition(&self, reason: EngineTransitionReason) {
        self.send(EngineSignal::ItemTransition(reason));
    }
}

/// Engine-side failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine released")]
    Released,
    #[error("engine backend error: {0}")]
    Backend(String),
}

/// Capability the coordinator drives.
///
/// All methods take `&self`; engines manage their own concurrency. Calls
/// must not block on network or decode work; outcomes are reported later
/// through the sink given to [`PlaybackEngine::load`].
pub trait PlaybackEngine: Send + Sync {
    /// Make `item` the engine's current media and report through `sink` from now on.
    fn load(&self, item: Arc<AudioItem>, sink: CallbackSink) -> Result<(), EngineError>;
    fn set_play_when_ready(&self, play_when_ready: bool);
    fn prepare(&self);
    fn play(&self);
    fn pause(&self);
    fn seek_to(&self, position_ms: u64);
    /// Free every resource. Terminal.
    fn release(&self) -> Result<(), EngineError>;
    fn is_playing(&self) -> bool;
    fn is_released(&self) -> bool;
}

/// Engine that accepts every call and never reports anything.
///
/// Use it for headless hosts that only need the command surface.
#[derive(Debug, Default)]
pub struct NoopEngine {
    released: std::sync::atomic::AtomicBool,
}

impl NoopEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackEngine for NoopEngine {
    fn load(&self, _: Arc<AudioItem>, _: CallbackSink) -> Result<(), EngineError> {
        if self.is_released() {
            return Err(EngineError::Released);
        }
        Ok(())
    }
    fn set_play_when_ready(&self, _: bool) {}
    fn prepare(&self) {}
    fn play(&self) {}
    fn pause(&self) {}
    fn seek_to(&self, _: u64) {}
    fn release(&self) -> Result<(), EngineError> {
        self.released.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
    fn is_playing(&self) -> bool {
        false
    }
    fn is_released(&self) -> bool {
        self.released.load(std::sync::atomic::Ordering::SeqCst)
    }
}
