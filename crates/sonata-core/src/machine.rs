//! Reduction of raw engine signals onto [`PlaybackState`].
//!
//! The engine reports a primary state code plus independent `is_loading` and
//! `is_playing` flags. [`SignalState`] keeps the latest of each, together with
//! the coordinator's own play-when-ready intent, and derives the single
//! public state from them. Loading and Playing take precedence over the code
//! while active.

use crate::engine::{EngineSignal, EngineState};
use crate::error::{PlayerError, PlayerResult};
use crate::models::PlaybackState;

/// Engine facts observed for the current load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalState {
    pub engine: EngineState,
    pub loading: bool,
    pub playing: bool,
    /// Coordinator intent, set by load/play/pause commands.
    pub play_when_ready: bool,
    /// The engine reported `Ready` at least once for this load.
    pub prepared: bool,
    /// The engine reported `is_playing = true` at least once for this load.
    pub started: bool,
    /// Playback stopped while Ready without a pause command, e.g. from
    /// media-session controls or lost audio focus.
    pub halted: bool,
    /// A public state was published for this load.
    pub announced: bool,
}

impl SignalState {
    /// Fresh facts for a new load.
    pub fn for_load(play_when_ready: bool) -> Self {
        Self {
            engine: EngineState::Idle,
            loading: false,
            playing: false,
            play_when_ready,
            prepared: false,
            started: false,
            halted: false,
            announced: false,
        }
    }

    /// Record one engine signal. Item transitions carry no state facts.
    pub fn apply(&mut self, signal: EngineSignal) {
        match signal {
            EngineSignal::PlaybackStateChanged(state) => {
                self.engine = state;
                if state == EngineState::Ready {
                    self.prepared = true;
                } else {
                    self.halted = false;
                }
            }
            EngineSignal::IsLoadingChanged(loading) => self.loading = loading,
            EngineSignal::IsPlayingChanged(playing) => {
                self.playing = playing;
                if playing {
                    self.started = true;
                    self.halted = false;
                } else if self.started && self.engine == EngineState::Ready {
                    self.halted = true;
                }
            }
            EngineSignal::PlayWhenReadyChanged(play_when_ready) => {
                self.play_when_ready = play_when_ready;
                if play_when_ready {
                    self.halted = false;
                }
            }
            EngineSignal::ItemTransition(_) => {}
        }
    }

    /// The public state these facts describe.
    pub fn derive(&self) -> PlaybackState {
        match self.engine {
            EngineState::Ended => PlaybackState::Ended,
            EngineState::Idle if self.loading => PlaybackState::Loading,
            EngineState::Idle => PlaybackState::Idle,
            _ if self.playing => PlaybackState::Playing,
            EngineState::Buffering if self.loading => PlaybackState::Loading,
            EngineState::Buffering => PlaybackState::Buffering,
            EngineState::Ready if self.started && (self.halted || !self.play_when_ready) => {
                PlaybackState::Paused
            }
            EngineState::Ready => PlaybackState::Ready,
        }
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::for_load(true)
    }
}

/// Check a derived transition against what the engine has reported so far.
///
/// Playing, Paused and Ended only make sense once the current media reached
/// Ready. Everything else (including re-entering Buffering after a seek) is
/// accepted from any state.
pub fn check_transition(from: PlaybackState, to: PlaybackState, facts: &SignalState) -> PlayerResult<()> {
    let needs_ready = matches!(
        to,
        PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Ended
    );
    if needs_ready && !facts.prepared {
        return Err(PlayerError::InvalidTransition { from, to });
    }
    Ok(())
}

/// Outcome of reducing one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Public state moved to a new value.
    Changed(PlaybackState),
    /// Facts updated, public state unchanged.
    Unchanged,
}

/// Apply `signal` to `facts` and compute the next public state from `current`.
///
/// Facts always track the engine. The public state only moves when the
/// transition passes [`check_transition`] (or `strict` is off). The first
/// non-idle state of a load is published even when it equals `current`,
/// which may still describe the previous item.
pub fn reduce(
    current: PlaybackState,
    facts: &mut SignalState,
    signal: EngineSignal,
    strict: bool,
) -> PlayerResult<Reduction> {
    facts.apply(signal);
    let next = facts.derive();
    if next == current && (facts.announced || next == PlaybackState::Idle) {
        return Ok(Reduction::Unchanged);
    }
    if strict {
        check_transition(current, next, facts)?;
    }
    facts.announced = true;
    Ok(Reduction::Changed(next))
}
