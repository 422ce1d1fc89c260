//! Headless engine that plays nothing but reports like a real one.
//!
//! A worker thread owns a virtual clock. Prepare and seek spend
//! `buffering_delay` in Buffering, playback advances the position by wall
//! time, and the item ends once the position reaches its duration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use super::{CallbackSink, EngineError, EngineState, EngineTransitionReason, PlaybackEngine};
use crate::config::SimulationConfig;
use crate::models::AudioItem;

enum Command {
    Load { item: Arc<AudioItem>, sink: CallbackSink },
    SetPlayWhenReady(bool),
    Prepare,
    Play,
    Pause,
    Seek(u64),
    Release,
}

pub struct SimulatedEngine {
    tx: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    playing: Arc<AtomicBool>,
    position_ms: Arc<AtomicU64>,
    released: AtomicBool,
}

impl SimulatedEngine {
    pub fn new(config: SimulationConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let playing = Arc::new(AtomicBool::new(false));
        let position_ms = Arc::new(AtomicU64::new(0));

        let mut sim = Simulation::new(config, Arc::clone(&playing), Arc::clone(&position_ms));
        let spawned = thread::Builder::new()
            .name("sonata-simulated".to_string())
            .spawn(move || {
                let tick = sim.config.tick_interval();
                loop {
                    match rx.recv_timeout(tick) {
                        Ok(Command::Release) | Err(RecvTimeoutError::Disconnected) => break,
                        Ok(cmd) => sim.handle(cmd),
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    sim.tick(Instant::now());
                }
                sim.set_playing(false, false);
            });

        let (tx, worker) = match spawned {
            Ok(handle) => (Some(tx), Some(handle)),
            Err(e) => {
                log::error!("sonata: failed to spawn simulated engine: {}", e);
                (None, None)
            }
        };

        Self {
            tx: Mutex::new(tx),
            worker: Mutex::new(worker),
            playing,
            position_ms,
            released: AtomicBool::new(false),
        }
    }

    /// Virtual playhead of the current item.
    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    fn send(&self, cmd: Command) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(cmd).is_ok(),
            None => false,
        }
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn load(&self, item: Arc<AudioItem>, sink: CallbackSink) -> Result<(), EngineError> {
        if self.is_released() {
            return Err(EngineError::Released);
        }
        if self.send(Command::Load { item, sink }) {
            Ok(())
        } else {
            Err(EngineError::Backend("simulation thread not running".into()))
        }
    }

    fn set_play_when_ready(&self, play_when_ready: bool) {
        self.send(Command::SetPlayWhenReady(play_when_ready));
    }

    fn prepare(&self) {
        self.send(Command::Prepare);
    }

    fn play(&self) {
        self.send(Command::Play);
    }

    fn pause(&self) {
        self.send(Command::Pause);
    }

    fn seek_to(&self, position_ms: u64) {
        self.send(Command::Seek(position_ms));
    }

    fn release(&self) -> Result<(), EngineError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.send(Command::Release);
        self.tx.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                return Err(EngineError::Backend("simulation thread panicked".into()));
            }
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ---------------------------------------------------------------------------
// Worker state
// ---------------------------------------------------------------------------

struct Simulation {
    config: SimulationConfig,
    sink: Option<CallbackSink>,
    phase: EngineState,
    duration_ms: Option<u64>,
    position_ms: u64,
    play_when_ready: bool,
    buffering_until: Option<Instant>,
    last_tick: Instant,
    playing: Arc<AtomicBool>,
    shared_position: Arc<AtomicU64>,
}

impl Simulation {
    fn new(config: SimulationConfig, playing: Arc<AtomicBool>, shared_position: Arc<AtomicU64>) -> Self {
        Self {
            config,
            sink: None,
            phase: EngineState::Idle,
            duration_ms: None,
            position_ms: 0,
            play_when_ready: false,
            buffering_until: None,
            last_tick: Instant::now(),
            playing,
            shared_position,
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn report_state(&mut self, state: EngineState) {
        self.phase = state;
        if let Some(sink) = &self.sink {
            sink.state(state);
        }
    }

    fn set_playing(&mut self, playing: bool, report: bool) {
        if self.playing.swap(playing, Ordering::SeqCst) == playing {
            return;
        }
        if report {
            if let Some(sink) = &self.sink {
                sink.playing(playing);
            }
        }
    }

    fn start_buffering(&mut self) {
        self.report_state(EngineState::Buffering);
        self.buffering_until = Some(Instant::now() + self.config.buffering_delay());
    }

    fn set_position(&mut self, position_ms: u64) {
        self.position_ms = position_ms;
        self.shared_position.store(position_ms, Ordering::SeqCst);
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Load { item, sink } => {
                // The old load's listener is gone; nothing to report to it.
                self.set_playing(false, false);
                self.sink = Some(sink);
                self.phase = EngineState::Idle;
                self.buffering_until = None;
                self.duration_ms = item.duration_ms().or(self.config.fallback_duration_ms);
                self.set_position(0);
                log::debug!("sonata: simulating {}", item.uri());
                if let Some(sink) = &self.sink {
                    sink.transition(EngineTransitionReason::PlaylistChanged);
                }
            }
            Command::SetPlayWhenReady(v) => self.play_when_ready = v,
            Command::Prepare => {
                if self.phase == EngineState::Idle && self.sink.is_some() {
                    self.start_buffering();
                }
            }
            Command::Play => {
                self.play_when_ready = true;
                if self.phase == EngineState::Ready {
                    self.set_playing(true, true);
                }
            }
            Command::Pause => {
                self.play_when_ready = false;
                self.set_playing(false, true);
            }
            Command::Seek(ms) => {
                let target = self.duration_ms.map_or(ms, |d| ms.min(d));
                self.set_position(target);
                if self.phase != EngineState::Idle {
                    self.start_buffering();
                    self.set_playing(false, true);
                }
            }
            Command::Release => {}
        }
    }

    fn tick(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        if let Some(until) = self.buffering_until {
            if now >= until {
                self.buffering_until = None;
                self.report_state(EngineState::Ready);
                if self.play_when_ready {
                    self.set_playing(true, true);
                }
            }
            return;
        }

        if self.is_playing() {
            let position = self.position_ms.saturating_add(elapsed.as_millis() as u64);
            self.set_position(position);
            if let Some(duration) = self.duration_ms {
                if position >= duration {
                    self.set_position(duration);
                    self.report_state(EngineState::Ended);
                    self.set_playing(false, true);
                }
            }
        }
    }
}
