//! Thin call-through from coordinator commands to the injected engine.
//!
//! The adapter owns the terminal "stopped" flag and the argument checks;
//! everything else is forwarded unchanged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::{CallbackSink, EngineError, PlaybackEngine};
use crate::error::{PlayerError, PlayerResult};
use crate::models::{AudioItem, TimeUnit};

pub struct EngineAdapter {
    engine: Arc<dyn PlaybackEngine>,
    stopped: AtomicBool,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn PlaybackEngine>) -> Self {
        Self {
            engine,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &dyn PlaybackEngine {
        &*self.engine
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn ensure_usable(&self) -> PlayerResult<()> {
        if self.is_stopped() {
            return Err(PlayerError::AlreadyStopped);
        }
        if self.engine.is_released() {
            return Err(PlayerError::EngineUnavailable);
        }
        Ok(())
    }

    /// Hand `item` to the engine, set autoplay and start preparing.
    pub fn load(&self, item: Arc<AudioItem>, play_when_ready: bool, sink: CallbackSink) -> PlayerResult<()> {
        self.ensure_usable()?;
        self.engine.set_play_when_ready(play_when_ready);
        self.engine.load(item, sink).map_err(|e| match e {
            EngineError::Released => PlayerError::EngineUnavailable,
            EngineError::Backend(msg) => {
                log::warn!("sonata: engine refused load: {}", msg);
                PlayerError::EngineUnavailable
            }
        })?;
        self.engine.prepare();
        Ok(())
    }

    pub fn play(&self) -> PlayerResult<()> {
        self.ensure_usable()?;
        self.engine.prepare();
        self.engine.play();
        Ok(())
    }

    pub fn pause(&self) -> PlayerResult<()> {
        self.ensure_usable()?;
        self.engine.pause();
        Ok(())
    }

    /// Pause if the engine is playing, play otherwise. Returns true if it asked to play.
    pub fn toggle_play(&self) -> PlayerResult<bool> {
        self.ensure_usable()?;
        if self.engine.is_playing() {
            self.engine.pause();
            Ok(false)
        } else {
            self.engine.prepare();
            self.engine.play();
            Ok(true)
        }
    }

    /// Seek to `duration` expressed in `unit`. Negative offsets are rejected.
    pub fn seek(&self, duration: i64, unit: TimeUnit) -> PlayerResult<u64> {
        let millis = seek_millis(duration, unit)?;
        self.ensure_usable()?;
        self.engine.seek_to(millis);
        Ok(millis)
    }

    /// Release the engine. Terminal and idempotent.
    ///
    /// The adapter counts as stopped even if the engine fails to release.
    pub fn stop(&self) -> Result<(), EngineError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.engine.is_released() {
            return Ok(());
        }
        self.engine.release()
    }
}

/// Validate and convert a seek offset to milliseconds.
pub fn seek_millis(duration: i64, unit: TimeUnit) -> PlayerResult<u64> {
    if duration < 0 {
        return Err(PlayerError::InvalidArgument(format!(
            "seek offset must not be negative (got {} {:?})",
            duration, unit
        )));
    }
    Ok(unit.to_millis(duration) as u64)
}
