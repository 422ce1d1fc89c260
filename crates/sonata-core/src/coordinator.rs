//! Playback state coordinator.
//!
//! Owns the public [`PlaybackState`], forwards commands to the engine
//! adapter and turns the engine's raw callbacks into [`PlayerEvent`]s.
//!
//! Engine callbacks arrive on whatever thread the engine uses. They are
//! funnelled through one channel into an actor thread, which shares a single
//! mutex with the command methods. Every state change therefore happens in
//! one critical section, in arrival order. The mutex is never held while
//! calling into the engine, so an engine may query the coordinator from
//! inside any call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, MutexGuard};

use crate::adapter::{seek_millis, EngineAdapter};
use crate::config::PlayerConfig;
use crate::engine::{CallbackSink, EngineSignal, Inbound, PlaybackEngine, SimulatedEngine};
use crate::error::{PlayerError, PlayerResult};
use crate::machine::{reduce, Reduction, SignalState};
use crate::models::{AudioItem, PlaybackState, PlayerEvent, TimeUnit};
use crate::publisher::{EventPublisher, Subscription, SubscriptionId};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Core {
    state: PlaybackState,
    facts: SignalState,
    item: Option<Arc<AudioItem>>,
    /// Generation of the current load. Callbacks tagged otherwise are stale.
    generation: u64,
    /// Last generation handed out. Never reused, even by a rolled-back load.
    issued: u64,
    stopped: bool,
    inbound: Sender<Inbound>,
}

impl Core {
    /// Commands that act on media fail while nothing was ever loaded.
    fn require_item(&self, to: PlaybackState) -> PlayerResult<()> {
        if self.item.is_none() {
            return Err(PlayerError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    fn next_generation(&mut self) -> u64 {
        self.issued += 1;
        self.generation = self.issued;
        self.generation
    }
}

/// What a load replaced, restored if the engine refuses the new item.
struct Superseded {
    generation: u64,
    facts: SignalState,
    item: Option<Arc<AudioItem>>,
}

struct Shared {
    core: Mutex<Core>,
    adapter: EngineAdapter,
    events: EventPublisher,
    config: PlayerConfig,
    rejected: AtomicU64,
}

impl Shared {
    fn lock_live(&self) -> PlayerResult<MutexGuard<'_, Core>> {
        let core = self.core.lock();
        if core.stopped {
            return Err(PlayerError::AlreadyStopped);
        }
        Ok(core)
    }

    /// Actor side: fold one engine callback into the public state.
    fn on_signal(&self, generation: u64, signal: EngineSignal) {
        let mut core = self.core.lock();
        if core.stopped || generation != core.generation {
            log::debug!(
                "sonata: discarding stale {:?} (generation {}, current {})",
                signal,
                generation,
                core.generation
            );
            return;
        }

        if let EngineSignal::ItemTransition(reason) = signal {
            self.events.publish(PlayerEvent::ItemTransitioned {
                reason: reason.into(),
                item: core.item.clone(),
            });
            return;
        }

        let current = core.state;
        match reduce(current, &mut core.facts, signal, self.config.strict_transitions) {
            Ok(Reduction::Changed(next)) => {
                log::debug!("sonata: state {} -> {}", current, next);
                core.state = next;
                self.events.publish(PlayerEvent::StateChanged(next));
            }
            Ok(Reduction::Unchanged) => {}
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::SeqCst);
                log::warn!("sonata: rejected engine signal {:?}: {}", signal, e);
            }
        }
    }
}

fn run_actor(shared: Arc<Shared>, rx: Receiver<Inbound>) {
    for msg in rx.iter() {
        match msg {
            Inbound::Signal { generation, signal } => shared.on_signal(generation, signal),
            Inbound::Shutdown => break,
        }
    }
    log::debug!("sonata: coordinator actor exited");
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Single source of truth for one player's [`PlaybackState`].
///
/// Dropping the coordinator stops it.
pub struct Coordinator {
    shared: Arc<Shared>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Coordinator over `engine` with default settings.
    pub fn new(engine: Arc<dyn PlaybackEngine>) -> PlayerResult<Self> {
        Self::with_config(engine, PlayerConfig::default())
    }

    /// Coordinator over a [`SimulatedEngine`] timed by `config.simulation`.
    pub fn simulated(config: PlayerConfig) -> PlayerResult<Self> {
        let engine = Arc::new(SimulatedEngine::new(config.simulation.clone()));
        Self::with_config(engine, config)
    }

    pub fn with_config(engine: Arc<dyn PlaybackEngine>, config: PlayerConfig) -> PlayerResult<Self> {
        if engine.is_released() {
            return Err(PlayerError::EngineUnavailable);
        }
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            core: Mutex::new(Core {
                state: PlaybackState::Idle,
                facts: SignalState::for_load(config.play_when_ready),
                item: None,
                generation: 0,
                issued: 0,
                stopped: false,
                inbound: tx,
            }),
            adapter: EngineAdapter::new(engine),
            events: EventPublisher::new(),
            config,
            rejected: AtomicU64::new(0),
        });

        let actor_shared = Arc::clone(&shared);
        let actor = thread::Builder::new()
            .name(shared.config.actor_thread_name.clone())
            .spawn(move || run_actor(actor_shared, rx))
            .map_err(|e| {
                log::error!("sonata: failed to spawn coordinator actor: {}", e);
                PlayerError::EngineUnavailable
            })?;

        Ok(Self {
            shared,
            actor: Mutex::new(Some(actor)),
        })
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Make `item` current and start preparing it.
    ///
    /// Supersedes any earlier load: callbacks still in flight for the old
    /// item are discarded. Subscribers see the new item's transitions once
    /// the engine reports them. If the engine refuses the item, the previous
    /// one stays current and keeps reporting.
    pub fn load(&self, item: impl Into<Arc<AudioItem>>, play_when_ready: bool) -> PlayerResult<()> {
        let item = item.into();
        let (generation, sink, previous) = {
            let mut core = self.shared.lock_live()?;
            let previous = Superseded {
                generation: core.generation,
                facts: core.facts,
                item: core.item.take(),
            };
            let generation = core.next_generation();
            core.facts = SignalState::for_load(play_when_ready);
            core.item = Some(Arc::clone(&item));
            (generation, CallbackSink::new(generation, core.inbound.clone()), previous)
        };

        if let Err(e) = self.shared.adapter.load(Arc::clone(&item), play_when_ready, sink) {
            let mut core = self.shared.core.lock();
            if !core.stopped && core.generation == generation {
                log::debug!("sonata: load of {} refused, keeping previous item", item.uri());
                core.generation = previous.generation;
                core.facts = previous.facts;
                core.item = previous.item;
            }
            return Err(e);
        }
        log::info!("sonata: loaded {} (play_when_ready={})", item.uri(), play_when_ready);
        Ok(())
    }

    /// [`load`](Self::load) with the configured autoplay flag.
    pub fn load_with_defaults(&self, item: impl Into<Arc<AudioItem>>) -> PlayerResult<()> {
        self.load(item, self.shared.config.play_when_ready)
    }

    /// Start or resume. From Ended the item restarts at 0.
    pub fn play(&self) -> PlayerResult<()> {
        let restart = {
            let mut core = self.shared.lock_live()?;
            core.require_item(PlaybackState::Playing)?;
            core.facts.play_when_ready = true;
            core.facts.halted = false;
            core.state == PlaybackState::Ended
        };
        if restart {
            self.shared.adapter.seek(0, TimeUnit::Milliseconds)?;
        }
        self.shared.adapter.play()
    }

    pub fn pause(&self) -> PlayerResult<()> {
        self.shared.lock_live()?.facts.play_when_ready = false;
        self.shared.adapter.pause()
    }

    /// Pause if the engine is playing, play otherwise.
    pub fn toggle_play(&self) -> PlayerResult<()> {
        let (restart, generation) = {
            let core = self.shared.lock_live()?;
            core.require_item(PlaybackState::Playing)?;
            (core.state == PlaybackState::Ended, core.generation)
        };
        if restart {
            self.shared.adapter.seek(0, TimeUnit::Milliseconds)?;
        }
        let playing = self.shared.adapter.toggle_play()?;

        let mut core = self.shared.core.lock();
        if core.generation == generation {
            core.facts.play_when_ready = playing;
            if playing {
                core.facts.halted = false;
            }
        }
        Ok(())
    }

    /// Seek within the current item. Negative offsets fail with
    /// `InvalidArgument` and leave everything untouched.
    pub fn seek(&self, duration: i64, unit: TimeUnit) -> PlayerResult<()> {
        seek_millis(duration, unit)?;
        self.shared.lock_live()?.require_item(PlaybackState::Buffering)?;
        let millis = self.shared.adapter.seek(duration, unit)?;
        log::debug!("sonata: seek to {}ms", millis);
        Ok(())
    }

    /// Release the engine and end the event stream. Terminal.
    ///
    /// Safe to call twice, from any state, and from a subscriber callback.
    /// An engine that fails to release is logged; the coordinator still
    /// counts as stopped.
    pub fn stop(&self) -> PlayerResult<()> {
        {
            let mut core = self.shared.core.lock();
            if core.stopped {
                return Ok(());
            }
            core.stopped = true;
            core.next_generation();

            if core.state != PlaybackState::Idle {
                log::debug!("sonata: state {} -> {}", core.state, PlaybackState::Idle);
                core.state = PlaybackState::Idle;
                self.shared.events.publish(PlayerEvent::StateChanged(PlaybackState::Idle));
            }
            // The actor may already be gone if it panicked.
            let _ = core.inbound.send(Inbound::Shutdown);
        }

        if let Err(e) = self.shared.adapter.stop() {
            log::warn!("sonata: engine release failed: {}", e);
        }
        self.shared.events.close();

        if let Some(handle) = self.actor.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        log::info!("sonata: coordinator stopped");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn subscribe(&self) -> PlayerResult<Subscription> {
        let _core = self.shared.lock_live()?;
        Ok(self.shared.events.subscribe())
    }

    /// Run `callback` for every event on a dedicated delivery thread.
    pub fn subscribe_with<F>(&self, callback: F) -> PlayerResult<SubscriptionId>
    where
        F: FnMut(&PlayerEvent) + Send + 'static,
    {
        let _core = self.shared.lock_live()?;
        Ok(self.shared.events.subscribe_with(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn current_state(&self) -> PlaybackState {
        self.shared.core.lock().state
    }

    pub fn current_item(&self) -> Option<Arc<AudioItem>> {
        self.shared.core.lock().item.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.core.lock().stopped
    }

    /// Engine signals rejected as invalid transitions so far.
    pub fn rejected_transitions(&self) -> u64 {
        self.shared.rejected.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.shared.config
    }

    /// Read-only handle for the notification/session side.
    pub fn status(&self) -> StatusView {
        StatusView {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Cloneable read-only view of a coordinator.
#[derive(Clone)]
pub struct StatusView {
    shared: Arc<Shared>,
}

impl StatusView {
    pub fn current_state(&self) -> PlaybackState {
        self.shared.core.lock().state
    }

    pub fn current_item(&self) -> Option<Arc<AudioItem>> {
        self.shared.core.lock().item.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.core.lock().stopped
    }

    pub(crate) fn events(&self) -> &EventPublisher {
        &self.shared.events
    }

    /// Subscribe unless the coordinator already stopped.
    pub(crate) fn subscribe(&self) -> PlayerResult<Subscription> {
        let _core = self.shared.lock_live()?;
        Ok(self.shared.events.subscribe())
    }
}

impl std::fmt::Debug for StatusView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("StatusView")
            .field("state", &core.state)
            .field("item", &core.item.as_ref().map(|i| i.uri().to_string()))
            .field("stopped", &core.stopped)
            .finish()
    }
}
