//! sonata-core: playback state coordinator.
//!
//! Drives an injected playback engine and republishes what it reports as a
//! small, ordered event stream.
//!
//! # Architecture
//!
//! ```text
//! caller ──commands──▶ Coordinator ──▶ EngineAdapter ──▶ dyn PlaybackEngine
//!                         ▲                                   │
//!                         └──── actor ◀── CallbackSink ◀──────┘
//!                         │
//!                         ▼
//!                   EventPublisher ──▶ subscribers, SessionBridge
//! ```

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod machine;
pub mod metadata;
pub mod models;
pub mod publisher;
pub mod session;

pub use config::{PlayerConfig, SimulationConfig};
pub use coordinator::{Coordinator, StatusView};
pub use engine::{
    CallbackSink, EngineError, EngineSignal, EngineState, EngineTransitionReason, NoopEngine,
    PlaybackEngine, SimulatedEngine,
};
pub use error::{PlayerError, PlayerResult};
pub use models::*;
pub use publisher::{EventPublisher, Subscription, SubscriptionId};
pub use session::{LogSessionHost, NotificationChannel, NowPlaying, SessionBridge, SessionError, SessionHost};

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    /// Engine driven by hand: the test decides which callbacks fire.
    #[derive(Default)]
    struct ScriptedEngine {
        sinks: Mutex<Vec<CallbackSink>>,
        calls: Mutex<Vec<String>>,
        playing: AtomicBool,
        released: AtomicBool,
        fail_release: bool,
        refuse_loads: AtomicBool,
    }

    impl ScriptedEngine {
        fn sink(&self) -> CallbackSink {
            self.sinks.lock().last().cloned().expect("nothing loaded")
        }

        /// Sink handed out by the `n`-th load, counting from zero.
        fn sink_at(&self, n: usize) -> CallbackSink {
            self.sinks.lock()[n].clone()
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl PlaybackEngine for ScriptedEngine {
        fn load(&self, item: Arc<AudioItem>, sink: CallbackSink) -> Result<(), EngineError> {
            self.calls.lock().push(format!("load {}", item.uri()));
            if self.refuse_loads.load(Ordering::SeqCst) {
                return Err(EngineError::Backend("unsupported item".into()));
            }
            self.sinks.lock().push(sink);
            Ok(())
        }
        fn set_play_when_ready(&self, _: bool) {}
        fn prepare(&self) {}
        fn play(&self) {
            self.calls.lock().push("play".into());
        }
        fn pause(&self) {
            self.calls.lock().push("pause".into());
        }
        fn seek_to(&self, ms: u64) {
            self.calls.lock().push(format!("seek {}", ms));
        }
        fn release(&self) -> Result<(), EngineError> {
            self.released.store(true, Ordering::SeqCst);
            if self.fail_release {
                return Err(EngineError::Backend("device busy".into()));
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

    fn setup() -> (Arc<ScriptedEngine>, Coordinator) {
        let engine = Arc::new(ScriptedEngine::default());
        let coordinator = Coordinator::new(engine.clone()).unwrap();
        (engine, coordinator)
    }

    fn item(uri: &str) -> AudioItem {
        AudioItem::builder(uri).build().unwrap()
    }

    fn expect_states(sub: &Subscription, expected: &[PlaybackState]) {
        let mut got = Vec::new();
        while got.len() < expected.len() {
            match sub.recv_timeout(WAIT) {
                Some(event) => got.extend(event.state()),
                None => break,
            }
        }
        assert_eq!(got, expected);
    }

    /// Play the item to Playing through the scripted engine.
    fn start_playing(engine: &ScriptedEngine, sub: &Subscription) {
        let sink = engine.sink();
        sink.state(EngineState::Buffering);
        sink.state(EngineState::Ready);
        sink.playing(true);
        engine.playing.store(true, Ordering::SeqCst);
        expect_states(
            sub,
            &[PlaybackState::Buffering, PlaybackState::Ready, PlaybackState::Playing],
        );
    }

    #[test]
    fn starts_idle_without_item() {
        let (_engine, coordinator) = setup();
        assert_eq!(coordinator.current_state(), PlaybackState::Idle);
        assert!(coordinator.current_item().is_none());
    }

    #[test]
    fn load_play_scenario() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &sub);
        assert_eq!(coordinator.current_state(), PlaybackState::Playing);
        assert_eq!(coordinator.current_item().unwrap().uri(), "/music/a.mp3");
    }

    #[test]
    fn pause_then_toggle() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &sub);

        coordinator.pause().unwrap();
        engine.playing.store(false, Ordering::SeqCst);
        engine.sink().playing(false);
        expect_states(&sub, &[PlaybackState::Paused]);

        coordinator.toggle_play().unwrap();
        engine.sink().playing(true);
        expect_states(&sub, &[PlaybackState::Playing]);
        assert_eq!(
            engine.calls(),
            vec!["load /music/a.mp3", "pause", "play"]
        );
    }

    #[test]
    fn loading_flag_reports_loading() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("https://example.com/a.mp3"), false).unwrap();
        let sink = engine.sink();
        sink.loading(true);
        sink.state(EngineState::Buffering);
        sink.loading(false);
        sink.state(EngineState::Ready);
        expect_states(
            &sub,
            &[PlaybackState::Loading, PlaybackState::Buffering, PlaybackState::Ready],
        );
    }

    #[test]
    fn negative_seek_is_rejected_and_state_kept() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &sub);

        let err = coordinator.seek(-5, TimeUnit::Seconds).unwrap_err();
        assert!(matches!(err, PlayerError::InvalidArgument(_)));
        assert_eq!(coordinator.current_state(), PlaybackState::Playing);
        assert!(!engine.calls().iter().any(|c| c.starts_with("seek")));
    }

    #[test]
    fn seek_converts_and_rebuffers() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &sub);

        coordinator.seek(2, TimeUnit::Minutes).unwrap();
        assert!(engine.calls().contains(&"seek 120000".to_string()));

        let sink = engine.sink();
        sink.state(EngineState::Buffering);
        sink.playing(false);
        sink.state(EngineState::Ready);
        sink.playing(true);
        expect_states(
            &sub,
            &[PlaybackState::Buffering, PlaybackState::Ready, PlaybackState::Playing],
        );
    }

    #[test]
    fn commands_needing_an_item_fail_before_load() {
        let (_engine, coordinator) = setup();
        assert!(matches!(
            coordinator.play(),
            Err(PlayerError::InvalidTransition { from: PlaybackState::Idle, .. })
        ));
        assert!(matches!(
            coordinator.toggle_play(),
            Err(PlayerError::InvalidTransition { .. })
        ));
        assert!(matches!(
            coordinator.seek(1, TimeUnit::Seconds),
            Err(PlayerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn stop_twice_then_everything_fails() {
        let (engine, coordinator) = setup();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        coordinator.stop().unwrap();
        coordinator.stop().unwrap();
        assert!(engine.is_released());
        assert!(coordinator.is_stopped());

        let item_b = item("/music/b.mp3");
        assert_eq!(coordinator.load(item_b, true), Err(PlayerError::AlreadyStopped));
        assert_eq!(coordinator.play(), Err(PlayerError::AlreadyStopped));
        assert_eq!(coordinator.pause(), Err(PlayerError::AlreadyStopped));
        assert_eq!(coordinator.toggle_play(), Err(PlayerError::AlreadyStopped));
        assert_eq!(coordinator.seek(1, TimeUnit::Seconds), Err(PlayerError::AlreadyStopped));
        assert!(matches!(coordinator.subscribe(), Err(PlayerError::AlreadyStopped)));
    }

    #[test]
    fn stop_publishes_idle_and_ends_stream() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &sub);

        coordinator.stop().unwrap();
        assert_eq!(sub.recv(), Some(PlayerEvent::StateChanged(PlaybackState::Idle)));
        assert_eq!(sub.recv(), None);
    }

    #[test]
    fn stop_survives_failed_release() {
        let engine = Arc::new(ScriptedEngine {
            fail_release: true,
            ..Default::default()
        });
        let coordinator = Coordinator::new(engine.clone()).unwrap();
        assert!(coordinator.stop().is_ok());
        assert!(coordinator.is_stopped());
        assert_eq!(coordinator.play(), Err(PlayerError::AlreadyStopped));
    }

    #[test]
    fn callbacks_after_stop_are_ignored() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        coordinator.stop().unwrap();
        engine.sink().state(EngineState::Buffering);
        assert_eq!(coordinator.current_state(), PlaybackState::Idle);
        assert_eq!(sub.drain(), Vec::new());
    }

    #[test]
    fn superseded_load_only_reports_second_item() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        coordinator.load(item("/music/b.mp3"), true).unwrap();

        let stale = engine.sink_at(0);
        let fresh = engine.sink_at(1);
        assert!(fresh.generation() > stale.generation());

        stale.state(EngineState::Buffering);
        stale.state(EngineState::Ready);
        fresh.transition(EngineTransitionReason::PlaylistChanged);
        fresh.state(EngineState::Buffering);

        match sub.recv_timeout(WAIT) {
            Some(PlayerEvent::ItemTransitioned { reason, item }) => {
                assert_eq!(reason, TransitionReason::QueueChanged);
                assert_eq!(item.unwrap().uri(), "/music/b.mp3");
            }
            other => panic!("expected item transition, got {:?}", other),
        }
        expect_states(&sub, &[PlaybackState::Buffering]);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn superseding_a_buffering_item_reports_buffering_again() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        engine.sink().state(EngineState::Buffering);
        expect_states(&sub, &[PlaybackState::Buffering]);

        coordinator.load(item("/music/b.mp3"), true).unwrap();
        let sink = engine.sink();
        sink.state(EngineState::Buffering);
        sink.state(EngineState::Ready);
        expect_states(&sub, &[PlaybackState::Buffering, PlaybackState::Ready]);
    }

    #[test]
    fn superseding_a_ready_item_reports_ready_again() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), false).unwrap();
        let sink = engine.sink();
        sink.state(EngineState::Buffering);
        sink.state(EngineState::Ready);
        expect_states(&sub, &[PlaybackState::Buffering, PlaybackState::Ready]);

        coordinator.load(item("/music/b.mp3"), false).unwrap();
        engine.sink().state(EngineState::Ready);
        expect_states(&sub, &[PlaybackState::Ready]);
    }

    #[test]
    fn refused_load_keeps_previous_item_reporting() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &sub);

        engine.refuse_loads.store(true, Ordering::SeqCst);
        assert_eq!(
            coordinator.load(item("/music/b.mp3"), true),
            Err(PlayerError::EngineUnavailable)
        );
        assert_eq!(coordinator.current_item().unwrap().uri(), "/music/a.mp3");

        // The engine still reports through the first load's sink.
        engine.sink().playing(false);
        expect_states(&sub, &[PlaybackState::Paused]);
    }

    #[test]
    fn engine_pausing_on_its_own_is_paused() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &sub);

        engine.sink().playing(false);
        expect_states(&sub, &[PlaybackState::Paused]);
        assert_eq!(coordinator.current_state(), PlaybackState::Paused);
        assert!(!engine.calls().contains(&"pause".to_string()));
    }

    /// Engine that reads the coordinator from inside its own calls.
    #[derive(Default)]
    struct ReentrantEngine {
        status: Mutex<Option<StatusView>>,
        seen: Mutex<Vec<PlaybackState>>,
    }

    impl ReentrantEngine {
        fn look(&self) {
            if let Some(status) = self.status.lock().as_ref() {
                self.seen.lock().push(status.current_state());
            }
        }
    }

    impl PlaybackEngine for ReentrantEngine {
        fn load(&self, _: Arc<AudioItem>, _: CallbackSink) -> Result<(), EngineError> {
            self.look();
            Ok(())
        }
        fn set_play_when_ready(&self, _: bool) {}
        fn prepare(&self) {}
        fn play(&self) {
            self.look();
        }
        fn pause(&self) {}
        fn seek_to(&self, _: u64) {
            self.look();
        }
        fn release(&self) -> Result<(), EngineError> {
            self.look();
            Ok(())
        }
        fn is_playing(&self) -> bool {
            false
        }
        fn is_released(&self) -> bool {
            false
        }
    }

    #[test]
    fn engine_may_query_coordinator_from_its_calls() {
        let engine = Arc::new(ReentrantEngine::default());
        let coordinator = Arc::new(Coordinator::new(engine.clone()).unwrap());
        *engine.status.lock() = Some(coordinator.status());

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&coordinator);
        std::thread::spawn(move || {
            let result = worker
                .load(item("/music/a.mp3"), true)
                .and_then(|_| worker.play())
                .and_then(|_| worker.seek(1, TimeUnit::Seconds))
                .and_then(|_| worker.stop());
            let _ = done_tx.send(result);
        });

        assert_eq!(done_rx.recv_timeout(WAIT), Ok(Ok(())));
        assert_eq!(engine.seen.lock().len(), 4);
        // Break the engine -> status -> coordinator cycle.
        engine.status.lock().take();
    }

    #[test]
    fn premature_playing_is_rejected_and_counted() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        let sink = engine.sink();
        sink.state(EngineState::Buffering);
        sink.playing(true);
        sink.state(EngineState::Ready);
        // Playing before Ready is dropped; Ready then resolves to Playing.
        expect_states(&sub, &[PlaybackState::Buffering, PlaybackState::Playing]);
        assert_eq!(coordinator.rejected_transitions(), 1);
    }

    #[test]
    fn lenient_config_accepts_premature_playing() {
        let engine = Arc::new(ScriptedEngine::default());
        let config = PlayerConfig {
            strict_transitions: false,
            ..Default::default()
        };
        let coordinator = Coordinator::with_config(engine.clone(), config).unwrap();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        let sink = engine.sink();
        sink.state(EngineState::Buffering);
        sink.playing(true);
        expect_states(&sub, &[PlaybackState::Buffering, PlaybackState::Playing]);
        assert_eq!(coordinator.rejected_transitions(), 0);
    }

    #[test]
    fn ended_waits_then_play_restarts_from_zero() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &sub);

        let sink = engine.sink();
        sink.state(EngineState::Ended);
        sink.playing(false);
        engine.playing.store(false, Ordering::SeqCst);
        expect_states(&sub, &[PlaybackState::Ended]);
        assert_eq!(coordinator.current_item().unwrap().uri(), "/music/a.mp3");

        coordinator.play().unwrap();
        let calls = engine.calls();
        assert_eq!(&calls[calls.len() - 2..], &["seek 0", "play"]);
    }

    #[test]
    fn multiple_subscribers_see_same_order() {
        let (engine, coordinator) = setup();
        let a = coordinator.subscribe().unwrap();
        let b = coordinator.subscribe().unwrap();
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        start_playing(&engine, &a);
        expect_states(
            &b,
            &[PlaybackState::Buffering, PlaybackState::Ready, PlaybackState::Playing],
        );
    }

    #[test]
    fn unsubscribed_receives_nothing_new() {
        let (engine, coordinator) = setup();
        let sub = coordinator.subscribe().unwrap();
        assert!(coordinator.unsubscribe(sub.id()));
        coordinator.load(item("/music/a.mp3"), true).unwrap();
        engine.sink().state(EngineState::Buffering);
        assert_eq!(sub.recv_timeout(Duration::from_millis(50)), None);
    }

    #[test]
    fn stop_from_subscriber_callback_does_not_deadlock() {
        let (engine, coordinator) = setup();
        let coordinator = Arc::new(coordinator);
        let handle = Arc::clone(&coordinator);
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        coordinator
            .subscribe_with(move |event| {
                if event.state() == Some(PlaybackState::Ready) {
                    let _ = done_tx.send(handle.stop());
                }
            })
            .unwrap();
        coordinator.load(item("/music/a.mp3"), false).unwrap();
        let sink = engine.sink();
        sink.state(EngineState::Buffering);
        sink.state(EngineState::Ready);

        assert_eq!(done_rx.recv_timeout(WAIT), Ok(Ok(())));
        assert!(coordinator.is_stopped());
    }

    #[test]
    fn released_engine_is_unavailable() {
        let engine = Arc::new(ScriptedEngine::default());
        engine.release().unwrap();
        assert!(matches!(
            Coordinator::new(engine),
            Err(PlayerError::EngineUnavailable)
        ));
    }

    #[test]
    fn simulated_coordinator_reaches_playing_and_ends() {
        let config = PlayerConfig {
            simulation: SimulationConfig {
                buffering_delay_ms: 10,
                tick_interval_ms: 2,
                fallback_duration_ms: None,
            },
            ..Default::default()
        };
        let coordinator = Coordinator::simulated(config).unwrap();
        let sub = coordinator.subscribe().unwrap();
        let song = AudioItem::builder("sim://song").duration_ms(40).build().unwrap();
        coordinator.load(song, true).unwrap();

        let mut states = Vec::new();
        while states.last() != Some(&PlaybackState::Ended) {
            match sub.recv_timeout(WAIT) {
                Some(event) => states.extend(event.state()),
                None => panic!("stalled after {:?}", states),
            }
        }
        assert_eq!(
            states,
            vec![
                PlaybackState::Buffering,
                PlaybackState::Ready,
                PlaybackState::Playing,
                PlaybackState::Ended,
            ]
        );
    }
}
