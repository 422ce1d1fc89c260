//! sonata CLI: drive the playback coordinator from a terminal.
//!
//! Commands:
//!   sonata play <file|url> [--paused]   Play through the built-in engine
//!   sonata simulate <uri> [seconds]     Run a simulated item to the end
//!   sonata probe <file>                 Print an item's metadata as JSON
//!   sonata scan <dir>                   List audio files in a directory
//!   sonata states                       List the public playback states

use std::path::Path;
use std::time::Duration;

use sonata_core::metadata::{is_audio_path, probe_file};
use sonata_core::{
    AudioItem, Coordinator, LogSessionHost, PlaybackState, PlayerConfig, PlayerEvent, PlayerResult,
    SessionBridge, SimulationConfig, Subscription, TimeUnit,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return;
    }

    let result = match args[0].as_str() {
        "play" => cmd_play(&args[1..]),
        "simulate" => cmd_simulate(&args[1..]),
        "probe" => cmd_probe(&args[1..]),
        "scan" => cmd_scan(&args[1..]),
        "states" => {
            cmd_states();
            Ok(())
        }
        other => {
            eprintln!("unknown command: {}", other);
            print_usage();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_play(args: &[String]) -> PlayerResult<()> {
    let Some(target) = args.first() else {
        eprintln!("usage: sonata play <file|url> [--paused]");
        return Ok(());
    };
    let paused = args.iter().any(|a| a == "--paused");

    let item = if Path::new(target).exists() {
        probe_file(target)?
    } else {
        AudioItem::builder(target.as_str()).build()?
    };

    let coordinator = open_player(PlayerConfig::default())?;
    let _session = attach_session(&coordinator);
    let events = coordinator.subscribe()?;
    coordinator.load(item, !paused)?;

    if paused {
        // A never-started item settles in Ready; start it ourselves.
        if !follow_until(&coordinator, &events, PlaybackState::Ready) {
            return coordinator.stop();
        }
        coordinator.play()?;
    }
    follow_until(&coordinator, &events, PlaybackState::Ended);
    coordinator.stop()
}

fn cmd_simulate(args: &[String]) -> PlayerResult<()> {
    let Some(uri) = args.first() else {
        eprintln!("usage: sonata simulate <uri> [seconds]");
        return Ok(());
    };
    let seconds: i64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(3);

    let config = PlayerConfig {
        simulation: SimulationConfig {
            fallback_duration_ms: Some(TimeUnit::Seconds.to_millis(seconds.max(0)) as u64),
            ..Default::default()
        },
        ..Default::default()
    };
    let coordinator = Coordinator::simulated(config)?;
    let _session = attach_session(&coordinator);
    let events = coordinator.subscribe()?;
    coordinator.load_with_defaults(AudioItem::builder(uri.as_str()).build()?)?;
    follow_until(&coordinator, &events, PlaybackState::Ended);
    coordinator.stop()
}

fn cmd_probe(args: &[String]) -> PlayerResult<()> {
    let Some(file) = args.first() else {
        eprintln!("usage: sonata probe <file>");
        return Ok(());
    };
    let item = probe_file(file)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&item.to_value()).unwrap_or_default()
    );
    Ok(())
}

fn cmd_scan(args: &[String]) -> PlayerResult<()> {
    let Some(dir) = args.first() else {
        eprintln!("usage: sonata scan <dir>");
        return Ok(());
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("cannot read {}: {}", dir, e);
            return Ok(());
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_audio_path(p))
        .collect();
    paths.sort();

    for path in &paths {
        match probe_file(path) {
            Ok(item) => println!(
                "  {} -- {}  {}",
                item.display_title(),
                item.artist().unwrap_or("Unknown"),
                item.duration_ms().map(fmt_time).unwrap_or_else(|| "-:--".into()),
            ),
            Err(e) => log::warn!("sonata: skipping {}: {}", path.display(), e),
        }
    }
    println!("{} audio file(s)", paths.len());
    Ok(())
}

fn cmd_states() {
    for state in PlaybackState::ALL {
        let marker = if state.is_active() { "*" } else { " " };
        println!("  {} {}", marker, state.as_str());
    }
    println!();
    println!("  * active (session kept alive)");
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[cfg(feature = "native")]
fn open_player(config: PlayerConfig) -> PlayerResult<Coordinator> {
    Coordinator::with_config(std::sync::Arc::new(sonata_core::engine::NativeEngine::default()), config)
}

#[cfg(not(feature = "native"))]
fn open_player(mut config: PlayerConfig) -> PlayerResult<Coordinator> {
    log::warn!("sonata: built without the native feature, simulating playback");
    config.simulation.fallback_duration_ms.get_or_insert(5_000);
    Coordinator::simulated(config)
}

fn attach_session(coordinator: &Coordinator) -> Option<SessionBridge> {
    match SessionBridge::attach(coordinator, LogSessionHost) {
        Ok(bridge) => Some(bridge),
        Err(e) => {
            log::warn!("sonata: no media session: {}", e);
            None
        }
    }
}

/// Print events until `target` is reached. False if the stream ended or
/// stayed quiet for 30s first.
fn follow_until(coordinator: &Coordinator, events: &Subscription, target: PlaybackState) -> bool {
    loop {
        match events.recv_timeout(Duration::from_secs(30)) {
            Some(event) => {
                print_event(&event);
                if event.state() == Some(target) {
                    return true;
                }
            }
            None => {
                eprintln!("no events for 30s (state: {})", coordinator.current_state());
                return false;
            }
        }
    }
}

fn print_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::StateChanged(state) => println!("  state: {}", state),
        PlayerEvent::ItemTransitioned { reason, item } => println!(
            "  item: {} ({:?})",
            item.as_deref().map(AudioItem::display_title).unwrap_or("none"),
            reason
        ),
    }
}

fn fmt_time(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn print_usage() {
    println!("sonata - playback coordinator CLI");
    println!();
    println!("usage: sonata <command> [args]");
    println!();
    println!("commands:");
    println!("  play <file|url> [--paused]   Play through the built-in engine");
    println!("  simulate <uri> [seconds]     Run a simulated item to the end");
    println!("  probe <file>                 Print an item's metadata as JSON");
    println!("  scan <dir>                   List audio files in a directory");
    println!("  states                       List the public playback states");
}
