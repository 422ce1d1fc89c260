//! Sonata data models.
//!
//! Items are immutable and shared by reference. States and reasons are small
//! string enums so they serialize to plain strings for FFI consumers.

pub mod event;
pub mod item;
pub mod playback;

pub use event::PlayerEvent;
pub use item::{AudioItem, AudioItemBuilder, AudioItemOptions, SourceType};
pub use playback::{PlaybackState, TimeUnit, TransitionReason};
