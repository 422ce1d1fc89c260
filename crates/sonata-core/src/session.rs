//! Notification / media-session side.
//!
//! The host that renders notifications or answers remote-control requests
//! lives outside this crate. [`SessionBridge`] keeps it in sync with a
//! coordinator: it creates the notification channel once, pushes a
//! [`NowPlaying`] snapshot for every event, and clears the session when the
//! coordinator stops.

use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::coordinator::{Coordinator, StatusView};
use crate::error::{log_err, PlayerResult};
use crate::models::{AudioItem, PlaybackState, PlayerEvent};
use crate::publisher::SubscriptionId;

/// Notification id used for the playback notification.
pub const NOTIFICATION_ID: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelImportance {
    Min,
    Low,
    Default,
    High,
}

/// Notification channel the host registers before the first update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: ChannelImportance,
    pub sound: bool,
}

impl NotificationChannel {
    /// The quiet channel used for playback controls.
    pub fn playback() -> Self {
        Self {
            id: "sonata_player".to_string(),
            name: "Playback".to_string(),
            description: "Used when playing music".to_string(),
            importance: ChannelImportance::Low,
            sound: false,
        }
    }
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::playback()
    }
}

/// Display metadata for the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork: Option<String>,
    pub state: PlaybackState,
}

impl NowPlaying {
    /// Snapshot of what `status` currently reports.
    pub fn from_status(status: &StatusView) -> Self {
        Self::describe(status.current_item().as_deref(), status.current_state())
    }

    /// What to show for `item` in `state`.
    pub fn describe(item: Option<&AudioItem>, state: PlaybackState) -> Self {
        match item {
            Some(item) => Self {
                title: Some(item.display_title().to_string()),
                artist: item.artist().map(str::to_string),
                album: item.album_title().map(str::to_string),
                artwork: item.artwork().map(str::to_string),
                state,
            },
            None => Self {
                state,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("notification channel rejected: {0}")]
    Channel(String),
    #[error("session host unavailable: {0}")]
    Unavailable(String),
}

/// External notification / media-session host.
pub trait SessionHost: Send + Sync {
    /// Register `channel`. Returns the id the host assigned.
    fn create_channel(&self, channel: &NotificationChannel) -> Result<String, SessionError>;
    fn update(&self, now_playing: &NowPlaying) -> Result<(), SessionError>;
    fn set_active(&self, active: bool) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// Host that writes everything to the log.
#[derive(Debug, Default)]
pub struct LogSessionHost;

impl SessionHost for LogSessionHost {
    fn create_channel(&self, channel: &NotificationChannel) -> Result<String, SessionError> {
        log::info!(
            "sonata: notification channel {} ({:?}, sound={})",
            channel.id,
            channel.importance,
            channel.sound
        );
        Ok(channel.id.clone())
    }

    fn update(&self, now_playing: &NowPlaying) -> Result<(), SessionError> {
        log::info!(
            "sonata: [{}] {} {} - {}",
            NOTIFICATION_ID,
            now_playing.state,
            now_playing.artist.as_deref().unwrap_or("unknown artist"),
            now_playing.title.as_deref().unwrap_or("untitled"),
        );
        Ok(())
    }

    fn set_active(&self, active: bool) -> Result<(), SessionError> {
        log::info!("sonata: session active={}", active);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        log::info!("sonata: session cleared");
        Ok(())
    }
}

/// Keeps a [`SessionHost`] in sync with one coordinator.
///
/// Dropping the bridge detaches it and clears the host.
pub struct SessionBridge {
    status: StatusView,
    subscription: SubscriptionId,
    channel_id: String,
    worker: Option<JoinHandle<()>>,
}

impl SessionBridge {
    pub fn attach<H>(coordinator: &Coordinator, host: H) -> PlayerResult<Self>
    where
        H: SessionHost + 'static,
    {
        let channel = coordinator.config().notification.clone();
        Self::attach_with_channel(coordinator, host, &channel)
    }

    pub fn attach_with_channel<H>(
        coordinator: &Coordinator,
        host: H,
        channel: &NotificationChannel,
    ) -> PlayerResult<Self>
    where
        H: SessionHost + 'static,
    {
        let status = coordinator.status();
        let subscription = status.subscribe()?;
        let subscription_id = subscription.id();

        let channel_id = match host.create_channel(channel) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("sonata: create notification channel failed: {}", e);
                channel.id.clone()
            }
        };

        let view = status.clone();
        let worker = thread::Builder::new()
            .name("sonata-session".to_string())
            .spawn(move || {
                let mut active = false;
                for event in subscription {
                    if let PlayerEvent::StateChanged(state) = event {
                        let playing = state == PlaybackState::Playing;
                        if playing != active {
                            active = playing;
                            log_err(host.set_active(active), "session set_active");
                        }
                    }
                    // The event, not the live view, says which state this update is for.
                    let now_playing = match &event {
                        PlayerEvent::StateChanged(state) => {
                            NowPlaying::describe(view.current_item().as_deref(), *state)
                        }
                        PlayerEvent::ItemTransitioned { item, .. } => {
                            NowPlaying::describe(item.as_deref(), view.current_state())
                        }
                    };
                    log_err(host.update(&now_playing), "session update");
                }
                log_err(host.clear(), "session clear");
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("sonata: failed to spawn session thread: {}", e);
                status.events().unsubscribe(subscription_id);
                None
            }
        };

        Ok(Self {
            status,
            subscription: subscription_id,
            channel_id,
            worker,
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Snapshot the host would show right now.
    pub fn now_playing(&self) -> NowPlaying {
        NowPlaying::from_status(&self.status)
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        self.status.events().unsubscribe(self.subscription);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
