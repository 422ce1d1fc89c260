//! The playable resource handed to the coordinator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PlayerError, PlayerResult};

/// How the engine should interpret the item's URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Progressive file or stream.
    #[default]
    Default,
    Dash,
    Hls,
    SmoothStreaming,
}

/// Request options for remote sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AudioItemOptions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<i64>,
}

/// One playable resource: a locator plus optional display metadata.
///
/// Immutable once built. The coordinator keeps it behind an `Arc` and hands
/// the same allocation to the engine and to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioItem {
    uri: String,
    #[serde(default)]
    source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    album_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artwork: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    #[serde(default)]
    options: AudioItemOptions,
}

impl AudioItem {
    pub fn builder(uri: impl Into<String>) -> AudioItemBuilder {
        AudioItemBuilder {
            item: AudioItem {
                uri: uri.into(),
                source_type: SourceType::Default,
                title: None,
                artist: None,
                album_title: None,
                artwork: None,
                duration_ms: None,
                options: AudioItemOptions::default(),
            },
        }
    }

    /// Parse an item from JSON, applying the same checks as the builder.
    pub fn from_value(v: &Value) -> PlayerResult<Self> {
        let item: AudioItem = serde_json::from_value(v.clone())
            .map_err(|e| PlayerError::InvalidArgument(format!("audio item: {}", e)))?;
        item.validate()?;
        Ok(item)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn validate(&self) -> PlayerResult<()> {
        if self.uri.trim().is_empty() {
            return Err(PlayerError::InvalidArgument("audio item uri is empty".into()));
        }
        Ok(())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn album_title(&self) -> Option<&str> {
        self.album_title.as_deref()
    }

    pub fn artwork(&self) -> Option<&str> {
        self.artwork.as_deref()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    pub fn options(&self) -> &AudioItemOptions {
        &self.options
    }

    /// Title for display, falling back to the last URI segment.
    pub fn display_title(&self) -> &str {
        match self.title() {
            Some(t) => t,
            None => self
                .uri
                .rsplit(['/', '\\'])
                .find(|s| !s.is_empty())
                .unwrap_or(&self.uri),
        }
    }
}

/// Consuming builder for [`AudioItem`].
#[derive(Debug, Clone)]
pub struct AudioItemBuilder {
    item: AudioItem,
}

impl AudioItemBuilder {
    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.item.source_type = source_type;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.item.title = Some(title.into());
        self
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.item.artist = Some(artist.into());
        self
    }

    pub fn album_title(mut self, album_title: impl Into<String>) -> Self {
        self.item.album_title = Some(album_title.into());
        self
    }

    pub fn artwork(mut self, artwork: impl Into<String>) -> Self {
        self.item.artwork = Some(artwork.into());
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.item.duration_ms = Some(duration_ms);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.item.options.headers.insert(name.into(), value.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.item.options.user_agent = Some(user_agent.into());
        self
    }

    pub fn resource_id(mut self, resource_id: i64) -> Self {
        self.item.options.resource_id = Some(resource_id);
        self
    }

    pub fn build(self) -> PlayerResult<AudioItem> {
        self.item.validate()?;
        Ok(self.item)
    }
}
