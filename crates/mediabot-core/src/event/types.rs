use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::error::EventSystemError;

/// Payload carried by an event
pub type EventData = Map<String, Value>;

/// Events raised by the application itself.
///
/// The stable key of each variant is its name, which is what listeners bind
/// to. Plugins may also publish and listen to custom event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A movie or series was subscribed
    SubMedia,
    DeleteSubMedia,
    /// A download was accepted by a download client
    DownloadStart,
    /// A download finished
    DownloadCompleted,
    /// A site needs manual attention
    SiteError,
    EmbyPlaybackStart,
    EmbyPlaybackPause,
    EmbyPlaybackUnpause,
    EmbyPlaybackStop,
    EmbyLibraryNew,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        EventType::SubMedia,
        EventType::DeleteSubMedia,
        EventType::DownloadStart,
        EventType::DownloadCompleted,
        EventType::SiteError,
        EventType::EmbyPlaybackStart,
        EventType::EmbyPlaybackPause,
        EventType::EmbyPlaybackUnpause,
        EventType::EmbyPlaybackStop,
        EventType::EmbyLibraryNew,
    ];

    /// Stable string key listeners bind to
    pub fn key(&self) -> &'static str {
        match self {
            EventType::SubMedia => "SubMedia",
            EventType::DeleteSubMedia => "DeleteSubMedia",
            EventType::DownloadStart => "DownloadStart",
            EventType::DownloadCompleted => "DownloadCompleted",
            EventType::SiteError => "SiteError",
            EventType::EmbyPlaybackStart => "EmbyPlaybackStart",
            EventType::EmbyPlaybackPause => "EmbyPlaybackPause",
            EventType::EmbyPlaybackUnpause => "EmbyPlaybackUnpause",
            EventType::EmbyPlaybackStop => "EmbyPlaybackStop",
            EventType::EmbyLibraryNew => "EmbyLibraryNew",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EventType::SubMedia => "Media subscribed",
            EventType::DeleteSubMedia => "Media subscription deleted",
            EventType::DownloadStart => "Download started",
            EventType::DownloadCompleted => "Download completed",
            EventType::SiteError => "Site error",
            EventType::EmbyPlaybackStart => "Emby playback started",
            EventType::EmbyPlaybackPause => "Emby playback paused",
            EventType::EmbyPlaybackUnpause => "Emby playback resumed",
            EventType::EmbyPlaybackStop => "Emby playback stopped",
            EventType::EmbyLibraryNew => "Emby library item added",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EventType {
    type Err = EventSystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.key() == s)
            .ok_or_else(|| EventSystemError::UnknownEventType(s.to_string()))
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.key().to_string()
    }
}

/// An event published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    event_type: String,
    data: EventData,
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: EventData) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn builder() -> EventBuilder {
        EventBuilder::default()
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// The catalog entry for this event, if it is not a custom event
    pub fn known_type(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// Compact JSON form used in log lines
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"event_type\":\"{}\"}}", self.event_type))
    }
}

/// Incremental construction of an [`Event`]
#[derive(Debug, Clone, Default)]
pub struct EventBuilder {
    event_type: Option<String>,
    data: EventData,
}

impl EventBuilder {
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Replace the whole payload
    pub fn data(mut self, data: EventData) -> Self {
        self.data = data;
        self
    }

    /// Add one payload entry
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Event, EventSystemError> {
        let event_type = self
            .event_type
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EventSystemError::InvalidEventData {
                event_name: String::new(),
                details: "event type is required".to_string(),
            })?;
        Ok(Event {
            event_type,
            data: self.data,
        })
    }
}
