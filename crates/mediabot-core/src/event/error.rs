//! # Mediabot Core Event System Errors
//!
//! Defines error types specific to the event bus.
//!
//! [`EventSystemError::ListenerExecution`] is only ever logged: a failing
//! listener never propagates its error to the publisher.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventSystemError {
    #[error("Listener{} failed while handling '{event_type}': {message}", .plugin.as_deref().map(|p| format!(" of plugin '{}'", p)).unwrap_or_default())]
    ListenerExecution {
        event_type: String,
        plugin: Option<String>,
        message: String,
    },

    #[error("Unknown event type '{0}'")]
    UnknownEventType(String),

    #[error("Invalid event data for event '{event_name}': {details}")]
    InvalidEventData {
        event_name: String,
        details: String,
    },

    #[error("Event bus is stopped; background publish of '{event_type}' rejected")]
    DispatcherStopped { event_type: String },

    #[error("Internal event system error: {0}")]
    InternalError(String),
}
