use serde_json::json;

use crate::event::error::EventSystemError;
use crate::event::{Event, EventType};

#[test]
fn test_event_type_keys_round_trip_through_from_str() {
    for event_type in EventType::ALL {
        let parsed: EventType = event_type.key().parse().unwrap();
        assert_eq!(parsed, event_type);
        assert_eq!(event_type.to_string(), event_type.key());
        assert!(!event_type.description().is_empty());
    }
}

#[test]
fn test_unknown_event_type_is_rejected() {
    let err = "NotAnEvent".parse::<EventType>().unwrap_err();
    assert!(matches!(err, EventSystemError::UnknownEventType(ref name) if name == "NotAnEvent"));
}

#[test]
fn test_builder_collects_fields() {
    let event = Event::builder()
        .event_type(EventType::DownloadCompleted)
        .field("name", "Some.Movie.2023")
        .field("size", 42)
        .build()
        .unwrap();

    assert_eq!(event.event_type(), "DownloadCompleted");
    assert_eq!(event.known_type(), Some(EventType::DownloadCompleted));
    assert_eq!(event.get("name"), Some(&json!("Some.Movie.2023")));
    assert_eq!(event.get("size"), Some(&json!(42)));
}

#[test]
fn test_builder_requires_event_type() {
    assert!(matches!(
        Event::builder().field("a", 1).build(),
        Err(EventSystemError::InvalidEventData { .. })
    ));
    assert!(Event::builder().event_type("").build().is_err());
}

#[test]
fn test_custom_event_has_no_known_type() {
    let event = Event::builder().event_type("my_plugin.refresh").build().unwrap();
    assert_eq!(event.known_type(), None);
}

#[test]
fn test_to_json_contains_type_and_payload() {
    let event = Event::builder()
        .event_type(EventType::SiteError)
        .field("site", "example")
        .build()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
    assert_eq!(value["event_type"], json!("SiteError"));
    assert_eq!(value["data"]["site"], json!("example"));
}
