//! Change notification payloads and broker deliveries.

use std::fmt;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::events::BrokerError;

/// Kind of change a notification announces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Create,
    Update,
    Delete,
    /// Any event type this process does not act on.
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMessage {
    #[serde(alias = "subjectID")]
    pub subject_id: String,

    #[serde(default, alias = "additionalSubjectIDs")]
    pub additional_subject_ids: Vec<String>,

    #[serde(alias = "eventType")]
    pub event_type: EventType,
}

impl ChangeMessage {
    pub fn new(subject_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            subject_id: subject_id.into(),
            additional_subject_ids: Vec::new(),
            event_type,
        }
    }

    pub fn with_additional_subjects<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_subject_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Primary subject followed by the additional subjects.
    pub fn subject_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.subject_id.as_str())
            .chain(self.additional_subject_ids.iter().map(String::as_str))
    }
}

/// Settles a delivery with the broker.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Ask for redelivery after `delay`.
    async fn nak(&self, delay: Duration) -> Result<(), BrokerError>;

    /// Give up on the message; it is never redelivered.
    async fn term(&self) -> Result<(), BrokerError>;
}

/// A single delivery of a change notification.
pub struct ChangeEvent {
    pub id: String,
    pub topic: String,
    pub source: String,
    pub timestamp: SystemTime,
    /// Times this message has been delivered, including this delivery.
    pub deliveries: u64,
    pub payload: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl ChangeEvent {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            source: String::new(),
            timestamp: SystemTime::now(),
            deliveries: 1,
            payload,
            acker,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_deliveries(mut self, deliveries: u64) -> Self {
        self.deliveries = deliveries;
        self
    }

    /// Decode the payload as a [`ChangeMessage`].
    pub fn decode(&self) -> Result<ChangeMessage, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Seconds since the unix epoch, for log fields.
    pub fn unix_timestamp(&self) -> u64 {
        self.timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    pub async fn nak(&self, delay: Duration) -> Result<(), BrokerError> {
        self.acker.nak(delay).await
    }

    pub async fn term(&self) -> Result<(), BrokerError> {
        self.acker.term().await
    }
}

impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("source", &self.source)
            .field("deliveries", &self.deliveries)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_change_message() {
        let raw = r#"{
            "subject_id": "loadprt-abc",
            "additional_subject_ids": ["loadbal-1", "loadpol-2"],
            "event_type": "update"
        }"#;

        let msg: ChangeMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.subject_id, "loadprt-abc");
        assert_eq!(msg.event_type, EventType::Update);
        assert_eq!(
            msg.subject_ids().collect::<Vec<_>>(),
            vec!["loadprt-abc", "loadbal-1", "loadpol-2"]
        );
    }

    #[test]
    fn test_decode_camel_case_and_missing_additional() {
        let raw = r#"{"subjectID": "loadbal-1", "eventType": "delete"}"#;

        let msg: ChangeMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg, ChangeMessage::new("loadbal-1", EventType::Delete));
    }

    #[test]
    fn test_unknown_event_type_is_preserved() {
        let msg: ChangeMessage =
            serde_json::from_str(r#"{"subject_id": "loadbal-1", "event_type": "resize"}"#).unwrap();
        assert_eq!(msg.event_type, EventType::Other("resize".to_string()));

        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(encoded["event_type"], "resize");
    }

    #[test]
    fn test_missing_subject_is_error() {
        assert!(serde_json::from_str::<ChangeMessage>(r#"{"event_type": "create"}"#).is_err());
    }
}
