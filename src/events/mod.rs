//! Progress events
//!
//! Operation tasks publish one terminal `ProgressEvent` each. A single stream
//! consumer drains them through the `EventBroadcaster` into an `EventSink`.

pub mod broadcaster;

pub use broadcaster::{EventBroadcaster, EventPublisher};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    /// The consumer on the other side of the sink went away
    #[error("event stream closed by the receiver")]
    Closed,

    #[error("failed to send event: {0}")]
    Send(String),

    /// Every publisher and the broadcaster were dropped
    #[error("event channel closed")]
    ChannelClosed,

    /// No consumer has drained the channel and it is at capacity
    #[error("event channel full")]
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Info,
    Warning,
    Error,
}

/// Outcome of one top-level operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub operation_id: String,
    pub event_type: EventType,
    pub summary: String,
    pub details: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub component_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probable_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_remediation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    fn new(
        operation_id: impl Into<String>,
        event_type: EventType,
        summary: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            event_type,
            summary: summary.into(),
            details: details.into(),
            component: String::new(),
            component_name: String::new(),
            error_code: None,
            probable_cause: None,
            suggested_remediation: None,
            timestamp: Utc::now(),
        }
    }

    pub fn info(
        operation_id: impl Into<String>,
        summary: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::new(operation_id, EventType::Info, summary, details)
    }

    pub fn warning(
        operation_id: impl Into<String>,
        summary: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::new(operation_id, EventType::Warning, summary, details)
    }

    pub fn error(
        operation_id: impl Into<String>,
        summary: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::new(operation_id, EventType::Error, summary, details)
    }

    pub fn with_component(mut self, component: &str, component_name: &str) -> Self {
        self.component = component.to_string();
        self.component_name = component_name.to_string();
        self
    }

    pub fn with_error_code(
        mut self,
        code: impl Into<String>,
        probable_cause: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        self.error_code = Some(code.into());
        self.probable_cause = Some(probable_cause.into());
        self.suggested_remediation = Some(remediation.into());
        self
    }
}

/// Transport the stream consumer forwards events into
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: &ProgressEvent) -> Result<(), EventError>;

    /// True once the receiving side is gone and no send can succeed
    fn is_closed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_camel_case() {
        let event = ProgressEvent::error("op-1", "Error while installing NSM service mesh", "boom")
            .with_component("ADAPTER", "NETWORK_SERVICE_MESH")
            .with_error_code("1008", "chart apply failed", "check the chart");

        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["operationId"], json!("op-1"));
        assert_eq!(value["eventType"], json!("error"));
        assert_eq!(value["componentName"], json!("NETWORK_SERVICE_MESH"));
        assert_eq!(value["errorCode"], json!("1008"));
        assert_eq!(value["suggestedRemediation"], json!("check the chart"));
    }

    #[test]
    fn test_info_event_omits_error_fields() {
        let event = ProgressEvent::info("op-2", "Manifest deployed successfully", "");

        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["eventType"], json!("info"));
        assert!(value.get("errorCode").is_none());
        assert!(value.get("probableCause").is_none());

        let back: ProgressEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
