//! Event subsystem for engine lifecycle notifications.
//!
//! Every durable state change emits an [`Event`] after its transaction
//! commits. The [`EventEmitter`] facade dispatches to all configured
//! channels and logs failures without aborting the operation that emitted.

pub mod webhook;

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::EventConfig;
use crate::errors::EventError;

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Topic names carried by every event.
pub mod topics {
    pub const VERSION_CREATED: &str = "version_created";
    pub const BRANCH_CREATED: &str = "branch_created";
    pub const MERGE_REQUEST_CREATED: &str = "merge_request_created";
    pub const CONFLICTS_RESOLVED: &str = "conflicts_resolved";
    pub const BRANCHES_MERGED: &str = "branches_merged";
    pub const MERGE_REQUEST_CLOSED: &str = "merge_request_closed";
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A single engine lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Topic name, one of [`topics`].
    pub topic: String,

    /// Campaign the event belongs to, where applicable.
    pub campaign_id: Option<String>,

    /// Topic-specific payload.
    pub payload: Value,

    /// When the event was emitted.
    pub emitted_at: DateTime<Utc>,
}

impl Event {
    /// Construct an event stamped with the current time.
    pub fn new(topic: &str, campaign_id: Option<&str>, payload: Value) -> Self {
        Self {
            topic: topic.to_string(),
            campaign_id: campaign_id.map(str::to_string),
            payload,
            emitted_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Publisher channels
// ---------------------------------------------------------------------------

/// A channel that can deliver engine events.
pub trait EventPublisher: Send + Sync {
    /// Channel name used in failure logs.
    fn name(&self) -> &str;

    /// Deliver one event.
    fn publish(&self, event: &Event) -> Result<(), EventError>;
}

/// Channel that logs every event through `tracing`.
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn name(&self) -> &str {
        "tracing"
    }

    fn publish(&self, event: &Event) -> Result<(), EventError> {
        info!(
            topic = %event.topic,
            campaign_id = event.campaign_id.as_deref().unwrap_or("-"),
            payload = %event.payload,
            "event"
        );
        Ok(())
    }
}

/// Channel that records events in memory. Intended for tests and for
/// embedding callers that want to drain events themselves.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn recorded(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Topics recorded so far, in emission order.
    pub fn topics(&self) -> Vec<String> {
        self.recorded().into_iter().map(|e| e.topic).collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    fn publish(&self, event: &Event) -> Result<(), EventError> {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Unified emitter that dispatches each event to all configured channels.
///
/// Delivery is best-effort: a failing channel is logged with its name and
/// error, and never propagates back to the caller.
#[derive(Default)]
pub struct EventEmitter {
    channels: Vec<Box<dyn EventPublisher>>,
}

impl EventEmitter {
    /// An emitter with no channels. Events are dropped silently.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an emitter from the event configuration: a tracing channel is
    /// always attached, plus a webhook channel when a URL is resolved.
    pub fn from_config(config: &EventConfig) -> Self {
        let mut emitter = Self::new();
        emitter.add_channel(Box::new(TracingPublisher));

        if let Some(ref url) = config.webhook_url {
            match webhook::WebhookPublisher::new(
                url.clone(),
                config.webhook_secret.clone(),
                Duration::from_secs(config.timeout_secs),
            ) {
                Ok(publisher) => {
                    info!("webhook event channel enabled");
                    emitter.add_channel(Box::new(publisher));
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "failed to initialize webhook channel; continuing without it"
                    );
                }
            }
        }

        emitter
    }

    /// Attach a channel.
    pub fn add_channel(&mut self, channel: Box<dyn EventPublisher>) {
        self.channels.push(channel);
    }

    /// Number of attached channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Dispatch one event to every channel.
    pub fn emit(&self, event: Event) {
        for channel in &self.channels {
            if let Err(e) = channel.publish(&event) {
                warn!(
                    channel = channel.name(),
                    topic = %event.topic,
                    error = %e,
                    "event delivery failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    struct FailingPublisher;

    impl EventPublisher for FailingPublisher {
        fn name(&self) -> &str {
            "failing"
        }

        fn publish(&self, _event: &Event) -> Result<(), EventError> {
            Err(EventError::WebhookRejected {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    struct SharedRecorder(Arc<RecordingPublisher>);

    impl EventPublisher for SharedRecorder {
        fn name(&self) -> &str {
            "recording"
        }

        fn publish(&self, event: &Event) -> Result<(), EventError> {
            self.0.publish(event)
        }
    }

    #[test]
    fn test_emit_records_events() {
        let recorder = Arc::new(RecordingPublisher::new());
        let mut emitter = EventEmitter::new();
        emitter.add_channel(Box::new(SharedRecorder(recorder.clone())));

        emitter.emit(Event::new(
            topics::VERSION_CREATED,
            Some("camp-1"),
            json!({"version_hash": "abc"}),
        ));

        let recorded = recorder.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].topic, topics::VERSION_CREATED);
        assert_eq!(recorded[0].campaign_id.as_deref(), Some("camp-1"));
        assert_eq!(recorded[0].payload["version_hash"], "abc");
    }

    #[test]
    fn test_failed_channel_does_not_block_others() {
        let recorder = Arc::new(RecordingPublisher::new());
        let mut emitter = EventEmitter::new();
        emitter.add_channel(Box::new(FailingPublisher));
        emitter.add_channel(Box::new(SharedRecorder(recorder.clone())));

        emitter.emit(Event::new(topics::BRANCH_CREATED, Some("camp-1"), json!({})));

        // Delivery continues past the failing channel.
        assert_eq!(recorder.topics(), vec![topics::BRANCH_CREATED.to_string()]);
    }

    #[test]
    fn test_emitter_without_channels_drops_events() {
        let emitter = EventEmitter::new();
        emitter.emit(Event::new(topics::BRANCHES_MERGED, None, json!({})));
        assert_eq!(emitter.channel_count(), 0);
    }

    #[test]
    fn test_from_config_without_webhook_has_tracing_only() {
        let config = EventConfig::default();
        let emitter = EventEmitter::from_config(&config);
        assert_eq!(emitter.channel_count(), 1);
    }
}
