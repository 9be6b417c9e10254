use crate::error::{HeraldError, HeraldResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The set of recipients a run should deliver to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audience {
    /// Recipient identifiers (addresses, phone numbers, user ids).
    pub recipients: Vec<String>,
    /// Optional identifier of a saved recipient segment.
    #[serde(default)]
    pub segment_id: Option<String>,
}

impl Audience {
    /// Creates an audience, rejecting an empty recipient list.
    pub fn new(recipients: Vec<String>) -> HeraldResult<Self> {
        if recipients.is_empty() {
            return Err(HeraldError::State(
                "Audience requires at least one recipient".to_string(),
            ));
        }
        Ok(Self {
            recipients,
            segment_id: None,
        })
    }

    /// Sets the segment identifier.
    pub fn with_segment(mut self, segment_id: impl Into<String>) -> Self {
        self.segment_id = Some(segment_id.into());
        self
    }
}

/// Immutable structured input for one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Unique identifier for the request; generated when absent.
    #[serde(default = "generated_request_id")]
    pub request_id: String,
    /// High-level user intent inferred upstream.
    pub intent: String,
    /// Requested connector / plugin name (e.g. whatsapp, email).
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Optional delivery audience. When present, never empty.
    #[serde(default)]
    pub audience: Option<Audience>,
    /// Open key/value payload for templating and plugin dispatch.
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Open key/value metadata (tenant, priority, workflow pin, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn generated_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_channel() -> String {
    "demo".to_string()
}

impl TaskRequest {
    /// Creates a request for the given intent with a generated id and the
    /// default channel.
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            request_id: generated_request_id(),
            intent: intent.into(),
            channel: default_channel(),
            audience: None,
            payload: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Sets the delivery channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sets the audience.
    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Inserts a payload entry.
    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Inserts a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a metadata value as a trimmed non-empty string, if present.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
