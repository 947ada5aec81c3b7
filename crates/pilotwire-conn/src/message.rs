//! Envelope types for the driver protocol.
//!
//! Every frame payload is a single JSON object. Outbound traffic is always a
//! [`CallFrame`]. Inbound traffic is decoded permissively into a [`RawFrame`]
//! and then classified by field presence, in this order:
//!
//! * `id` present: a result for one of our calls,
//! * `type` present: an object-creation notification,
//! * `method` present: an event,
//! * only `guid` present: an object-disposal notification.
//!
//! Anything else is a protocol violation and tears the connection down.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConnError;

/// An outbound call: `{id, guid, method, params}` plus optional metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    pub id: u64,
    pub guid: String,
    pub method: String,
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CallMetadata>,
}

impl CallFrame {
    pub fn new(
        id: u64,
        guid: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        CallFrame {
            id,
            guid: guid.into(),
            method: method.into(),
            params,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: CallMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Optional per-call annotations, forwarded verbatim to the driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallMetadata {
    /// User-facing API name for driver-side logging and tracing.
    #[serde(rename = "apiName", default, skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    /// Marks calls issued by the library itself rather than by user code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<bool>,
}

/// An error reported by the driver for a single call.
///
/// Never terminal: it settles exactly one pending call and the connection
/// keeps running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Permissive decode of one inbound envelope. All fields optional; the
/// combination present decides the message kind via [`RawFrame::classify`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFrame {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub initializer: Option<serde_json::Value>,
    #[serde(rename = "parentGuid", default)]
    pub parent_guid: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// A classified inbound message.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Settles the pending call with the matching id.
    Result {
        id: u64,
        result: Option<serde_json::Value>,
        error: Option<RemoteError>,
    },
    /// A new remote object; `parent_guid` of `""` parents it under the root.
    Create {
        guid: String,
        object_type: String,
        initializer: serde_json::Value,
        parent_guid: String,
    },
    /// An event on an existing object.
    Event {
        guid: String,
        method: String,
        params: serde_json::Value,
    },
    /// The object and its entire subtree go away.
    Dispose { guid: String },
}

impl RawFrame {
    pub fn classify(self) -> Result<Incoming, ConnError> {
        if let Some(id) = self.id {
            return Ok(Incoming::Result {
                id,
                result: self.result,
                error: self.error,
            });
        }
        if let Some(object_type) = self.object_type {
            let guid = self
                .guid
                .ok_or_else(|| ConnError::protocol("object creation without guid"))?;
            return Ok(Incoming::Create {
                guid,
                object_type,
                initializer: self.initializer.unwrap_or(serde_json::Value::Null),
                parent_guid: self.parent_guid.unwrap_or_default(),
            });
        }
        if let Some(method) = self.method {
            let guid = self
                .guid
                .ok_or_else(|| ConnError::protocol("event without guid"))?;
            return Ok(Incoming::Event {
                guid,
                method,
                params: self.params.unwrap_or(serde_json::Value::Null),
            });
        }
        if let Some(guid) = self.guid {
            return Ok(Incoming::Dispose { guid });
        }
        Err(ConnError::protocol("envelope matches no message kind"))
    }
}
