//! Netpane Common - Shared wire types for the network panel
//!
//! This crate contains the observer message definitions, the HAR record
//! types and the serialization helpers used by every netpane frontend.

mod har;

pub use har::{
    CompletedRecord, Content, HarFile, HarLog, HarPage, HarRequest, HarResponse, NameValue,
    PostData, PostParam,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    #[error("Failed to deserialize message: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message format")]
    InvalidFormat,
}

/// Identifier assigned by the request observer, unique per in-flight request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Observer message - the low-level request lifecycle stream
///
/// Field names follow the browser observer that produces them
/// (`requestId`, `resourceType`, `timeStamp`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObserverMessage {
    /// Sent once when the observer channel is established
    Init {
        #[serde(rename = "tabId")]
        tab_id: i64,
    },

    /// A request was observed before it was sent
    Start(RequestStart),

    /// The request completed at the network layer
    End(RequestEnd),

    /// The request failed at the network layer
    Error(RequestError),
}

/// Payload of a `start` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStart {
    pub request_id: RequestId,
    pub url: String,
    pub method: String,

    /// Resource type tag (`xmlhttprequest`, `script`, `main_frame`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub time_stamp: f64,
}

/// Payload of an `end` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnd {
    pub request_id: RequestId,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub from_cache: bool,
}

/// Payload of an `error` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestError {
    pub request_id: RequestId,
    #[serde(default)]
    pub error: String,
}

impl ObserverMessage {
    /// Serialize the message to MessagePack bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        // Named fields: the tagged representation needs maps, not arrays
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Deserialize from MessagePack bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(rmp_serde::from_slice(data)?)
    }

    /// Parse a JSON message
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Request id carried by the message, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            ObserverMessage::Init { .. } => None,
            ObserverMessage::Start(m) => Some(&m.request_id),
            ObserverMessage::End(m) => Some(&m.request_id),
            ObserverMessage::Error(m) => Some(&m.request_id),
        }
    }
}

/// Parse a JSON-lines observer log, skipping blank lines
///
/// Returns the parsed messages, or the first malformed line number with its error.
pub fn parse_observer_log(text: &str) -> Result<Vec<ObserverMessage>, (usize, ProtocolError)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| ObserverMessage::from_json(line).map_err(|e| (i + 1, e)))
        .collect()
}

/// Constants for the panel
pub mod constants {
    /// Scope resolution attempts before falling back to an unknown scope
    pub const SCOPE_RESOLVE_ATTEMPTS: u32 = 5;

    /// Fixed delay between scope resolution attempts
    pub const SCOPE_RETRY_DELAY_MS: u64 = 300;

    /// Elapsed time below which a cached response is shown as a memory cache hit
    pub const MEMORY_CACHE_THRESHOLD_MS: f64 = 10.0;

    /// URL path prefix matched by the `api` filter
    pub const API_PATH_PREFIX: &str = "/api";

    /// Default port for the inspector server
    pub const DEFAULT_INSPECTOR_PORT: u16 = 4040;

    /// Service name reported by the inspector health check
    pub const INSPECTOR_SERVICE: &str = "netpane-inspector";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_observer_start_json() {
        let json = r#"{"type":"start","requestId":"7","url":"https://x.test/api/users","method":"GET","resourceType":"xmlhttprequest","timeStamp":1700000000000.5}"#;
        let msg = ObserverMessage::from_json(json).unwrap();

        match msg {
            ObserverMessage::Start(start) => {
                assert_eq!(start.request_id, RequestId::from("7"));
                assert_eq!(start.url, "https://x.test/api/users");
                assert_eq!(start.resource_type.as_deref(), Some("xmlhttprequest"));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_parse_observer_end_and_error() {
        let end = ObserverMessage::from_json(
            r#"{"type":"end","requestId":"3","statusCode":304,"fromCache":true}"#,
        )
        .unwrap();
        assert_eq!(
            end,
            ObserverMessage::End(RequestEnd {
                request_id: "3".into(),
                status_code: 304,
                from_cache: true,
            })
        );

        let err = ObserverMessage::from_json(
            r#"{"type":"error","requestId":"4","error":"net::ERR_BLOCKED_BY_CLIENT"}"#,
        )
        .unwrap();
        assert_eq!(err.request_id(), Some(&RequestId::from("4")));
    }

    #[test]
    fn test_observer_message_msgpack() {
        let msg = ObserverMessage::Error(RequestError {
            request_id: "9".into(),
            error: "net::ERR_ABORTED".to_string(),
        });

        let bytes = msg.to_bytes().unwrap();
        assert_eq!(ObserverMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        assert!(ObserverMessage::from_json(r#"{"type":"redirect","requestId":"1"}"#).is_err());
    }

    #[test]
    fn test_parse_observer_log_reports_line() {
        let log = "{\"type\":\"init\",\"tabId\":3}\n\n{\"type\":\"start\"}\n";
        let (line, _) = parse_observer_log(log).unwrap_err();
        assert_eq!(line, 3);

        let ok = parse_observer_log("{\"type\":\"init\",\"tabId\":3}\n").unwrap();
        assert_eq!(ok, vec![ObserverMessage::Init { tab_id: 3 }]);
    }
}
