//! Response definitions
//!
//! Represents responses to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KvError, Result};

use super::MAX_PAYLOAD_SIZE;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Error = 0x02,
    Unauthorized = 0x03,
}

/// A response to send to client
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (JSON body, or PONG for pings)
    pub payload: Option<Vec<u8>>,
}

/// JSON body of a response to a REQUEST frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    /// Id of the request this answers (absent if it could not be read)
    pub request_id: Option<String>,

    /// Result of the call (`null` for absent values and on error)
    #[serde(default)]
    pub data: Value,

    /// Error message, if the call failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseBody {
    /// Whether the call succeeded
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create an ERROR response with a plain message
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Create an UNAUTHORIZED response
    pub fn unauthorized() -> Self {
        Self {
            status: Status::Unauthorized,
            payload: None,
        }
    }

    /// OK response carrying `{requestId, data}`
    ///
    /// Falls back to an ERROR body when the encoded data would not fit in
    /// one frame, so the client never sees an oversized payload.
    pub fn data(request_id: &str, data: Value) -> Self {
        let body = ResponseBody {
            request_id: Some(request_id.to_string()),
            data,
            error: None,
        };
        let response = Self::with_body(Status::Ok, &body);
        if response.payload_len() > MAX_PAYLOAD_SIZE as usize {
            tracing::warn!(
                request_id,
                size = response.payload_len(),
                "Response exceeds frame limit"
            );
            return Self::failure(
                Some(request_id),
                &KvError::Protocol("response too large".to_string()),
            );
        }
        response
    }

    /// ERROR response carrying `{requestId, error}`
    pub fn failure(request_id: Option<&str>, error: &KvError) -> Self {
        let body = ResponseBody {
            request_id: request_id.map(str::to_string),
            data: Value::Null,
            error: Some(error.to_string()),
        };
        Self::with_body(Status::Error, &body)
    }

    /// Payload length in bytes (0 when there is none)
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }

    /// Decode the JSON body of a REQUEST response
    pub fn body(&self) -> Result<ResponseBody> {
        let payload = self
            .payload
            .as_deref()
            .ok_or_else(|| KvError::Protocol("Response has no body".to_string()))?;
        Ok(serde_json::from_slice(payload)?)
    }

    fn with_body(status: Status, body: &ResponseBody) -> Self {
        match serde_json::to_vec(body) {
            Ok(payload) => Self {
                status,
                payload: Some(payload),
            },
            Err(e) => Self::error(&format!("Failed to encode response: {}", e)),
        }
    }
}
