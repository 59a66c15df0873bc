//! Request definitions
//!
//! JSON requests sent inside REQUEST frames, and their validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KvError;
use crate::manager::validate_store_path;

/// A key/value pair in a SET_MANY request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

/// A store call, tagged by `method`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Every key/value in the store
    All,

    /// Whether a key exists
    Has { key: String },

    /// Value of a key
    Get { key: String },

    /// Remove a key
    Delete { key: String },

    /// Store a value
    Set { key: String, value: Value },

    /// Values of several keys
    GetMany { keys: Vec<String> },

    /// Store several values
    SetMany { data: Vec<KeyValue> },

    /// Remove several keys
    DeleteMany { keys: Vec<String> },

    /// Append to an array
    Push { key: String, value: Value },

    /// Remove the last array element
    Pop { key: String },

    /// Remove the first array element
    Shift { key: String },

    /// Prepend to an array
    Unshift { key: String, value: Value },

    /// Copy part of an array
    Slice {
        key: String,
        start: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<i64>,
    },
}

impl Command {
    /// Wire name of the method
    pub fn method_name(&self) -> &'static str {
        match self {
            Command::All => "ALL",
            Command::Has { .. } => "HAS",
            Command::Get { .. } => "GET",
            Command::Delete { .. } => "DELETE",
            Command::Set { .. } => "SET",
            Command::GetMany { .. } => "GET_MANY",
            Command::SetMany { .. } => "SET_MANY",
            Command::DeleteMany { .. } => "DELETE_MANY",
            Command::Push { .. } => "PUSH",
            Command::Pop { .. } => "POP",
            Command::Shift { .. } => "SHIFT",
            Command::Unshift { .. } => "UNSHIFT",
            Command::Slice { .. } => "SLICE",
        }
    }
}

/// A parsed and validated request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Store path, relative to the storage root
    pub path: String,

    /// Client-chosen id echoed back in the response
    pub request_id: String,

    /// The call
    #[serde(flatten)]
    pub command: Command,
}

/// A request that failed validation, with whatever id could be recovered
#[derive(Debug)]
pub struct RequestError {
    pub request_id: Option<String>,
    pub error: KvError,
}

impl Request {
    /// Build a request
    pub fn new(path: impl Into<String>, request_id: impl Into<String>, command: Command) -> Self {
        Self {
            path: path.into(),
            request_id: request_id.into(),
            command,
        }
    }

    /// Parse and validate a JSON request.
    ///
    /// Errors carry the request id when the payload has a string `requestId`,
    /// so the caller can tag the error response.
    pub fn from_json(bytes: &[u8]) -> Result<Self, RequestError> {
        let raw: Value = serde_json::from_slice(bytes).map_err(|e| RequestError {
            request_id: None,
            error: KvError::InvalidRequest(format!("Malformed JSON: {}", e)),
        })?;

        let request_id = raw
            .get("requestId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let reject = |error: KvError| RequestError {
            request_id: request_id.clone(),
            error,
        };

        let Some(object) = raw.as_object() else {
            return Err(reject(KvError::InvalidRequest(
                "Request must be a JSON object".to_string(),
            )));
        };
        for field in ["path", "requestId", "method"] {
            match object.get(field) {
                None => return Err(reject(KvError::InvalidRequest(format!("Missing {}", field)))),
                Some(Value::String(_)) => {}
                Some(_) => return Err(reject(KvError::InvalidRequest(format!("Invalid {}", field)))),
            }
        }

        let mut request: Request = serde_json::from_value(raw.clone())
            .map_err(|e| reject(KvError::InvalidRequest(e.to_string())))?;

        request.path = validate_store_path(&request.path).map_err(reject)?;
        Ok(request)
    }

    /// Serialize to JSON bytes
    pub fn to_json(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
