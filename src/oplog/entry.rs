//! Operation log entries
//!
//! One line per entry, fields separated by `",\t"`:
//!
//! ```text
//! <timestamp millis>,\t<request id>,\t<METHOD>[,\t<key>[,\t<value json>]]
//! ```
//!
//! The request id and key are backslash-escaped so tabs and newlines inside
//! them cannot break the framing. The value is compact JSON, which never
//! contains a raw tab or newline.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

/// Header line written at the top of every log file
pub const LOG_HEADER: &str = "Timestamp,\tRequestId,\tMethod,\tKey,\tValue\t";

/// Field separator
pub const FIELD_SEPARATOR: &str = ",\t";

/// Methods that can appear in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    All,
    Get,
    Has,
    Delete,
    Set,
    GetMany,
    SetMany,
    DeleteMany,
}

impl Method {
    /// Wire name of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::All => "ALL",
            Method::Get => "GET",
            Method::Has => "HAS",
            Method::Delete => "DELETE",
            Method::Set => "SET",
            Method::GetMany => "GET_MANY",
            Method::SetMany => "SET_MANY",
            Method::DeleteMany => "DELETE_MANY",
        }
    }

    /// Number of fields a line with this method must carry
    fn field_count(&self) -> usize {
        match self {
            Method::All => 3,
            Method::Set | Method::SetMany => 5,
            _ => 4,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(Method::All),
            "GET" => Ok(Method::Get),
            "HAS" => Ok(Method::Has),
            "DELETE" => Ok(Method::Delete),
            "SET" => Ok(Method::Set),
            "GET_MANY" => Ok(Method::GetMany),
            "SET_MANY" => Ok(Method::SetMany),
            "DELETE_MANY" => Ok(Method::DeleteMany),
            other => Err(format!("unknown method {:?}", other)),
        }
    }
}

/// A single entry in the operation log
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Unix millis when the call was recorded
    pub timestamp: u64,

    /// Client-supplied request id
    pub request_id: String,

    /// The call
    pub method: Method,

    /// Key, for keyed methods
    pub key: Option<String>,

    /// Compact JSON of the value, for SET
    pub value: Option<String>,
}

impl LogEntry {
    /// Entry without key or value (ALL)
    pub fn new(timestamp: u64, request_id: &str, method: Method) -> Self {
        Self {
            timestamp,
            request_id: request_id.to_string(),
            method,
            key: None,
            value: None,
        }
    }

    /// Entry for a keyed, value-less method (GET, HAS, DELETE)
    pub fn keyed(timestamp: u64, request_id: &str, method: Method, key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::new(timestamp, request_id, method)
        }
    }

    /// SET entry
    pub fn set(timestamp: u64, request_id: &str, key: &str, value: &Value) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::keyed(timestamp, request_id, Method::Set, key)
        }
    }

    /// Whether replay acts on this entry
    pub fn is_replayable(&self) -> bool {
        matches!(self.method, Method::Set | Method::Delete)
    }

    /// Render as one log line (without the trailing newline)
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{}{sep}{}{sep}{}",
            self.timestamp,
            escape(&self.request_id),
            self.method,
            sep = FIELD_SEPARATOR
        );
        if let Some(key) = &self.key {
            line.push_str(FIELD_SEPARATOR);
            line.push_str(&escape(key));
            if let Some(value) = &self.value {
                line.push_str(FIELD_SEPARATOR);
                line.push_str(value);
            }
        }
        line
    }

    /// Parse one log line.
    ///
    /// Fails when the timestamp or method is unreadable or the line carries
    /// fewer fields than its method needs.
    pub fn parse(line: &str) -> Result<Self, String> {
        let fields: Vec<&str> = line.splitn(5, FIELD_SEPARATOR).collect();
        if fields.len() < 3 {
            return Err(format!("expected at least 3 fields, found {}", fields.len()));
        }

        let timestamp = fields[0]
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("bad timestamp {:?}: {}", fields[0], e))?;
        let method: Method = fields[2].trim().parse()?;

        if fields.len() < method.field_count() {
            return Err(format!(
                "{} expects {} fields, found {}",
                method,
                method.field_count(),
                fields.len()
            ));
        }

        let key = if method.field_count() >= 4 {
            Some(unescape(fields[3]))
        } else {
            None
        };
        let value = if method.field_count() >= 5 {
            Some(fields[4].to_string())
        } else {
            None
        };

        Ok(Self {
            timestamp,
            request_id: unescape(fields[1]),
            method,
            key,
            value,
        })
    }
}

/// Current time as unix millis
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
