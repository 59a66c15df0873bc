//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! Both directions share one frame layout:
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Client Payloads
//! - AUTH:    token bytes (UTF-8)
//! - REQUEST: JSON request
//! - PING:    empty
//! - STATS:   empty
//!
//! ### Server Payloads
//! - OK / ERROR: JSON `{requestId, data | error}` (PING answers `PONG`)
//! - UNAUTHORIZED: empty

use std::io::{Read, Write};

use crate::error::{KvError, Result};

use super::{ClientFrame, Response, Status};

/// Header size: 1 byte kind/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Client Frame Encoding/Decoding
// =============================================================================

/// Encode a client frame to bytes
pub fn encode_frame(frame: &ClientFrame) -> Vec<u8> {
    let payload: &[u8] = match frame {
        ClientFrame::Auth { token } => token.as_bytes(),
        ClientFrame::Request { payload } => payload,
        ClientFrame::Ping | ClientFrame::Stats => &[],
    };
    frame_bytes(frame.kind() as u8, payload)
}

/// Decode a client frame from bytes
pub fn decode_frame(bytes: &[u8]) -> Result<ClientFrame> {
    let (kind, payload) = split_frame(bytes, "frame")?;

    match kind {
        0x01 => {
            let token = String::from_utf8(payload.to_vec())
                .map_err(|_| KvError::Protocol("AUTH frame: token is not UTF-8".to_string()))?;
            Ok(ClientFrame::Auth { token })
        }
        0x02 => Ok(ClientFrame::Request {
            payload: payload.to_vec(),
        }),
        0x03 => expect_empty(payload, "PING").map(|_| ClientFrame::Ping),
        0x04 => expect_empty(payload, "STATS").map(|_| ClientFrame::Stats),
        _ => Err(KvError::Protocol(format!(
            "Unknown frame type: 0x{:02x}",
            kind
        ))),
    }
}

fn expect_empty(payload: &[u8], name: &str) -> Result<()> {
    if !payload.is_empty() {
        return Err(KvError::Protocol(format!(
            "{} frame: unexpected payload of {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame_bytes(response.status as u8, payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, "response")?;

    let status = match status_byte {
        0x00 => Status::Ok,
        0x02 => Status::Error,
        0x03 => Status::Unauthorized,
        _ => {
            return Err(KvError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete client frame from a stream
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_frame<R: Read>(reader: &mut R) -> Result<ClientFrame> {
    let message = read_message(reader)?;
    decode_frame(&message)
}

/// Write a client frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, frame: &ClientFrame) -> Result<()> {
    writer.write_all(&encode_frame(frame))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let message = read_message(reader)?;
    decode_response(&message)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Private Helpers
// =============================================================================

fn frame_bytes(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.push(kind);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(payload);
    message
}

/// Validate the header and return (kind, payload)
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(KvError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let payload_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    check_payload_len(payload_len)?;

    let total_len = HEADER_SIZE + payload_len as usize;
    if bytes.len() < total_len {
        return Err(KvError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..total_len]))
}

fn check_payload_len(payload_len: u32) -> Result<()> {
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(KvError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(())
}

/// Read header + payload off the stream into one buffer
fn read_message<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    check_payload_len(payload_len)?;

    let mut message = vec![0u8; HEADER_SIZE + payload_len as usize];
    message[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut message[HEADER_SIZE..])?;

    Ok(message)
}
