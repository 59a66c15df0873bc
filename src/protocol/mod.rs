//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Client Frames
//! - 0x01: AUTH     - Payload: token
//! - 0x02: REQUEST  - Payload: JSON `{path, requestId, method, ...}`
//! - 0x03: PING     - Payload: empty
//! - 0x04: STATS    - Payload: empty
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x02: ERROR
//! - 0x03: UNAUTHORIZED

mod codec;
mod frame;
mod request;
mod response;

pub use codec::{
    decode_frame, decode_response, encode_frame, encode_response, read_frame, read_response,
    write_frame, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use frame::{ClientFrame, FrameKind};
pub use request::{Command, KeyValue, Request, RequestError};
pub use response::{Response, ResponseBody, Status};
