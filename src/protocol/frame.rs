//! Client frame definitions
//!
//! Represents frames sent by clients.

/// Client frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Auth = 0x01,
    Request = 0x02,
    Ping = 0x03,
    Stats = 0x04,
}

/// A parsed client frame
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Present the shared auth token
    Auth { token: String },

    /// A JSON-encoded store request
    Request { payload: Vec<u8> },

    /// Ping (health check)
    Ping,

    /// Per-store statistics
    Stats,
}

impl ClientFrame {
    /// Get the frame type
    pub fn kind(&self) -> FrameKind {
        match self {
            ClientFrame::Auth { .. } => FrameKind::Auth,
            ClientFrame::Request { .. } => FrameKind::Request,
            ClientFrame::Ping => FrameKind::Ping,
            ClientFrame::Stats => FrameKind::Stats,
        }
    }
}
