//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{KvError, Result};
use crate::manager::StoreManager;
use crate::protocol::{read_frame, write_response, ClientFrame, Request, Response, Status};

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Stores this connection routes requests to
    manager: Arc<StoreManager>,

    /// Whether AUTH succeeded (always true without a configured token)
    authenticated: bool,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and configures timeouts
    pub fn new(stream: TcpStream, manager: Arc<StoreManager>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;
        let authenticated = manager.config().auth_token.is_none();

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            manager,
            authenticated,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads frames in a loop and sends responses.
    /// Returns when the client disconnects or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let frame = match read_frame(&mut self.reader) {
                Ok(frame) => frame,
                Err(KvError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(KvError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    let _ = self.send_response(Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!("Received {:?} frame from {}", frame.kind(), self.peer_addr);

            let response = self.dispatch(frame);
            let rejected = response.status == Status::Unauthorized;

            if let Err(e) = self.send_response(response) {
                if let KvError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }

            if rejected {
                tracing::debug!("Closing unauthenticated connection {}", self.peer_addr);
                return Ok(());
            }
        }
    }

    /// Route one frame to its handler. PING is answered before authentication.
    fn dispatch(&mut self, frame: ClientFrame) -> Response {
        match frame {
            ClientFrame::Auth { token } => self.authenticate(&token),
            ClientFrame::Ping => Response::ok(Some(b"PONG".to_vec())),
            _ if !self.authenticated => Response::unauthorized(),
            ClientFrame::Stats => self.stats(),
            ClientFrame::Request { payload } => self.execute(&payload),
        }
    }

    fn authenticate(&mut self, token: &str) -> Response {
        match self.manager.config().auth_token.as_deref() {
            None => Response::ok(None),
            Some(expected) if expected == token => {
                self.authenticated = true;
                Response::ok(None)
            }
            Some(_) => {
                tracing::warn!("Rejected AUTH from {}", self.peer_addr);
                self.authenticated = false;
                Response::unauthorized()
            }
        }
    }

    fn stats(&self) -> Response {
        match serde_json::to_vec(&self.manager.stats()) {
            Ok(payload) => Response::ok(Some(payload)),
            Err(e) => Response::error(&e.to_string()),
        }
    }

    /// Parse, route and execute a REQUEST payload
    fn execute(&self, payload: &[u8]) -> Response {
        let request = match Request::from_json(payload) {
            Ok(request) => request,
            Err(rejected) => {
                tracing::debug!("Rejected request from {}: {}", self.peer_addr, rejected.error);
                return Response::failure(rejected.request_id.as_deref(), &rejected.error);
            }
        };

        let method = request.command.method_name();
        let result = self
            .manager
            .open(&request.path)
            .and_then(|db| db.execute(&request.request_id, request.command));

        match result {
            Ok(data) => Response::data(&request.request_id, data),
            Err(e) => {
                tracing::debug!(
                    path = %request.path,
                    request_id = %request.request_id,
                    method,
                    error = %e,
                    "Request failed"
                );
                Response::failure(Some(&request.request_id), &e)
            }
        }
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
