//! Blocking client
//!
//! One TCP connection speaking the frame protocol. Used by the CLI and the
//! network tests.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use serde_json::Value;

use crate::error::{KvError, Result};
use crate::protocol::{
    read_response, write_frame, ClientFrame, Command, Request, Response, ResponseBody, Status,
};

/// A connected client
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    next_request: u64,
}

impl Client {
    /// Connect, authenticating with `token` when given
    pub fn connect<A: ToSocketAddrs>(addr: A, token: Option<&str>) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| KvError::Network(format!("Failed to connect: {}", e)))?;
        stream.set_nodelay(true)?;

        let mut client = Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            next_request: 1,
        };

        if let Some(token) = token {
            client.authenticate(token)?;
        }
        Ok(client)
    }

    /// Send AUTH; `Unauthorized` if the server rejects the token
    pub fn authenticate(&mut self, token: &str) -> Result<()> {
        let response = self.round_trip(&ClientFrame::Auth {
            token: token.to_string(),
        })?;
        match response.status {
            Status::Ok => Ok(()),
            Status::Unauthorized => Err(KvError::Unauthorized),
            Status::Error => Err(error_from(&response)),
        }
    }

    /// Execute `command` against the store at `path`
    pub fn call(&mut self, path: &str, command: Command) -> Result<ResponseBody> {
        let request_id = format!("req-{}", self.next_request);
        self.next_request += 1;

        let payload = Request::new(path, request_id, command).to_json()?;
        let response = self.round_trip(&ClientFrame::Request { payload })?;
        match response.status {
            Status::Unauthorized => Err(KvError::Unauthorized),
            Status::Ok | Status::Error => response.body(),
        }
    }

    /// Health check; true on PONG
    pub fn ping(&mut self) -> Result<bool> {
        let response = self.round_trip(&ClientFrame::Ping)?;
        Ok(response.status == Status::Ok && response.payload.as_deref() == Some(b"PONG"))
    }

    /// Per-store statistics as JSON
    pub fn stats(&mut self) -> Result<Value> {
        let response = self.round_trip(&ClientFrame::Stats)?;
        match response.status {
            Status::Ok => {
                let payload = response.payload.unwrap_or_default();
                Ok(serde_json::from_slice(&payload)?)
            }
            Status::Unauthorized => Err(KvError::Unauthorized),
            Status::Error => Err(error_from(&response)),
        }
    }

    fn round_trip(&mut self, frame: &ClientFrame) -> Result<Response> {
        write_frame(&mut self.writer, frame)?;
        read_response(&mut self.reader)
    }
}

fn error_from(response: &Response) -> KvError {
    let message = response
        .payload
        .as_deref()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .unwrap_or_default();
    KvError::Network(message)
}
