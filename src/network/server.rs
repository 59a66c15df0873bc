//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::manager::StoreManager;
use crate::protocol::{write_response, Response};

use super::Connection;

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// TCP server routing requests to a `StoreManager`
pub struct Server {
    config: Config,
    manager: Arc<StoreManager>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind to `config.listen_addr`
    pub fn bind(config: Config, manager: Arc<StoreManager>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            KvError::Network(format!("Failed to bind {}: {}", config.listen_addr, e))
        })?;
        // Non-blocking accept so the loop can observe the shutdown flag
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            manager,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops `run` when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until shutdown, then flush every store
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.accept(stream, addr),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Shutting down, flushing stores");
        self.manager.flush_all()
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            reject(stream);
            return;
        }

        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Failed to configure {}: {}", addr, e);
            return;
        }

        let manager = Arc::clone(&self.manager);
        let active = Arc::clone(&self.active);
        let read_ms = self.config.read_timeout_ms;
        let write_ms = self.config.write_timeout_ms;

        active.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("shardkv-conn-{}", addr))
            .spawn(move || {
                let result = Connection::new(stream, manager).and_then(|mut conn| {
                    conn.set_timeouts(read_ms, write_ms)?;
                    conn.handle()
                });
                if let Err(e) = result {
                    tracing::debug!("Connection {} ended with error: {}", addr, e);
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });

        if let Err(e) = spawned {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("Failed to spawn connection thread: {}", e);
        }
    }
}

fn reject(mut stream: TcpStream) {
    let _ = stream.set_nonblocking(false);
    let _ = write_response(&mut stream, &Response::error("Too many connections"));
}
