//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single non-blocking acceptor loop
//! - One thread per connection, capped by `max_connections`
//! - Requests routed through the `StoreManager` to the owning `Database`

mod client;
mod connection;
mod server;

pub use client::Client;
pub use connection::Connection;
pub use server::Server;
