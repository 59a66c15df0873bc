//! ShardKV Server Binary
//!
//! Serves the stores under a storage root over TCP.

use std::sync::Arc;

use clap::Parser;
use shardkv::network::Server;
use shardkv::{Config, StoreManager};
use tracing_subscriber::{fmt, EnvFilter};

/// ShardKV Server
#[derive(Parser, Debug)]
#[command(name = "shardkv-server")]
#[command(about = "File-backed sharded JSON key-value store")]
#[command(version)]
struct Args {
    /// Storage root; each store is a directory below it
    #[arg(short = 'd', long, default_value = "./storage")]
    storage_root: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Shared token clients must present with AUTH
    #[arg(short, long)]
    token: Option<String>,

    /// Maximum keys per shard file
    #[arg(long, default_value = "100")]
    max_keys_per_shard: usize,

    /// Flush debounce in milliseconds
    #[arg(long, default_value = "250")]
    flush_debounce_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("ShardKV Server v{}", shardkv::VERSION);
    tracing::info!("Storage root: {}", args.storage_root);
    tracing::info!("Listen address: {}", args.listen);

    let mut builder = Config::builder()
        .storage_root(&args.storage_root)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .max_keys_per_shard(args.max_keys_per_shard)
        .flush_debounce(std::time::Duration::from_millis(args.flush_debounce_ms));
    if let Some(token) = args.token {
        builder = builder.auth_token(token);
    }
    let config = builder.build();

    let manager = match StoreManager::new(config.clone()) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            tracing::error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config, manager) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
