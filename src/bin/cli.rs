//! ShardKV CLI Client
//!
//! Command-line interface for interacting with a ShardKV server.

use clap::{Parser, Subcommand};
use serde_json::Value;
use shardkv::network::Client;
use shardkv::protocol::Command;

/// ShardKV CLI
#[derive(Parser, Debug)]
#[command(name = "shardkv-cli")]
#[command(about = "CLI for the ShardKV key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    server: String,

    /// Auth token, if the server requires one
    #[arg(short, long)]
    token: Option<String>,

    /// Store path, relative to the server's storage root
    #[arg(short, long, default_value = "default")]
    path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Set a key (value is parsed as JSON, else stored as a string)
    Set { key: String, value: String },

    /// Delete a key
    Del { key: String },

    /// Check whether a key exists
    Has { key: String },

    /// Dump every key/value pair
    All,

    /// Append to an array
    Push { key: String, value: String },

    /// Remove the last array element
    Pop { key: String },

    /// Remove the first array element
    Shift { key: String },

    /// Prepend to an array
    Unshift { key: String, value: String },

    /// Copy part of an array
    Slice {
        key: String,
        #[arg(allow_hyphen_values = true)]
        start: i64,
        #[arg(allow_hyphen_values = true)]
        end: Option<i64>,
    },

    /// Ping the server
    Ping,

    /// Per-store statistics
    Stats,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> shardkv::Result<()> {
    let mut client = Client::connect(&args.server, args.token.as_deref())?;

    let command = match args.command {
        Commands::Ping => {
            println!("{}", if client.ping()? { "PONG" } else { "no reply" });
            return Ok(());
        }
        Commands::Stats => {
            print_json(&client.stats()?);
            return Ok(());
        }
        Commands::Get { key } => Command::Get { key },
        Commands::Set { key, value } => Command::Set {
            key,
            value: parse_value(&value),
        },
        Commands::Del { key } => Command::Delete { key },
        Commands::Has { key } => Command::Has { key },
        Commands::All => Command::All,
        Commands::Push { key, value } => Command::Push {
            key,
            value: parse_value(&value),
        },
        Commands::Pop { key } => Command::Pop { key },
        Commands::Shift { key } => Command::Shift { key },
        Commands::Unshift { key, value } => Command::Unshift {
            key,
            value: parse_value(&value),
        },
        Commands::Slice { key, start, end } => Command::Slice { key, start, end },
    };

    let body = client.call(&args.path, command)?;
    match body.error {
        Some(error) => {
            eprintln!("error: {}", error);
            std::process::exit(2);
        }
        None => print_json(&body.data),
    }
    Ok(())
}

/// Parse as JSON, falling back to a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}
