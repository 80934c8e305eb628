//! mcpipe CLI
//!
//! Command-line interface for talking to a memcached pool.

use std::time::Duration;

use clap::{Parser, Subcommand};
use mcpipe::{CasResult, Client, Config, ProtocolKind, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// mcpipe CLI
#[derive(Parser, Debug)]
#[command(name = "mcpipe-cli")]
#[command(about = "Command-line client for memcached")]
#[command(version)]
struct Args {
    /// Comma-separated server addresses (host:port)
    #[arg(short, long, default_value = "127.0.0.1:11211", value_delimiter = ',')]
    servers: Vec<String>,

    /// Use the binary protocol instead of text
    #[arg(short, long)]
    binary: bool,

    /// Prefix prepended to every key
    #[arg(short, long, default_value = "")]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get one or more values
    Get {
        /// Keys to get
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Get a value and its CAS unique
    Gets {
        key: String,
    },

    /// Store a value
    Set {
        key: String,
        value: String,

        /// Time to live in seconds (0 = never expire)
        #[arg(long, default_value = "0")]
        ttl: u64,
    },

    /// Store a value only if the key is absent
    Add {
        key: String,
        value: String,

        #[arg(long, default_value = "0")]
        ttl: u64,
    },

    /// Store a value only if the key is present
    Replace {
        key: String,
        value: String,

        #[arg(long, default_value = "0")]
        ttl: u64,
    },

    /// Append data to an existing value
    Append {
        key: String,
        value: String,
    },

    /// Prepend data to an existing value
    Prepend {
        key: String,
        value: String,
    },

    /// Store a value if its CAS unique is unchanged
    Cas {
        key: String,
        value: String,
        unique: u64,

        #[arg(long, default_value = "0")]
        ttl: u64,
    },

    /// Delete a key
    Delete {
        key: String,
    },

    /// Increment a counter
    Incr {
        key: String,
        delta: u64,
    },

    /// Decrement a counter
    Decr {
        key: String,
        delta: u64,
    },

    /// Invalidate all items on every server
    Flush {
        /// Delay in seconds before the flush takes effect
        #[arg(long, default_value = "0")]
        delay: u64,

        /// Multiply the delay by each server's position
        #[arg(long)]
        staggered: bool,
    },

    /// Print server statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,mcpipe=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let protocol = if args.binary {
        ProtocolKind::Binary
    } else {
        ProtocolKind::Text
    };
    let config = Config::builder()
        .servers(args.servers)
        .protocol(protocol)
        .key_prefix(args.prefix)
        .build();

    let client = match Client::new(config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to create client: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&client, args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(client: &Client, command: Commands) -> mcpipe::Result<()> {
    match command {
        Commands::Get { keys } => {
            let values = client.get_multi(&keys)?;
            for (key, value) in keys.iter().zip(values) {
                match value {
                    Some(value) => println!("{} = {}", key, display(&value)),
                    None => println!("{} (not found)", key),
                }
            }
        }
        Commands::Gets { key } => match client.gets(&key)? {
            Some(item) => println!("{} = {} (cas {})", key, display(&item.value), item.cas),
            None => println!("{} (not found)", key),
        },
        Commands::Set { key, value, ttl } => {
            report(client.set_with_expiry(&key, value, ttl_of(ttl))?);
        }
        Commands::Add { key, value, ttl } => {
            report(client.add_with_expiry(&key, value, ttl_of(ttl))?);
        }
        Commands::Replace { key, value, ttl } => {
            report(client.replace_with_expiry(&key, value, ttl_of(ttl))?);
        }
        Commands::Append { key, value } => report(client.append(&key, value)?),
        Commands::Prepend { key, value } => report(client.prepend(&key, value)?),
        Commands::Cas {
            key,
            value,
            unique,
            ttl,
        } => {
            let result = client.cas_with_expiry(&key, value, unique, ttl_of(ttl))?;
            println!("{}", cas_label(result));
        }
        Commands::Delete { key } => {
            if client.delete(&key)? {
                println!("DELETED");
            } else {
                println!("NOT_FOUND");
            }
        }
        Commands::Incr { key, delta } => counter(client.increment(&key, delta)?),
        Commands::Decr { key, delta } => counter(client.decrement(&key, delta)?),
        Commands::Flush { delay, staggered } => {
            let flushed = client.flush_all_with_delay(Duration::from_secs(delay), staggered)?;
            println!("{}", if flushed { "OK" } else { "FAILED" });
        }
        Commands::Stats => {
            for (server, stats) in client.stats()? {
                println!("{}", server);
                let mut names: Vec<_> = stats.keys().collect();
                names.sort();
                for name in names {
                    println!("  {} {}", name, stats[name]);
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Output Helpers
// =============================================================================

fn ttl_of(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}

fn display(value: &Value) -> String {
    match value.as_bytes() {
        Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        None => format!("{:?}", value),
    }
}

fn report(stored: bool) {
    println!("{}", if stored { "STORED" } else { "NOT_STORED" });
}

fn counter(value: Option<u64>) {
    match value {
        Some(value) => println!("{}", value),
        None => println!("NOT_FOUND"),
    }
}

fn cas_label(result: CasResult) -> &'static str {
    match result {
        CasResult::Stored => "STORED",
        CasResult::NotStored => "NOT_STORED",
        CasResult::Exists => "EXISTS",
        CasResult::NotFound => "NOT_FOUND",
    }
}
