//! Strand CLI
//!
//! Command-line tools for running and debugging Strand nodes.
//!
//! # Commands
//!
//! - `serve` - Run a node over in-memory storage
//! - `decode` - Decode a captured byte stream frame by frame

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Strand node and wire-protocol tools.
#[derive(Parser)]
#[command(name = "strand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node over in-memory storage
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:7420")]
        bind: SocketAddr,

        /// Maximum concurrently served connections
        #[arg(long, default_value = "1000")]
        max_connections: usize,

        /// Largest accepted frame, header included
        #[arg(long, default_value_t = strand_protocol::DEFAULT_MAX_FRAME_SIZE)]
        max_frame_size: usize,

        /// Delivery attempts per hook notification
        #[arg(long, default_value = "3")]
        hook_attempts: u32,
    },

    /// Decode a captured byte stream frame by frame
    Decode {
        /// File holding the raw stream
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            max_connections,
            max_frame_size,
            hook_attempts,
        } => {
            commands::serve::run(bind, max_connections, max_frame_size, hook_attempts)?;
        }
        Commands::Decode { file, format } => {
            commands::decode::run(&file, &format)?;
        }
        Commands::Version => {
            println!("Strand CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Wire protocol v{}", strand_protocol::PROTOCOL_VERSION);
        }
    }

    Ok(())
}
