//! sunbridge - command line client for the Sunny DAW bridge
//!
//! Subcommands:
//! - `sunbridge get <path> <property>` - Read a property
//! - `sunbridge set <path> <property> <value>` - Write a property
//! - `sunbridge call <path> <method> [args...]` - Invoke a method
//! - `sunbridge observe <path> <property>` - Print property changes
//! - `sunbridge osc <address> [args...]` - Send a raw OSC message
//! - `sunbridge config` - Show the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sunconf::SunnyConfig;
use sunlink::TransportKind;

mod commands;

#[derive(Parser)]
#[command(name = "sunbridge")]
#[command(about = "Command line client for the Sunny DAW bridge")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ./sunny.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bridge host (overrides config and SUNNY_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Transport: stream (TCP) or datagram (UDP)
    #[arg(long, global = true)]
    transport: Option<TransportKind>,

    /// Request timeout in milliseconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a property, e.g. `get song tempo`
    Get {
        /// Object path (song, tracks/0, tracks/0/clip_slots/2/clip, ...)
        path: String,

        property: String,
    },

    /// Write a property, e.g. `set song tempo 128`
    Set {
        path: String,

        property: String,

        /// JSON value; anything that is not valid JSON is sent as a string
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Invoke a method, e.g. `call song start_playing`
    Call {
        path: String,

        method: String,

        /// JSON arguments
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print every change of a property
    Observe {
        path: String,

        property: String,

        /// Stop after this many seconds (default: run until killed)
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// Send one OSC message, e.g. `osc /live/song/set/tempo 128.0`
    Osc {
        address: String,

        /// Arguments: integers become int32, other numbers float32, the rest strings
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,

        /// Print OSC messages received for this long after sending
        #[arg(short, long, default_value = "0")]
        wait_ms: u64,
    },

    /// Show the effective configuration
    Config {
        /// Also list the files and environment variables that contributed
        #[arg(long)]
        sources: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = SunnyConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.link.host = host;
    }
    if let Some(kind) = cli.transport {
        config.link.transport = kind;
    }
    if let Some(ms) = cli.timeout {
        config.requests.timeout_ms = ms;
    }

    sunbridge::telemetry::init(&config.telemetry.log_level)?;

    match cli.command {
        Commands::Get { path, property } => commands::get(&config, &path, &property)?,
        Commands::Set {
            path,
            property,
            value,
        } => commands::set(&config, &path, &property, &value)?,
        Commands::Call { path, method, args } => commands::call(&config, &path, &method, &args)?,
        Commands::Observe {
            path,
            property,
            seconds,
        } => commands::observe(&config, &path, &property, seconds)?,
        Commands::Osc {
            address,
            args,
            wait_ms,
        } => commands::osc(&config, &address, &args, wait_ms)?,
        Commands::Config { sources: show } => commands::show_config(&config, show.then_some(&sources))?,
    }

    Ok(())
}
