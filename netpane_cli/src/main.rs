//! Netpane - Network request panel for captured browser traffic
//!
//! Usage:
//!   netpane open <HAR>          Browse a capture in the terminal
//!   netpane list <HAR>          Print the request list
//!   netpane serve               Run the inspector server
//!   netpane push <HAR>          Send a capture to a running inspector
//!   netpane config              Show or initialize the configuration

mod classify;
mod commands;
mod config;
mod detail;
mod engine;
mod format;
mod inspector;
mod panel;
mod scope;
mod source;
mod tui;
mod view;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use commands::CaptureOptions;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use view::Filter;

#[derive(Parser)]
#[command(name = "netpane")]
#[command(author = "Netpane Team")]
#[command(version)]
#[command(about = "Network request panel for captured browser traffic", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Clone)]
struct CaptureArgs {
    /// HAR file with the finished requests
    har: PathBuf,

    /// JSON-lines observer event log recorded alongside the HAR
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Scope to this host instead of the capture's page
    #[arg(long)]
    host: Option<String>,

    /// Initial filter (all, api, fetch, doc, css, js, font, img, media, ws, other)
    #[arg(short, long)]
    filter: Option<Filter>,
}

impl From<CaptureArgs> for CaptureOptions {
    fn from(args: CaptureArgs) -> Self {
        Self {
            har: args.har,
            events: args.events,
            host: args.host,
            filter: args.filter,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Browse a capture in the terminal UI
    Open {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Keep reading the HAR and event log as they grow
        #[arg(long)]
        follow: bool,
    },

    /// Print the request list of a capture
    List {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Print the panel snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the inspector server
    Serve {
        /// Port to listen on (default from config, 4040)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a capture to a running inspector
    Push {
        /// HAR file with the finished requests
        har: PathBuf,

        /// JSON-lines observer event log recorded alongside the HAR
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Inspector port (default from config, 4040)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the effective configuration
    Config {
        /// Write a config file with the defaults
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure config directories exist
    config::ensure_dirs()?;

    // The TUI owns the terminal, so its log goes to a file
    let log_to_file = matches!(cli.command, Commands::Open { .. });
    init_logging(cli.verbose, log_to_file)?;

    match cli.command {
        Commands::Open { capture, follow } => {
            commands::open::run(capture.into(), follow).await?;
        }

        Commands::List { capture, json } => {
            commands::list::run(capture.into(), json).await?;
        }

        Commands::Serve { port } => {
            commands::serve::run(port).await?;
        }

        Commands::Push { har, events, port } => {
            let opts = CaptureOptions {
                har,
                events,
                host: None,
                filter: None,
            };
            commands::push::run(opts, port).await?;
        }

        Commands::Config { init } => {
            commands::config::run(init).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, to_file: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},netpane_cli=info", log_level).into());

    let (stderr_layer, file_layer) = if to_file {
        let path = config::logs_dir().join("netpane.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file));
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .without_time()
            .with_writer(std::io::stderr);
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
