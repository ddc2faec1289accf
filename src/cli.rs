//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Asha session core - OAuth sign-in, conversation threads and moderated chat
#[derive(Parser, Debug)]
#[command(name = "asha-core")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "ASHA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "ASHA_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "ASHA_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ASHA_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "ASHA_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve,

    /// Print an authorization URL with a fresh state token
    AuthUrl,

    /// Run the moderation gate on a piece of text
    Moderate {
        /// Text to check
        #[arg(required = true)]
        text: String,
    },

    /// Print the effective configuration (secrets redacted)
    ShowConfig,
}
