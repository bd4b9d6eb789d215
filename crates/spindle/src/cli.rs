//! Command-line interface definition.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "spindle", about = "Delegation daemon for coding agents", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: tool facade on stdio plus the health endpoint.
    Serve {
        /// HTTP host for the health endpoint.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// HTTP port for the health endpoint.
        #[arg(long, default_value_t = 8002)]
        port: u16,
    },

    /// Start the daemon via systemd if available, else in the background.
    Start,

    /// Drop the reload touchfile for the external supervisor to pick up.
    Reload,

    /// Query the running daemon's health endpoint.
    Status {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8002)]
        port: u16,
    },
}
