//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Reflex command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "reflex", about = "Reflex network reliability layer")]
pub struct CliArgs {
    /// Server address (`host` or `host:port`).
    #[arg(long)]
    pub server: Option<String>,

    /// Server port used when the address carries none.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum reconnection attempts per episode.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Disable automatic connection recovery.
    #[arg(long)]
    pub no_recovery: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Overlay flags given on the command line. Flags left unset keep the
    /// value from the file.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let network = &mut self.network;
        if let Some(server) = &args.server {
            network.server_address.clone_from(server);
        }
        network.server_port = args.port.unwrap_or(network.server_port);

        let recovery = &mut self.recovery;
        if let Some(max) = args.max_attempts {
            recovery.max_attempts = max.clamp(1, 50);
        }
        recovery.enabled &= !args.no_recovery;

        if let Some(level) = &args.log_level {
            self.debug.log_level.clone_from(level);
        }
    }
}
