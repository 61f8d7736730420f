//! Configuration for the Reflex network reliability layer.
//!
//! Settings persist to disk as RON files. Values loaded from disk are
//! normalized into safe ranges, CLI flags override them via clap, and
//! [`Config::reload`] reports whether the file changed since the last load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, MonitorConfig, NetworkConfig, PredictionConfig, PredictionKindConfig,
    PredictionMode, PriorityConfig, PriorityTier, RecoveryConfig, default_config_dir,
};
pub use error::ConfigError;
