//! Errors surfaced by the client runtime.

use reflex_config::ConfigError;
use reflex_net::EndpointParseError;
use tokio::runtime::TryCurrentError;

/// Anything that stops the client from starting or finishing a session.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The main loop was built outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    Runtime(#[from] TryCurrentError),
    /// Loading or saving the config file failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The configured server address is malformed.
    #[error("invalid server address: {0}")]
    Endpoint(#[from] EndpointParseError),
    /// No platform config directory and no `--config` given.
    #[error("could not determine a config directory, pass --config")]
    NoConfigDir,
    /// The recovery controller gave up on the session.
    #[error("connection was not recovered: {0}")]
    NotRecovered(String),
}
