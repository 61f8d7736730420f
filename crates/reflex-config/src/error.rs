//! Errors from reading and writing `config.ron`.

use std::io;
use std::path::PathBuf;

/// Configuration persistence failure. File errors carry the path involved.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The config directory or file could not be written.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        /// Directory or file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("invalid config in {}: {source}", path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// RON error with line and column.
        source: ron::error::SpannedError,
    },

    /// The in-memory config could not be encoded.
    #[error("cannot encode config: {0}")]
    Encode(#[from] ron::Error),
}
