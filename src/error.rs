//! Unified error type.

use std::path::PathBuf;

/// The error type returned by gmonad's fallible operations.
///
/// Application-level failures (404, 500, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// startup failures only: bad configuration, a logger that cannot be
/// installed, or a port that cannot be bound. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config: {0}")]
    Config(String),

    #[error("config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("logging: {0}")]
    Logging(String),
}
