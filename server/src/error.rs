//! Error taxonomy for the server.
//!
//! Validation failures live in `shared::ValidationError` because they are a
//! property of the wire protocol. Everything here is server-side.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while reading or writing the world file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on world file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("world file {} could not be encoded or decoded: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("port {} is already in use", .addr.port())]
    AddrInUse {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("save interval must be greater than zero")]
    InvalidSaveInterval,
    #[error("world handler panicked: {0}")]
    HandlerPanicked(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Operator guidance for errors that have an obvious fix.
    pub fn remediation(&self) -> Option<String> {
        match self {
            ServerError::AddrInUse { addr, .. } => {
                let port = addr.port();
                Some(format!(
                    "Another process is listening on port {port}.\n  \
                     1. Kill it: lsof -ti :{port} | xargs kill -9\n  \
                     2. Or find it manually: lsof -i :{port}\n  \
                     3. Or pick a different port: --port {next} (or PORT={next})",
                    port = port,
                    next = port.wrapping_add(1),
                ))
            }
            ServerError::InvalidSaveInterval => {
                Some("Pass --save-interval with a value of at least 1 second.".to_string())
            }
            _ => None,
        }
    }
}
