/*!
 * Error Types
 *
 * Every failure report_ip can hit maps onto one variant of [`Error`].
 * Nothing is retried; the binary logs the error and exits with the
 * variant's own exit code so scripts can tell failures apart.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Config path is missing, is a directory, or cannot be read
    #[error("config file {} not found or unreadable", .0.display())]
    ConfigNotFound(PathBuf),

    /// Malformed YAML, schema mismatch, or a required field left empty
    #[error("failed to parse config {}: {reason}", .path.display())]
    ConfigParse { path: PathBuf, reason: String },

    /// The OS refused to list network interfaces
    #[error("failed to enumerate network interfaces: {0}")]
    InterfaceList(#[source] std::io::Error),

    #[error("no non-loopback IPv4 address found")]
    NoAddressFound,

    #[error("failed to connect to store at {addr}: {source}")]
    StoreConnect {
        addr: String,
        #[source]
        source: StoreFault,
    },

    #[error("failed to write key {key:?}: {source}")]
    StoreWrite {
        key: String,
        #[source]
        source: StoreFault,
    },

    #[error("failed to read key {key:?}: {source}")]
    StoreRead {
        key: String,
        #[source]
        source: StoreFault,
    },

    #[error("failed to encode report: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("failed to decode report {value:?}: {reason}")]
    Deserialization { value: String, reason: String },
}

/// What went wrong while talking to the store
#[derive(Debug, Error)]
pub enum StoreFault {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Bytes on the wire were not valid RESP
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with a `-ERR ...` reply
    #[error("server replied with error: {0}")]
    Reply(String),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("key does not exist")]
    KeyMissing,
}

impl Error {
    /// Process exit status for this failure kind. Zero is reserved for success.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigNotFound(_) => 2,
            Error::ConfigParse { .. } => 3,
            Error::InterfaceList(_) => 4,
            Error::NoAddressFound => 5,
            Error::StoreConnect { .. } => 6,
            Error::StoreWrite { .. } => 7,
            Error::StoreRead { .. } => 8,
            Error::Serialization(_) => 9,
            Error::Deserialization { .. } => 10,
        }
    }
}
