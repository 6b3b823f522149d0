//! Client-side transfer engine for Skiff storage endpoints.
//!
//! Moves a file or directory tree to and from a remote endpoint over HTTP
//! using a chunked protocol: byte-range `PUT`s with a running SHA-512 over
//! the whole stream on upload, and a negotiated streamed-tar vs.
//! single-archive path on download. Every network call goes through the
//! [`retry`] executor, which distinguishes server overload from
//! connection-establishment failures.

mod archive;
mod download;
mod probe;
mod retry;
mod upload;

#[cfg(test)]
pub(crate) mod testutil;

pub use download::{download, download_with_config};
pub use probe::wait_until_ready;
pub use retry::{RetryPolicy, retry};
pub use upload::{upload, upload_with_config};

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use skiff_protocol::ProtocolError;

/// Default upload chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Ceiling for concurrent in-flight chunks. Reserved: the upload loop keeps
/// exactly one chunk in flight, because the stream digest is order-dependent
/// and the endpoint offers no per-chunk acknowledgement to coordinate
/// reordering.
pub const MAX_CONCURRENT_CHUNKS: usize = 4;

/// Per-attempt timeout for chunk uploads and small control requests.
/// The download body fetch deliberately has no timeout.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings threaded through the upload and download pipelines.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Upload chunk size in bytes.
    pub chunk_size: usize,
    /// Retry policy applied to every individual network call.
    pub retry: RetryPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Endpoint(#[from] ProtocolError),

    #[error("source path not found: {0}")]
    SourceMissing(PathBuf),

    #[error("source is neither a file nor a directory: {0}")]
    InvalidSource(PathBuf),

    #[error("cannot reach {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("{endpoint} answered the readiness probe with status {status}")]
    Unready { endpoint: String, status: u16 },

    #[error("{context}: server returned status {status}: {body}")]
    Status {
        context: String,
        status: u16,
        body: String,
    },

    #[error("{context}: {source}")]
    Transport {
        context: String,
        source: reqwest::Error,
    },

    #[error("{op} exited with {status}: {stderr}")]
    Packaging {
        op: &'static str,
        status: ExitStatus,
        stderr: String,
    },

    #[error("download wrote no data to {0}")]
    EmptyDownload(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
