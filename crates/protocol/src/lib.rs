//! Wire-level vocabulary for the Skiff transfer protocol.
//!
//! Everything a client (or a future server) needs to speak the chunked
//! transfer protocol: endpoint canonicalization, route paths, and the JSON
//! bodies exchanged on `/info` and `/finalize`.

mod endpoint;
mod messages;

pub use endpoint::normalize_endpoint;
pub use messages::{FinalizeUploadRequest, InfoResponse, filename_from_disposition, routes};

/// Errors produced by the protocol crate.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("endpoint must not be empty")]
    EmptyEndpoint,
}
