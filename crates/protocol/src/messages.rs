use serde::{Deserialize, Serialize};

/// Route paths under the endpoint base URL.
pub mod routes {
    /// Readiness probe.
    pub const PING: &str = "/ping";
    /// Download mode negotiation.
    pub const INFO: &str = "/info";
    /// Chunk upload target.
    pub const UPLOAD: &str = "/upload";
    /// Payload fetch.
    pub const DOWNLOAD: &str = "/download";
    /// Commit for both upload and download.
    pub const FINALIZE: &str = "/finalize";
}

// ---------------------------------------------------------------------------
// Request/response bodies
// ---------------------------------------------------------------------------

/// `GET /info` response: how the endpoint will deliver a download.
///
/// `archive: true` means one packaged file to save as-is; `false` means a
/// tar byte stream to unpack incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub archive: bool,
}

/// `POST /finalize` body closing an upload.
///
/// Carries the hex SHA-512 of the whole uploaded stream, in chunk
/// production order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeUploadRequest {
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Header helpers
// ---------------------------------------------------------------------------

/// Extracts a file name from a `Content-Disposition` header value.
///
/// Tries the quoted `filename="…"` form first, then an unquoted
/// `filename=…` fallback. Returns `None` when neither yields a non-empty
/// name.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    if let Some(idx) = value.find("filename=\"") {
        let rest = &value[idx + "filename=\"".len()..];
        if let Some(end) = rest.find('"') {
            let name = &rest[..end];
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }

    if let Some(idx) = value.find("filename=") {
        let rest = &value[idx + "filename=".len()..];
        let name = rest.split(';').next().unwrap_or("").trim().trim_matches('"');
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    None
}
