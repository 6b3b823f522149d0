use crate::ProtocolError;

/// Canonicalizes a user-supplied endpoint into a base URL.
///
/// Prefixes `https://` when no scheme is present (an explicit `http://` is
/// kept as-is) and strips trailing slashes, so routes can be appended with a
/// plain `format!("{endpoint}/ping")`.
pub fn normalize_endpoint(raw: &str) -> Result<String, ProtocolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyEndpoint);
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    Ok(with_scheme.trim_end_matches('/').to_string())
}
