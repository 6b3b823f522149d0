//! Chunked upload pipeline.
//!
//! Packages the source into a streamed tar archive, splits the stream into
//! fixed-size chunks, uploads each with a `Content-Range` declaration while
//! accumulating a whole-stream SHA-512, then finalizes with the digest. The
//! archive size is unknown up front, so the range denominator is the running
//! total of bytes sent so far.

use std::path::PathBuf;

use reqwest::Client;
use reqwest::header::CONTENT_RANGE;
use sha2::{Digest, Sha512};
use skiff_protocol::{FinalizeUploadRequest, normalize_endpoint, routes};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::retry::{RetryPolicy, retry};
use crate::{REQUEST_TIMEOUT, TransferConfig, TransferError, archive, probe};

/// Uploads a file or directory tree to the endpoint with default settings.
pub async fn upload(endpoint: &str, token: &str, path: &str) -> Result<(), TransferError> {
    upload_with_config(endpoint, token, path, &TransferConfig::default()).await
}

/// Uploads with explicit chunk size and retry policy.
pub async fn upload_with_config(
    endpoint: &str,
    token: &str,
    path: &str,
    config: &TransferConfig,
) -> Result<(), TransferError> {
    let endpoint = normalize_endpoint(endpoint)?;
    probe::wait_until_ready(&endpoint, token, &config.retry).await?;

    let source = expand_home(path);
    let meta = match tokio::fs::metadata(&source).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::SourceMissing(source));
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() && !meta.is_dir() {
        return Err(TransferError::InvalidSource(source));
    }

    let mut packer = archive::spawn_pack(&source, meta.is_dir())?;
    let mut stream = packer
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("tar stdout not captured"))?;

    let client = Client::builder()
        .build()
        .map_err(|e| TransferError::Transport {
            context: "building upload client".into(),
            source: e,
        })?;

    let mut hasher = Sha512::new();
    let mut offset: u64 = 0;
    loop {
        let chunk = read_block(&mut stream, config.chunk_size).await?;
        if chunk.is_empty() {
            break;
        }
        // Digest state must follow production order exactly.
        hasher.update(&chunk);

        let start = offset;
        let end = offset + chunk.len() as u64 - 1;
        offset = end + 1;
        put_chunk(&client, &endpoint, token, chunk, start, end, &config.retry).await?;
    }
    drop(stream);

    archive::wait_for_exit(packer, "tar create").await?;

    let digest = hex::encode(hasher.finalize());
    debug!(endpoint = %endpoint, bytes = offset, digest = %digest, "upload stream complete");

    let body = serde_json::to_value(FinalizeUploadRequest { hash: digest })?;
    finalize(&client, &endpoint, token, body, &config.retry).await?;
    info!(endpoint = %endpoint, bytes = offset, "upload finalized");
    Ok(())
}

/// Reads up to `size` bytes, looping over short pipe reads. Returns an
/// empty buffer only at end of stream.
async fn read_block<R: AsyncRead + Unpin>(
    reader: &mut R,
    size: usize,
) -> Result<Vec<u8>, TransferError> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

async fn put_chunk(
    client: &Client,
    endpoint: &str,
    token: &str,
    chunk: Vec<u8>,
    start: u64,
    end: u64,
    policy: &RetryPolicy,
) -> Result<(), TransferError> {
    let url = format!("{endpoint}{}", routes::UPLOAD);
    let range = format!("bytes {start}-{end}/{}", end + 1);
    debug!(start, end, size = chunk.len(), "uploading chunk");

    retry(policy, || {
        let request = client
            .put(&url)
            .bearer_auth(token)
            .header(CONTENT_RANGE, range.as_str())
            .timeout(REQUEST_TIMEOUT)
            .body(chunk.clone());
        async move {
            let response = request.send().await.map_err(|e| TransferError::Transport {
                context: format!("upload chunk {start}-{end}"),
                source: e,
            })?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                let body = response.text().await.unwrap_or_default();
                Err(TransferError::Status {
                    context: format!("upload chunk {start}-{end}"),
                    status: status.as_u16(),
                    body,
                })
            }
        }
    })
    .await
}

/// `POST {endpoint}/finalize` with a JSON body, shared by both pipelines.
pub(crate) async fn finalize(
    client: &Client,
    endpoint: &str,
    token: &str,
    body: serde_json::Value,
    policy: &RetryPolicy,
) -> Result<(), TransferError> {
    let url = format!("{endpoint}{}", routes::FINALIZE);
    retry(policy, || {
        let request = client
            .post(&url)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body);
        async move {
            let response = request.send().await.map_err(|e| TransferError::Transport {
                context: "finalize".into(),
                source: e,
            })?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                let text = response.text().await.unwrap_or_default();
                Err(TransferError::Status {
                    context: "finalize".into(),
                    status: status.as_u16(),
                    body: text,
                })
            }
        }
    })
    .await
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
