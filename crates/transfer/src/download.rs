//! Negotiated download pipeline.
//!
//! Asks `/info` whether the payload is one packaged archive or a tar byte
//! stream, fetches `/download` without a timeout (the size is unknown and
//! may be large), then either saves the payload as a named file or pipes it
//! through a streaming tar extraction. The response `Content-Type` is
//! authoritative: a zip payload is saved as a file even when negotiation
//! said streamed.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response};
use skiff_protocol::{InfoResponse, filename_from_disposition, normalize_endpoint, routes};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::retry::{RetryPolicy, retry};
use crate::upload::finalize;
use crate::{REQUEST_TIMEOUT, TransferConfig, TransferError, archive, probe};

/// Downloads the endpoint's payload into `target_dir` with default settings.
///
/// `file_name` overrides the saved name in archive mode; streamed mode
/// ignores it.
pub async fn download(
    endpoint: &str,
    token: &str,
    target_dir: &Path,
    file_name: Option<&str>,
) -> Result<(), TransferError> {
    download_with_config(endpoint, token, target_dir, file_name, &TransferConfig::default()).await
}

/// Downloads with an explicit retry policy.
pub async fn download_with_config(
    endpoint: &str,
    token: &str,
    target_dir: &Path,
    file_name: Option<&str>,
    config: &TransferConfig,
) -> Result<(), TransferError> {
    let endpoint = normalize_endpoint(endpoint)?;
    probe::wait_until_ready(&endpoint, token, &config.retry).await?;
    tokio::fs::create_dir_all(target_dir).await?;

    // No client-wide timeout: the body fetch is bounded only by cancellation.
    let client = Client::builder()
        .build()
        .map_err(|e| TransferError::Transport {
            context: "building download client".into(),
            source: e,
        })?;

    let negotiated_archive = match fetch_info(&client, &endpoint, token, &config.retry).await {
        Ok(info) => info.archive,
        Err(TransferError::Status { status: 404, .. }) => {
            debug!(endpoint = %endpoint, "endpoint has no /info route, assuming streamed mode");
            false
        }
        Err(err) => return Err(err),
    };

    let url = format!("{endpoint}{}", routes::DOWNLOAD);
    let response = retry(&config.retry, || {
        let request = client.get(&url).bearer_auth(token);
        async move {
            let response = request.send().await.map_err(|e| TransferError::Transport {
                context: "download".into(),
                source: e,
            })?;
            let status = response.status();
            if status.is_success() {
                Ok(response)
            } else {
                let body = response.text().await.unwrap_or_default();
                Err(TransferError::Status {
                    context: "download".into(),
                    status: status.as_u16(),
                    body,
                })
            }
        }
    })
    .await?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    let archive_mode = negotiated_archive || content_type.contains("zip");
    debug!(
        endpoint = %endpoint,
        negotiated_archive,
        content_type = %content_type,
        archive_mode,
        "download mode resolved"
    );

    if archive_mode {
        save_archive(response, target_dir, file_name).await?;
    } else {
        extract_stream(response, target_dir).await?;
    }

    finalize(&client, &endpoint, token, serde_json::json!({}), &config.retry).await?;
    info!(endpoint = %endpoint, target = %target_dir.display(), "download finalized");
    Ok(())
}

async fn fetch_info(
    client: &Client,
    endpoint: &str,
    token: &str,
    policy: &RetryPolicy,
) -> Result<InfoResponse, TransferError> {
    let url = format!("{endpoint}{}", routes::INFO);
    retry(policy, || {
        let request = client
            .get(&url)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT);
        async move {
            let response = request.send().await.map_err(|e| TransferError::Transport {
                context: "info".into(),
                source: e,
            })?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransferError::Status {
                    context: "info".into(),
                    status: status.as_u16(),
                    body,
                });
            }
            response
                .json::<InfoResponse>()
                .await
                .map_err(|e| TransferError::Transport {
                    context: "info".into(),
                    source: e,
                })
        }
    })
    .await
}

/// Resolves the output file name for archive mode: caller-supplied name,
/// then `Content-Disposition`, then `archive.zip`; a `.zip` suffix is
/// forced either way.
fn resolve_archive_name(caller: Option<&str>, disposition: Option<&str>) -> String {
    let name = caller
        .map(str::to_string)
        .or_else(|| disposition.and_then(filename_from_disposition))
        .unwrap_or_else(|| "archive.zip".to_string());
    if name.ends_with(".zip") {
        name
    } else {
        format!("{name}.zip")
    }
}

async fn save_archive(
    response: Response,
    target_dir: &Path,
    file_name: Option<&str>,
) -> Result<(), TransferError> {
    let disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let name = resolve_archive_name(file_name, disposition.as_deref());
    let dest = target_dir.join(&name);

    let mut file = tokio::fs::File::create(&dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransferError::Transport {
            context: "download body".into(),
            source: e,
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    // A truncated transfer must never pass for success.
    if written == 0 {
        let _ = tokio::fs::remove_file(&dest).await;
        return Err(TransferError::EmptyDownload(dest));
    }

    debug!(dest = %dest.display(), bytes = written, "archive saved");
    Ok(())
}

async fn extract_stream(response: Response, target_dir: &Path) -> Result<(), TransferError> {
    let mut unpacker = archive::spawn_unpack(target_dir)?;
    let mut stdin = unpacker
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("tar stdin not captured"))?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransferError::Transport {
            context: "download body".into(),
            source: e,
        })?;
        stdin.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    stdin.shutdown().await?;
    drop(stdin);

    archive::wait_for_exit(unpacker, "tar extract").await?;
    debug!(target = %target_dir.display(), bytes = written, "stream extracted");
    Ok(())
}
