//! Streaming file download.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Download `url` to `dest`, streaming the body to disk.
///
/// Any transport failure or non-success status is an error. A partially
/// written file is removed before returning the error.
pub async fn download_file(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    info!("Downloading {} to {}", url, dest.display());

    match stream_to_file(client, url, dest).await {
        Ok(bytes) => {
            debug!("Downloaded {} bytes from {}", bytes, url);
            Ok(bytes)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(dest).await;
            Err(e)
        }
    }
}

async fn stream_to_file(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    let download_error = |source| Error::Download {
        url: url.to_string(),
        source,
    };

    let response = client.get(url).send().await.map_err(download_error)?;

    if !response.status().is_success() {
        return Err(Error::DownloadStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(download_error)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
