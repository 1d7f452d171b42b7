//! Episode download executor using Reqwest streaming

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    transfer::{DownloadExecutor, ProgressCallback, TransferProgress, TransferRequest},
};
use futures_util::StreamExt;
use reqwest::Client;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Streams episode audio into a single download directory.
///
/// A failed or cancelled transfer never leaves a partial file behind.
pub struct ReqwestDownloadExecutor {
    client: Client,
    download_dir: PathBuf,
}

impl ReqwestDownloadExecutor {
    pub fn new(download_dir: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self::with_client(client, download_dir))
    }

    pub fn with_client(client: Client, download_dir: PathBuf) -> Self {
        Self {
            client,
            download_dir,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn stream_to_file(
        &self,
        request: &TransferRequest,
        path: &Path,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(&request.episode_id)),
            response = self.client.get(&request.source_url).send() => response
                .map_err(|e| BridgeError::OperationFailed(format!("Request failed: {}", e)))?,
        };

        if !response.status().is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP {} for {}",
                response.status(),
                request.source_url
            )));
        }

        let total_bytes = response.content_length().unwrap_or(0);
        let mut file = fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut bytes_written = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&request.episode_id)),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await?;
                    bytes_written += bytes.len() as u64;
                    on_progress(TransferProgress::new(bytes_written, total_bytes));
                }
                Some(Err(e)) => {
                    return Err(BridgeError::OperationFailed(format!(
                        "Transfer interrupted: {}",
                        e
                    )))
                }
                None => break,
            }
        }

        file.flush().await?;

        // Servers without Content-Length never produce a complete report above.
        if total_bytes == 0 {
            on_progress(TransferProgress::new(bytes_written, bytes_written));
        }

        Ok(())
    }
}

fn cancelled(episode_id: &str) -> BridgeError {
    BridgeError::Cancelled(format!("Transfer of {} cancelled", episode_id))
}

#[async_trait]
impl DownloadExecutor for ReqwestDownloadExecutor {
    async fn transfer(
        &self,
        request: TransferRequest,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(&request.file_name);

        debug!(episode_id = %request.episode_id, file = %request.file_name, "Starting transfer");

        match self
            .stream_to_file(&request, &path, &on_progress, &cancel)
            .await
        {
            Ok(()) => {
                info!(episode_id = %request.episode_id, file = %request.file_name, "Transfer finished");
                Ok(path)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&path).await {
                    if rm.kind() != ErrorKind::NotFound {
                        warn!(error = %rm, file = %request.file_name, "Failed to remove partial file");
                    }
                }
                Err(e)
            }
        }
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn delete_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.download_dir).await {
            Ok(()) => {
                info!("Removed download directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }
}
