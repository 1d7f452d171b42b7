//! File Transfer Abstraction
//!
//! Host-provided download executor used by the download queue. Transfers are
//! cooperative-cancelable through a [`CancellationToken`]; resuming a partial
//! transfer is not required (a retry restarts from zero).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A single transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Episode the file belongs to, for logging and bookkeeping.
    pub episode_id: String,
    pub source_url: String,
    /// File name inside the executor's download directory.
    pub file_name: String,
}

/// Progress snapshot reported by the executor.
///
/// Reports for one transfer arrive in non-decreasing `bytes_written` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_written: u64,
    /// Expected size, `0` when the server did not announce it.
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn new(bytes_written: u64, total_bytes: u64) -> Self {
        Self {
            bytes_written,
            total_bytes,
        }
    }

    /// Completion percentage clamped to `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let pct = self.bytes_written.saturating_mul(100) / self.total_bytes;
        pct.min(100) as u8
    }

    /// Returns `true` once every expected byte has been written.
    pub fn is_complete(&self) -> bool {
        self.total_bytes > 0 && self.bytes_written >= self.total_bytes
    }
}

/// Callback invoked by the executor on every progress report.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Download executor trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transfer::{DownloadExecutor, TransferRequest};
///
/// async fn fetch(exec: &dyn DownloadExecutor, cancel: CancellationToken) -> Result<PathBuf> {
///     let request = TransferRequest {
///         episode_id: "ep-1".into(),
///         source_url: "https://cdn.example.com/ep-1.mp3".into(),
///         file_name: "ep-1.mp3".into(),
///     };
///     exec.transfer(request, Arc::new(|p| println!("{}%", p.percent())), cancel).await
/// }
/// ```
#[async_trait]
pub trait DownloadExecutor: Send + Sync {
    /// Transfer `request.source_url` into the download directory and return
    /// the local path.
    ///
    /// Must return [`BridgeError::Cancelled`](crate::error::BridgeError::Cancelled)
    /// promptly once `cancel` fires. A partially written file is removed
    /// before any error is returned.
    async fn transfer(
        &self,
        request: TransferRequest,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<PathBuf>;

    /// Delete a single downloaded file. Missing files are not an error.
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete the entire download directory in one operation.
    async fn delete_all(&self) -> Result<()>;
}
