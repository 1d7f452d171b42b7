use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` when the operation was aborted through cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
