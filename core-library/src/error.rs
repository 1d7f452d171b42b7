use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Feed configuration is malformed: {0}")]
    MalformedConfig(String),

    /// Neither the remote endpoint nor the offline cache produced a config.
    #[error("Feed configuration unavailable: {0}")]
    ConfigUnavailable(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
