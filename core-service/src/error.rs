use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Download error: {0}")]
    Download(#[from] core_download::DownloadError),

    #[error("Episode not found: {0}")]
    EpisodeNotFound(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
