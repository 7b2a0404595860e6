use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] vodium_engine::DownloadError),

    #[error("{0}")]
    Pipeline(#[from] vodium_engine::HlsDownloaderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("only {completed} of {total} segments were downloaded")]
    Incomplete { completed: usize, total: usize },
}
