use crate::hls::HlsDownloaderError;

// Errors raised while setting up a download, before the pipeline runs
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("TLS configuration error: {0}")]
    TlsError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HLS error: {0}")]
    HlsError(#[from] HlsDownloaderError),
}
