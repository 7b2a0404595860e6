use reqwest::StatusCode;
use std::sync::Arc;

/// Coarse error classification used for retry decisions and progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Integrity,
    Crypto,
    UnsupportedEncryption,
    Filesystem,
    IncompletePlan,
    Playlist,
    Cancelled,
    Internal,
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsDownloaderError {
    #[error("Playlist error: {0}")]
    PlaylistError(String),
    #[error("Network error: {source}")]
    NetworkError {
        #[from]
        source: Arc<reqwest::Error>,
    },
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },
    #[error("Integrity error: {0}")]
    IntegrityError(String),
    #[error("Decryption error: {0}")]
    DecryptionError(String),
    #[error("Unsupported encryption method: {0}")]
    UnsupportedEncryption(String),
    #[error("Decryption key {uri} unavailable: {reason}")]
    KeyUnavailable { uri: String, reason: String },
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("Incomplete download: {completed} of {total} segments staged")]
    IncompleteDownload { completed: usize, total: usize },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    InternalError(String),
}

// Manual implementation of From<reqwest::Error> for HlsDownloaderError
// because of the Arc wrapping.
impl From<reqwest::Error> for HlsDownloaderError {
    fn from(err: reqwest::Error) -> Self {
        HlsDownloaderError::NetworkError {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for HlsDownloaderError {
    fn from(err: std::io::Error) -> Self {
        HlsDownloaderError::IoError {
            source: Arc::new(err),
        }
    }
}

impl HlsDownloaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkError { .. } | Self::HttpStatus { .. } => ErrorKind::Network,
            Self::IntegrityError(_) => ErrorKind::Integrity,
            Self::DecryptionError(_) | Self::KeyUnavailable { .. } => ErrorKind::Crypto,
            Self::UnsupportedEncryption(_) => ErrorKind::UnsupportedEncryption,
            Self::IoError { .. } => ErrorKind::Filesystem,
            Self::IncompleteDownload { .. } => ErrorKind::IncompletePlan,
            Self::PlaylistError(_) | Self::ConfigError(_) => ErrorKind::Playlist,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Whether a per-segment attempt that failed with this error may be retried.
    ///
    /// A missing key is never retried per segment: the key fetch already has its
    /// own retries, and every segment depending on it is lost.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::KeyUnavailable { .. } => false,
            _ => matches!(
                self.kind(),
                ErrorKind::Network | ErrorKind::Integrity | ErrorKind::Crypto
            ),
        }
    }
}
