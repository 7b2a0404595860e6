use std::path::PathBuf;
use std::time::Duration;

use crate::DownloaderConfig;
use crate::hls::retry::RetryPolicy;

pub const DEFAULT_OUTPUT_NAME: &str = "movie.mp4";

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub scheduler_config: HlsSchedulerConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub decryption_config: HlsDecryptionConfig,
    pub output_config: HlsOutputConfig,
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone)]
pub struct HlsSchedulerConfig {
    /// Number of workers draining the segment queue
    pub download_concurrency: usize,
}

impl Default for HlsSchedulerConfig {
    fn default() -> Self {
        Self {
            download_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    pub playlist_fetch_timeout: Duration,
    pub segment_download_timeout: Duration,
    /// Total attempts per segment, the first one included
    pub max_segment_attempts: u32,
    pub segment_retry_delay_base: Duration, // Base for exponential backoff
    pub segment_retry_max_delay: Duration,
    pub retry_jitter: bool,
    pub key_download_timeout: Duration,
    pub max_key_attempts: u32,
    pub key_retry_delay_base: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            playlist_fetch_timeout: Duration::from_secs(15),
            segment_download_timeout: Duration::from_secs(60),
            max_segment_attempts: 5,
            segment_retry_delay_base: Duration::from_millis(200),
            segment_retry_max_delay: Duration::from_secs(5),
            retry_jitter: true,
            key_download_timeout: Duration::from_secs(15),
            max_key_attempts: 3,
            key_retry_delay_base: Duration::from_millis(200),
        }
    }
}

impl HlsFetcherConfig {
    pub fn segment_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_segment_attempts.max(1),
            base_delay: self.segment_retry_delay_base,
            max_delay: self.segment_retry_max_delay,
            jitter: self.retry_jitter,
        }
    }

    pub fn key_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_key_attempts.max(1),
            base_delay: self.key_retry_delay_base,
            max_delay: self.segment_retry_max_delay,
            jitter: self.retry_jitter,
        }
    }
}

// --- Decryption Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsDecryptionConfig {
    /// Run AES decryption on tokio's blocking pool instead of inline
    pub offload_decryption_to_cpu_pool: bool,
}

// --- Output Configuration ---
#[derive(Debug, Clone)]
pub struct HlsOutputConfig {
    /// Directory receiving the final artifact
    pub target_dir: PathBuf,
    /// File name of the final artifact
    pub file_name: String,
    /// Clear any previous staging before planning
    pub force: bool,
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("."),
            file_name: DEFAULT_OUTPUT_NAME.to_owned(),
            force: false,
        }
    }
}

impl HlsOutputConfig {
    /// `<target-dir>/.<file-name>`, stable across invocations so runs can resume.
    pub fn staging_dir(&self) -> PathBuf {
        self.target_dir.join(format!(".{}", self.file_name))
    }

    pub fn output_path(&self) -> PathBuf {
        self.target_dir.join(&self.file_name)
    }
}
