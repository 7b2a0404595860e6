//! # Protocol Builder
//!
//! Fluent API for configuring an [`HlsVodDownloader`].

use crate::{
    DownloadError, DownloaderConfig,
    hls::{HlsConfig, HlsVodDownloader, ProgressCallback},
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Builder for HLS VOD downloaders
#[derive(Default)]
pub struct HlsVodBuilder {
    config: HlsConfig,
    progress: Option<ProgressCallback>,
}

impl HlsVodBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_config(mut self, base_config: DownloaderConfig) -> Self {
        self.config.base = base_config;
        self
    }

    // --- Base DownloaderConfig methods ---

    /// Set user agent for HTTP requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.base.user_agent = user_agent.into();
        self
    }

    /// Set overall HTTP timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.base.timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.base.connect_timeout = timeout;
        self
    }

    /// Set HTTP headers
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.base.headers = headers;
        self
    }

    /// Add a single HTTP header
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            self.config.base.headers.insert(name, value);
        }
        self
    }

    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        let cookie = cookie.into();
        self.config.base.cookie = (!cookie.is_empty()).then_some(cookie);
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        let referer = referer.into();
        self.config.base.referer = (!referer.is_empty()).then_some(referer);
        self
    }

    // --- Pipeline methods ---

    /// Number of concurrent segment workers
    pub fn download_concurrency(mut self, workers: usize) -> Self {
        self.config.scheduler_config.download_concurrency = workers.max(1);
        self
    }

    /// Total attempts per segment, the first one included
    pub fn max_segment_attempts(mut self, attempts: u32) -> Self {
        self.config.fetcher_config.max_segment_attempts = attempts;
        self
    }

    pub fn segment_retry_delay(mut self, base: Duration, max: Duration) -> Self {
        self.config.fetcher_config.segment_retry_delay_base = base;
        self.config.fetcher_config.segment_retry_max_delay = max;
        self
    }

    pub fn offload_decryption(mut self, offload: bool) -> Self {
        self.config.decryption_config.offload_decryption_to_cpu_pool = offload;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_config.target_dir = dir.into();
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_config.file_name = name.into();
        self
    }

    /// Discard staged segments from earlier runs
    pub fn force(mut self, force: bool) -> Self {
        self.config.output_config.force = force;
        self
    }

    pub fn on_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Access the raw configuration for more advanced customization
    pub fn with_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut HlsConfig),
    {
        f(&mut self.config);
        self
    }

    /// Get a copy of the current configuration
    pub fn get_config(&self) -> HlsConfig {
        self.config.clone()
    }

    pub fn build(self) -> Result<HlsVodDownloader, DownloadError> {
        let file_name = &self.config.output_config.file_name;
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(DownloadError::InvalidConfig(format!(
                "output file name must be a plain file name, got {file_name:?}"
            )));
        }
        let downloader = HlsVodDownloader::new(self.config)?;
        Ok(match self.progress {
            Some(progress) => downloader.with_progress(progress),
            None => downloader,
        })
    }
}
