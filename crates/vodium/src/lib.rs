//! # Vodium
//!
//! A library for downloading HTTP Live Streaming video-on-demand assets into a
//! single transport-stream file.
//!
//! ## Features
//!
//! - Bounded-concurrency segment fetching with per-segment retry
//! - AES-128-CBC decryption with a single-flight key cache (key rotation supported)
//! - Resumable on-disk staging keyed by segment ordinal
//! - Deterministic, ordinal-ordered reassembly of the final artifact
//! - Cooperative cancellation and progress events

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;
pub mod protocol_builder;

pub use builder::DownloaderConfigBuilder;
pub use config::DownloaderConfig;
pub use error::DownloadError;

// Re-export downloader utilities
pub use downloader::create_client;

// Re-export the pipeline entry points
pub use hls::{
    DownloadEvent, DownloadOutcome, ErrorKind, FetchOutcome, HlsConfig, HlsDownloaderError,
    HlsVodDownloader, PipelineState, ProgressCallback,
};
pub use protocol_builder::HlsVodBuilder;
