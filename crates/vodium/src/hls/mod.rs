// HLS video-on-demand pipeline: plan -> fetch/decrypt/stage -> assemble

pub mod assembler;
pub mod config;
pub mod decryption;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod hls_downloader;
pub mod http;
pub mod planner;
pub mod playlist;
pub mod processor;
pub mod retry;
pub mod scheduler;
pub(crate) mod segment_utils;
pub mod staging;

// Re-exports for easier access
pub use config::HlsConfig;
pub use error::{ErrorKind, HlsDownloaderError};
pub use events::{DownloadEvent, FetchOutcome, PipelineState, ProgressCallback};
pub use hls_downloader::{DownloadOutcome, HlsVodDownloader};
pub use planner::{DownloadPlan, SegmentDescriptor, SegmentPlanner};
pub use scheduler::{FetchWorkerPool, PoolReport};
pub use staging::StagingStore;
