// HLS Segment Fetcher: Handles the raw download of individual media segments.
// Retries are applied by the worker pool around the whole fetch-process-persist step.

use crate::hls::HlsDownloaderError;
use crate::hls::http::HttpRequester;
use crate::hls::planner::SegmentDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    /// One GET attempt, returning the verified body.
    async fn download_segment(
        &self,
        segment: &SegmentDescriptor,
    ) -> Result<Bytes, HlsDownloaderError>;
}

pub struct SegmentFetcher {
    requester: HttpRequester,
    timeout: Duration,
}

impl SegmentFetcher {
    pub fn new(requester: HttpRequester, timeout: Duration) -> Self {
        Self { requester, timeout }
    }
}

/// Compares the received body length against the declared `Content-Length`.
///
/// Without a declared length only an empty body is rejected.
pub fn verify_length(declared: Option<u64>, actual: usize) -> Result<(), HlsDownloaderError> {
    match declared {
        Some(expected) if expected != actual as u64 => Err(HlsDownloaderError::IntegrityError(
            format!("received {actual} bytes, Content-Length declared {expected}"),
        )),
        None if actual == 0 => Err(HlsDownloaderError::IntegrityError(
            "empty response body".to_string(),
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl SegmentDownloader for SegmentFetcher {
    async fn download_segment(
        &self,
        segment: &SegmentDescriptor,
    ) -> Result<Bytes, HlsDownloaderError> {
        let response = self.requester.get(&segment.url, self.timeout).await?;
        let declared = response.content_length();
        let body = response.bytes().await?;
        verify_length(declared, body.len())?;

        debug!(
            ordinal = segment.ordinal,
            bytes = body.len(),
            url = %segment.url,
            "Downloaded segment"
        );
        Ok(body)
    }
}
