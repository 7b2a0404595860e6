use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::hls::assembler::Assembler;
use crate::hls::decryption::{DecryptionOffloader, KeyFetcher, KeyResolver};
use crate::hls::events::{DownloadEvent, PipelineState, ProgressCallback, completion_ratio};
use crate::hls::fetcher::SegmentFetcher;
use crate::hls::http::HttpRequester;
use crate::hls::planner::{DownloadPlan, SegmentPlanner};
use crate::hls::playlist::{PlaylistLoader, PlaylistOrigin};
use crate::hls::processor::SegmentProcessor;
use crate::hls::scheduler::FetchWorkerPool;
use crate::hls::staging::StagingStore;
use crate::{DownloadError, create_client, hls::HlsDownloaderError};

use super::HlsConfig;

/// How a run that did not hit a fatal error ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Every segment was staged and the artifact was assembled.
    Completed { path: PathBuf, bytes: u64 },
    /// Some segments exhausted their retries. Staging is kept for a later run.
    Partial { completed: usize, total: usize },
}

/// Downloads one HLS VOD asset into a single file.
pub struct HlsVodDownloader {
    client: Client,
    config: HlsConfig,
    progress: Option<ProgressCallback>,
}

impl HlsVodDownloader {
    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        let client = create_client(&config.base)?;
        Ok(Self::with_client(client, config))
    }

    /// Uses an already built client, e.g. one shared with other downloads.
    pub fn with_client(client: Client, config: HlsConfig) -> Self {
        Self {
            client,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &HlsConfig {
        &self.config
    }

    fn emit(&self, state: PipelineState, progress: f64, subject: impl Into<String>) {
        if let Some(callback) = &self.progress {
            callback(DownloadEvent::transition(state, progress, subject));
        }
    }

    /// Fetches the media playlist at `url`, plans it and runs the pipeline.
    pub async fn download(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<DownloadOutcome, HlsDownloaderError> {
        self.emit(PipelineState::Init, 0.0, url);
        let mut staging = None;
        let result = self.download_inner(url, token, &mut staging).await;
        self.finish(result, staging).await
    }

    /// Runs the pipeline for a plan built by the caller. The referer defaults to the
    /// origin of the first segment.
    pub async fn download_plan(
        &self,
        plan: DownloadPlan,
        token: &CancellationToken,
    ) -> Result<DownloadOutcome, HlsDownloaderError> {
        let subject = plan
            .segments()
            .first()
            .map(|s| s.url.to_string())
            .unwrap_or_default();
        self.emit(PipelineState::Init, 0.0, subject);
        let mut staging = None;
        let result = self.download_plan_inner(plan, token, &mut staging).await;
        self.finish(result, staging).await
    }

    async fn download_plan_inner(
        &self,
        plan: DownloadPlan,
        token: &CancellationToken,
        staging: &mut Option<StagingStore>,
    ) -> Result<DownloadOutcome, HlsDownloaderError> {
        let origin = plan
            .segments()
            .first()
            .map(|s| s.url.clone())
            .ok_or_else(|| {
                HlsDownloaderError::PlaylistError("Plan contains no segments".to_string())
            })?;
        if let Some(outcome) = self.existing_artifact().await? {
            return Ok(outcome);
        }
        let store = self.open_staging().await?;
        *staging = Some(store.clone());
        let requester = HttpRequester::new(self.client.clone(), &self.config.base, &origin);
        self.fetch_and_assemble(plan, store, requester, token).await
    }

    async fn download_inner(
        &self,
        url: &str,
        token: &CancellationToken,
        staging: &mut Option<StagingStore>,
    ) -> Result<DownloadOutcome, HlsDownloaderError> {
        let playlist_url = Url::parse(url).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!("Invalid playlist URL {url}: {e}"))
        })?;
        if let Some(outcome) = self.existing_artifact().await? {
            return Ok(outcome);
        }
        let store = self.open_staging().await?;
        *staging = Some(store.clone());

        let requester = HttpRequester::new(self.client.clone(), &self.config.base, &playlist_url);
        let loader = PlaylistLoader::new(
            requester.clone(),
            self.config.fetcher_config.playlist_fetch_timeout,
        );
        let (text, origin) = loader.load_text(&playlist_url, &store).await?;
        self.emit(PipelineState::PlaylistFetched, 0.0, playlist_url.as_str());

        let playlist = PlaylistLoader::parse_media(&text, &playlist_url)?;
        let plan = SegmentPlanner::plan(&playlist, &playlist_url)?;
        if plan.is_empty() {
            return Err(HlsDownloaderError::PlaylistError(format!(
                "Playlist {playlist_url} contains no segments"
            )));
        }
        if origin == PlaylistOrigin::Network {
            store.write_playlist(&text).await?;
        }
        info!(
            url = %playlist_url,
            segments = plan.len(),
            keys = plan.distinct_keys(),
            "Playlist parsed"
        );
        self.emit(PipelineState::PlaylistParsed, 0.0, playlist_url.as_str());

        self.fetch_and_assemble(plan, store, requester, token).await
    }

    /// A finished artifact with no staging directory next to it is the result of an
    /// earlier completed run; without `force` it is returned as is.
    async fn existing_artifact(&self) -> Result<Option<DownloadOutcome>, HlsDownloaderError> {
        let output = &self.config.output_config;
        if output.force || tokio::fs::try_exists(output.staging_dir()).await? {
            return Ok(None);
        }
        let path = output.output_path();
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                info!(path = %path.display(), "Output already downloaded, nothing to fetch");
                Ok(Some(DownloadOutcome::Completed {
                    path,
                    bytes: metadata.len(),
                }))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_staging(&self) -> Result<StagingStore, HlsDownloaderError> {
        let output = &self.config.output_config;
        let store = StagingStore::open(output.staging_dir()).await?;
        if output.force {
            info!(path = %store.dir().display(), "Force enabled, discarding staged segments");
            store.clear().await?;
        }
        Ok(store)
    }

    async fn fetch_and_assemble(
        &self,
        plan: DownloadPlan,
        staging: StagingStore,
        requester: HttpRequester,
        token: &CancellationToken,
    ) -> Result<DownloadOutcome, HlsDownloaderError> {
        let total = plan.len();
        let fetcher_config = &self.config.fetcher_config;
        self.emit(
            PipelineState::SegmentsFetching,
            0.0,
            staging.dir().display().to_string(),
        );

        let key_fetcher = KeyFetcher::new(
            requester.clone(),
            fetcher_config.key_download_timeout,
            fetcher_config.key_retry_policy(),
            token.clone(),
        );
        let key_resolver = Arc::new(KeyResolver::new(Arc::new(key_fetcher)));
        let processor = SegmentProcessor::new(
            key_resolver,
            DecryptionOffloader::new(
                self.config
                    .decryption_config
                    .offload_decryption_to_cpu_pool,
            ),
        );
        let fetcher = SegmentFetcher::new(requester, fetcher_config.segment_download_timeout);

        let pool = FetchWorkerPool::new(
            self.config.scheduler_config.download_concurrency,
            fetcher_config.segment_retry_policy(),
            Arc::new(fetcher),
            Arc::new(processor),
            staging.clone(),
        )
        .with_progress(self.progress.clone());

        let report = pool.run(&plan, token).await?;
        debug!(?report, "Fetch phase finished");

        // The staging directory, not the advisory counter, decides whether to assemble.
        let staged = staging.staged_within(total).await?;
        if staged != total {
            return Ok(DownloadOutcome::Partial {
                completed: staged,
                total,
            });
        }

        let output_path = self.config.output_config.output_path();
        self.emit(
            PipelineState::Assembling,
            1.0,
            output_path.display().to_string(),
        );
        let (path, bytes) = Assembler::new(output_path).assemble(staging, total).await?;
        Ok(DownloadOutcome::Completed { path, bytes })
    }

    async fn finish(
        &self,
        result: Result<DownloadOutcome, HlsDownloaderError>,
        staging: Option<StagingStore>,
    ) -> Result<DownloadOutcome, HlsDownloaderError> {
        match result {
            Ok(DownloadOutcome::Completed { path, bytes }) => {
                info!(path = %path.display(), bytes, "Download completed");
                self.emit(PipelineState::Completed, 1.0, path.display().to_string());
                Ok(DownloadOutcome::Completed { path, bytes })
            }
            Ok(DownloadOutcome::Partial { completed, total }) => {
                warn!(completed, total, "Download incomplete, staged segments kept for resume");
                self.emit(
                    PipelineState::Failed,
                    completion_ratio(completed, total),
                    format!("{completed} of {total} segments downloaded"),
                );
                Ok(DownloadOutcome::Partial { completed, total })
            }
            Err(err) => {
                error!(error = %err, "Download failed");
                if let Some(store) = staging {
                    match store.staged_count().await {
                        // Nothing to resume from.
                        Ok(0) => {
                            if let Err(e) = store.remove().await {
                                warn!(error = %e, "Could not remove empty staging directory");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "Could not inspect staging directory, keeping it");
                        }
                    }
                }
                let progress = match &err {
                    HlsDownloaderError::IncompleteDownload { completed, total } => {
                        completion_ratio(*completed, *total)
                    }
                    _ => 0.0,
                };
                self.emit(PipelineState::Failed, progress, err.to_string());
                Err(err)
            }
        }
    }
}
