// HLS Fetch Worker Pool: a fixed set of workers draining one job queue built from the plan.
//
// Each job is fetch -> verify -> decrypt/trim -> persist, retried as a unit. Exhausted
// retries only count as a failed segment; errors that no retry can fix (filesystem, key
// unavailable) stop the whole pool.

use crate::hls::HlsDownloaderError;
use crate::hls::events::{DownloadEvent, FetchOutcome, ProgressCallback, completion_ratio};
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::planner::{DownloadPlan, SegmentDescriptor};
use crate::hls::processor::SegmentTransformer;
use crate::hls::retry::{RetryPolicy, retry_with_backoff};
use crate::hls::staging::StagingStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Aggregate of one pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Segments staged at the end of the run, including ones staged by earlier runs
    pub completed: usize,
    pub total: usize,
    /// Segments whose retries were exhausted
    pub failed: usize,
    /// Segments found already staged and not fetched again
    pub resumed: usize,
}

impl PoolReport {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

enum JobStatus {
    AlreadyStaged,
    Staged,
}

struct WorkerContext {
    fetcher: Arc<dyn SegmentDownloader>,
    processor: Arc<dyn SegmentTransformer>,
    staging: StagingStore,
    retry_policy: RetryPolicy,
    progress: Option<ProgressCallback>,
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    resumed: AtomicUsize,
}

impl WorkerContext {
    fn emit(&self, segment: &SegmentDescriptor, outcome: FetchOutcome) {
        if let Some(progress) = &self.progress {
            let ratio = completion_ratio(self.completed.load(Ordering::Relaxed), self.total);
            progress(DownloadEvent::segment(ratio, segment.url.as_str(), outcome));
        }
    }
}

pub struct FetchWorkerPool {
    concurrency: usize,
    retry_policy: RetryPolicy,
    fetcher: Arc<dyn SegmentDownloader>,
    processor: Arc<dyn SegmentTransformer>,
    staging: StagingStore,
    progress: Option<ProgressCallback>,
}

impl FetchWorkerPool {
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        fetcher: Arc<dyn SegmentDownloader>,
        processor: Arc<dyn SegmentTransformer>,
        staging: StagingStore,
    ) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retry_policy,
            fetcher,
            processor,
            staging,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs every job of `plan` to exhaustion and returns once all workers are done.
    ///
    /// Returns `Err` on a fatal error or when `token` is cancelled; staged files are kept
    /// in both cases.
    pub async fn run(
        &self,
        plan: &DownloadPlan,
        token: &CancellationToken,
    ) -> Result<PoolReport, HlsDownloaderError> {
        let total = plan.len();
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        for segment in plan.iter() {
            // The receiver is alive until the end of this function.
            let _ = job_tx.send(segment.clone());
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let context = Arc::new(WorkerContext {
            fetcher: Arc::clone(&self.fetcher),
            processor: Arc::clone(&self.processor),
            staging: self.staging.clone(),
            retry_policy: self.retry_policy.clone(),
            progress: self.progress.clone(),
            total,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            resumed: AtomicUsize::new(0),
        });

        // Fatal errors stop the other workers without cancelling the caller's token.
        let pool_token = token.child_token();
        let workers = self.concurrency.min(total).max(1);
        info!(segments = total, workers, "Starting segment workers");

        let mut join_set = JoinSet::new();
        for worker_id in 0..workers {
            join_set.spawn(Self::worker(
                worker_id,
                Arc::clone(&context),
                Arc::clone(&job_rx),
                pool_token.clone(),
            ));
        }

        let mut fatal: Option<HlsDownloaderError> = None;
        while let Some(joined) = join_set.join_next().await {
            let result = joined.map_err(|e| {
                HlsDownloaderError::InternalError(format!("segment worker panicked: {e}"))
            });
            match result.and_then(|r| r) {
                Ok(()) => {}
                Err(e) => {
                    pool_token.cancel();
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        if let Some(err) = fatal {
            error!(error = %err, "Segment workers stopped on a fatal error");
            return Err(err);
        }
        if token.is_cancelled() {
            return Err(HlsDownloaderError::Cancelled);
        }

        let report = PoolReport {
            completed: context.completed.load(Ordering::SeqCst),
            total,
            failed: context.failed.load(Ordering::SeqCst),
            resumed: context.resumed.load(Ordering::SeqCst),
        };
        info!(
            completed = report.completed,
            total = report.total,
            failed = report.failed,
            resumed = report.resumed,
            "Segment workers finished"
        );
        Ok(report)
    }

    async fn worker(
        worker_id: usize,
        context: Arc<WorkerContext>,
        jobs: Arc<Mutex<mpsc::UnboundedReceiver<SegmentDescriptor>>>,
        token: CancellationToken,
    ) -> Result<(), HlsDownloaderError> {
        loop {
            if token.is_cancelled() {
                debug!(worker_id, "Worker stopping on cancellation");
                return Ok(());
            }
            let Some(segment) = jobs.lock().await.recv().await else {
                debug!(worker_id, "Job queue drained");
                return Ok(());
            };

            match Self::process_job(&context, &segment, &token).await {
                Ok(status) => {
                    context.completed.fetch_add(1, Ordering::SeqCst);
                    if matches!(status, JobStatus::AlreadyStaged) {
                        context.resumed.fetch_add(1, Ordering::SeqCst);
                    }
                    context.emit(
                        &segment,
                        FetchOutcome {
                            ordinal: segment.ordinal,
                            success: true,
                            error_kind: None,
                        },
                    );
                }
                Err(HlsDownloaderError::Cancelled) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    context.failed.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        ordinal = segment.ordinal,
                        url = %segment.url,
                        error = %e,
                        "Segment failed after all attempts"
                    );
                    context.emit(
                        &segment,
                        FetchOutcome {
                            ordinal: segment.ordinal,
                            success: false,
                            error_kind: Some(e.kind()),
                        },
                    );
                }
                Err(e) => {
                    context.emit(
                        &segment,
                        FetchOutcome {
                            ordinal: segment.ordinal,
                            success: false,
                            error_kind: Some(e.kind()),
                        },
                    );
                    token.cancel();
                    return Err(e);
                }
            }
        }
    }

    #[instrument(skip_all, fields(ordinal = segment.ordinal))]
    async fn process_job(
        context: &WorkerContext,
        segment: &SegmentDescriptor,
        token: &CancellationToken,
    ) -> Result<JobStatus, HlsDownloaderError> {
        if context.staging.is_staged(segment.ordinal).await? {
            debug!("Already staged, skipping");
            return Ok(JobStatus::AlreadyStaged);
        }

        retry_with_backoff(&context.retry_policy, token, |attempt| async move {
            debug!(attempt = attempt + 1, url = %segment.url, "Fetching segment");
            let raw = context.fetcher.download_segment(segment).await?;
            let data = context.processor.process_segment(raw, segment).await?;
            context.staging.write(segment.ordinal, &data).await?;
            Ok(())
        })
        .await?;

        Ok(JobStatus::Staged)
    }
}
