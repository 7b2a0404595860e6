use std::fmt;
use std::sync::Arc;

use crate::hls::error::ErrorKind;

/// Phases of one download run. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    PlaylistFetched,
    PlaylistParsed,
    SegmentsFetching,
    Assembling,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::PlaylistFetched => "playlist-fetched",
            Self::PlaylistParsed => "playlist-parsed",
            Self::SegmentsFetching => "fetching",
            Self::Assembling => "assembling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one segment job, after its last attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub ordinal: u32,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone)]
pub struct DownloadEvent {
    pub state: PipelineState,
    /// Completion ratio in `[0, 1]`
    pub progress: f64,
    /// URL or file name the event is about
    pub subject: String,
    /// Present on per-segment events only
    pub outcome: Option<FetchOutcome>,
}

impl DownloadEvent {
    pub fn transition(state: PipelineState, progress: f64, subject: impl Into<String>) -> Self {
        Self {
            state,
            progress: progress.clamp(0.0, 1.0),
            subject: subject.into(),
            outcome: None,
        }
    }

    pub fn segment(progress: f64, subject: impl Into<String>, outcome: FetchOutcome) -> Self {
        Self {
            state: PipelineState::SegmentsFetching,
            progress: progress.clamp(0.0, 1.0),
            subject: subject.into(),
            outcome: Some(outcome),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(DownloadEvent) + Send + Sync>;

/// `completed / total`, with an empty plan counting as done.
pub fn completion_ratio(completed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        completed as f64 / total as f64
    }
}
