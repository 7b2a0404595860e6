use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;
use vodium_engine::{DownloadEvent, PipelineState};

/// Resolution of the bar; pipeline progress is a fraction in `[0, 1]`.
const BAR_LENGTH: u64 = 1000;

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {percent}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Drives a single indicatif bar from pipeline events.
#[derive(Clone)]
pub struct ProgressManager {
    bar: Option<ProgressBar>,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new(BAR_LENGTH));
        bar.set_style(download_style());
        bar.enable_steady_tick(Duration::from_millis(500));
        Self { bar: Some(bar) }
    }

    pub fn new_disabled() -> Self {
        Self { bar: None }
    }

    pub fn handle_event(&self, event: DownloadEvent) {
        let Some(bar) = &self.bar else {
            return;
        };

        bar.set_position(position(event.progress));
        match event.state {
            PipelineState::SegmentsFetching => {
                if let Some(outcome) = &event.outcome {
                    if !outcome.success {
                        bar.println(format!("segment {} failed", outcome.ordinal));
                    }
                } else {
                    bar.set_message("Downloading segments");
                }
            }
            PipelineState::Completed => {
                bar.finish_with_message(format!("Saved {}", event.subject));
            }
            PipelineState::Failed => {
                bar.abandon_with_message(format!("Failed: {}", event.subject));
            }
            state => bar.set_message(state.label().to_string()),
        }
    }

    #[inline]
    #[allow(unused)]
    pub fn is_disabled(&self) -> bool {
        self.bar.is_none()
    }
}

fn position(progress: f64) -> u64 {
    (progress.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    #[test]
    fn fraction_maps_onto_bar_length() {
        assert_eq!(position(0.0), 0);
        assert_eq!(position(0.5), 500);
        assert_eq!(position(1.0), BAR_LENGTH);
        assert_eq!(position(3.0), BAR_LENGTH);
    }

    #[test]
    fn disabled_manager_ignores_events() {
        let manager = ProgressManager::new_disabled();
        assert!(manager.is_disabled());
        manager.handle_event(DownloadEvent::transition(PipelineState::Completed, 1.0, "x"));
    }

    #[test]
    fn completion_finishes_bar() {
        let manager = ProgressManager::new(MultiProgress::with_draw_target(
            ProgressDrawTarget::hidden(),
        ));
        manager.handle_event(DownloadEvent::transition(
            PipelineState::SegmentsFetching,
            0.25,
            "staging",
        ));
        manager.handle_event(DownloadEvent::transition(PipelineState::Completed, 1.0, "out.ts"));
        let bar = manager.bar.as_ref().unwrap();
        assert!(bar.is_finished());
        assert_eq!(bar.position(), BAR_LENGTH);
    }
}
