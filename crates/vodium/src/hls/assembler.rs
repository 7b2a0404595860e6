// HLS Assembler: concatenates staged segments in ordinal order into the final artifact.

use std::path::PathBuf;

use tokio::fs::{self, OpenOptions};
use tokio::io::{self, AsyncWriteExt};
use tracing::{debug, info};

use crate::hls::HlsDownloaderError;
use crate::hls::staging::StagingStore;

pub struct Assembler {
    output_path: PathBuf,
}

impl Assembler {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    /// Appends staged segments `1..=expected`, in ordinal order, to a file inside the
    /// staging directory, moves it to the output path and removes the staging directory.
    /// Staged files with ordinals above `expected` are left out.
    ///
    /// Refuses to run unless every ordinal in `1..=expected` is staged.
    pub async fn assemble(
        &self,
        staging: StagingStore,
        expected: usize,
    ) -> Result<(PathBuf, u64), HlsDownloaderError> {
        let staged = staging.staged_within(expected).await?;
        if staged != expected {
            return Err(HlsDownloaderError::IncompleteDownload {
                completed: staged,
                total: expected,
            });
        }
        let files: Vec<PathBuf> = (1..=expected as u32)
            .map(|ordinal| staging.segment_path(ordinal))
            .collect();

        let file_name = self.output_path.file_name().ok_or_else(|| {
            HlsDownloaderError::ConfigError(format!(
                "output path {} has no file name",
                self.output_path.display()
            ))
        })?;
        let working = staging.dir().join(file_name);
        match fs::remove_file(&working).await {
            Ok(()) => debug!(path = %working.display(), "Removed stale assembly file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&working)
            .await?;
        let mut total_bytes = 0u64;
        for path in &files {
            let mut input = fs::File::open(path).await?;
            total_bytes += io::copy(&mut input, &mut output).await?;
        }
        output.flush().await?;
        output.sync_all().await?;
        drop(output);

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        match fs::remove_file(&self.output_path).await {
            Ok(()) => debug!(path = %self.output_path.display(), "Replacing existing artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(&working, &self.output_path).await?;
        staging.remove().await?;

        info!(
            path = %self.output_path.display(),
            segments = files.len(),
            bytes = total_bytes,
            "Assembled output"
        );
        Ok((self.output_path.clone(), total_bytes))
    }
}
