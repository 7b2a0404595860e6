//! # Staging Store
//!
//! Durable per-ordinal storage for one output file. The directory name is derived from
//! the output file name, so a later run with the same output reuses whatever an earlier
//! run managed to stage.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::segment_utils::{ordinal_from_file_name, staged_file_name};

/// Raw text of the media playlist, kept so a resumed run plans the same segments.
pub const PLAYLIST_FILE_NAME: &str = "playlist.m3u8";

const PARTIAL_SUFFIX: &str = "part";

#[derive(Debug, Clone)]
pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    /// Opens `dir`, creating it if needed. Existing staged segments are kept.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, HlsDownloaderError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!(path = %dir.display(), "Staging directory ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deletes everything staged so far and starts from an empty directory.
    pub async fn clear(&self) -> Result<(), HlsDownloaderError> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.dir).await?;
        debug!(path = %self.dir.display(), "Staging directory cleared");
        Ok(())
    }

    pub fn segment_path(&self, ordinal: u32) -> PathBuf {
        self.dir.join(staged_file_name(ordinal))
    }

    pub async fn is_staged(&self, ordinal: u32) -> Result<bool, HlsDownloaderError> {
        Ok(fs::try_exists(self.segment_path(ordinal)).await?)
    }

    /// Persists `data` for `ordinal`. The bytes land in a `.part` file first and are
    /// renamed into place, so a staged name always refers to a complete segment.
    pub async fn write(&self, ordinal: u32, data: &Bytes) -> Result<PathBuf, HlsDownloaderError> {
        let path = self.segment_path(ordinal);
        let mut partial = path.clone().into_os_string();
        partial.push(".");
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        fs::write(&partial, data).await?;
        if let Err(e) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(path)
    }

    /// Staged segment files sorted by name, which is ordinal order.
    pub async fn staged_files(&self) -> Result<Vec<PathBuf>, HlsDownloaderError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if ordinal_from_file_name(name).is_some() && entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub async fn staged_count(&self) -> Result<usize, HlsDownloaderError> {
        Ok(self.staged_files().await?.len())
    }

    /// Number of ordinals in `1..=total` that have a staged segment. Files left over from
    /// a longer plan are not counted.
    pub async fn staged_within(&self, total: usize) -> Result<usize, HlsDownloaderError> {
        Ok(self
            .staged_files()
            .await?
            .iter()
            .filter_map(|path| path.file_name()?.to_str().and_then(ordinal_from_file_name))
            .filter(|&ordinal| ordinal >= 1 && ordinal as usize <= total)
            .count())
    }

    pub async fn read_playlist(&self) -> Result<Option<String>, HlsDownloaderError> {
        match fs::read_to_string(self.dir.join(PLAYLIST_FILE_NAME)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_playlist(&self, text: &str) -> Result<(), HlsDownloaderError> {
        fs::write(self.dir.join(PLAYLIST_FILE_NAME), text).await?;
        Ok(())
    }

    /// Removes the whole staging directory.
    pub async fn remove(self) -> Result<(), HlsDownloaderError> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %self.dir.display(), error = %e, "Failed to remove staging directory");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_within_ignores_ordinals_outside_the_plan() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StagingStore::open(tmp.path().join(".movie.mp4")).await.unwrap();
        for ordinal in [1, 2, 4, 9] {
            store.write(ordinal, &Bytes::from_static(b"\x47")).await.unwrap();
        }
        assert_eq!(store.staged_count().await.unwrap(), 4);
        assert_eq!(store.staged_within(3).await.unwrap(), 2);
        assert_eq!(store.staged_within(4).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn write_then_is_staged() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StagingStore::open(tmp.path().join(".movie.mp4")).await.unwrap();

        assert!(!store.is_staged(1).await.unwrap());
        let path = store.write(1, &Bytes::from_static(b"\x47abc")).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "00001.ts");
        assert!(store.is_staged(1).await.unwrap());
        assert!(!tmp.path().join(".movie.mp4/00001.ts.part").exists());
        assert_eq!(std::fs::read(path).unwrap(), b"\x47abc");
    }

    #[tokio::test]
    async fn staged_files_are_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StagingStore::open(tmp.path().join(".out.ts")).await.unwrap();
        for ordinal in [12, 3, 1] {
            store.write(ordinal, &Bytes::from_static(b"\x47")).await.unwrap();
        }
        store.write_playlist("#EXTM3U\n").await.unwrap();
        std::fs::write(store.dir().join("00004.ts.part"), b"half").unwrap();

        let names: Vec<String> = store
            .staged_files()
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["00001.ts", "00003.ts", "00012.ts"]);
        assert_eq!(store.staged_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reopen_keeps_previous_work() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".movie.mp4");
        let store = StagingStore::open(&dir).await.unwrap();
        store.write(2, &Bytes::from_static(b"\x47")).await.unwrap();
        store.write_playlist("#EXTM3U\n#EXT-X-ENDLIST\n").await.unwrap();

        let reopened = StagingStore::open(&dir).await.unwrap();
        assert!(reopened.is_staged(2).await.unwrap());
        assert_eq!(
            reopened.read_playlist().await.unwrap().as_deref(),
            Some("#EXTM3U\n#EXT-X-ENDLIST\n")
        );
    }

    #[tokio::test]
    async fn clear_empties_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StagingStore::open(tmp.path().join(".movie.mp4")).await.unwrap();
        store.write(1, &Bytes::from_static(b"\x47")).await.unwrap();
        store.write_playlist("#EXTM3U\n").await.unwrap();

        store.clear().await.unwrap();
        assert!(store.dir().exists());
        assert_eq!(store.staged_count().await.unwrap(), 0);
        assert!(store.read_playlist().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_deletes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(".movie.mp4");
        let store = StagingStore::open(&dir).await.unwrap();
        store.write(1, &Bytes::from_static(b"\x47")).await.unwrap();
        store.remove().await.unwrap();
        assert!(!dir.exists());
    }
}
