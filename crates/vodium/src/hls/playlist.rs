// HLS Playlist Loader: fetches the media playlist once per output and keeps a copy in staging.

use crate::hls::HlsDownloaderError;
use crate::hls::http::HttpRequester;
use crate::hls::staging::StagingStore;
use m3u8_rs::{MediaPlaylist, parse_playlist_res};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Where the playlist text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistOrigin {
    Network,
    /// Copy stored by an earlier run in the staging directory
    Staged,
}

pub struct PlaylistLoader {
    requester: HttpRequester,
    timeout: Duration,
}

impl PlaylistLoader {
    pub fn new(requester: HttpRequester, timeout: Duration) -> Self {
        Self { requester, timeout }
    }

    /// Returns the stored playlist if this output was started before, else fetches it.
    pub async fn load_text(
        &self,
        playlist_url: &Url,
        staging: &StagingStore,
    ) -> Result<(String, PlaylistOrigin), HlsDownloaderError> {
        if let Some(text) = staging.read_playlist().await? {
            info!(url = %playlist_url, "Reusing playlist stored by a previous run");
            return Ok((text, PlaylistOrigin::Staged));
        }

        let response = self.requester.get(playlist_url, self.timeout).await?;
        let playlist_bytes = response.bytes().await?;
        let text = String::from_utf8(playlist_bytes.to_vec()).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!("Playlist content is not valid UTF-8: {e}"))
        })?;
        debug!(url = %playlist_url, bytes = text.len(), "Fetched playlist");
        Ok((text, PlaylistOrigin::Network))
    }

    /// Parses `text` as a media playlist. Master playlists are rejected.
    pub fn parse_media(text: &str, playlist_url: &Url) -> Result<MediaPlaylist, HlsDownloaderError> {
        match parse_playlist_res(text.as_bytes()) {
            Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) => Ok(pl),
            Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(HlsDownloaderError::PlaylistError(
                format!("Expected Media Playlist, got Master for {playlist_url}"),
            )),
            Err(e) => Err(HlsDownloaderError::PlaylistError(format!(
                "Failed to parse playlist {playlist_url}: {e}"
            ))),
        }
    }
}
