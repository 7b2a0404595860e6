// HLS Segment Planner: turns a parsed media playlist into an ordered, fully-resolved
// download plan.

use m3u8_rs::{Key, KeyMethod, MediaPlaylist, MediaSegment};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::hls::HlsDownloaderError;

/// Staged file names carry a 5-digit ordinal, so a plan may not outgrow it.
pub const MAX_PLAN_SEGMENTS: usize = 99_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    Aes128Cbc,
}

/// Reference to a decryption key. The raw key bytes are owned by the `KeyResolver`
/// cache and looked up by `uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    pub uri: Url,
    pub method: EncryptionMethod,
    pub iv: Option<[u8; 16]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// 1-based position in playlist order
    pub ordinal: u32,
    pub url: Url,
    pub key: Option<Arc<EncryptionKey>>,
}

/// Ordered segments; ordinals are exactly `1..=len` in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadPlan {
    segments: Vec<SegmentDescriptor>,
}

impl DownloadPlan {
    /// Validates that ordinals are contiguous from 1 and within the staging name width.
    pub fn new(segments: Vec<SegmentDescriptor>) -> Result<Self, HlsDownloaderError> {
        if segments.len() > MAX_PLAN_SEGMENTS {
            return Err(HlsDownloaderError::PlaylistError(format!(
                "Playlist has {} segments, at most {MAX_PLAN_SEGMENTS} are supported",
                segments.len()
            )));
        }
        for (idx, segment) in segments.iter().enumerate() {
            if segment.ordinal as usize != idx + 1 {
                return Err(HlsDownloaderError::PlaylistError(format!(
                    "Segment {} has ordinal {}, expected {}",
                    segment.url,
                    segment.ordinal,
                    idx + 1
                )));
            }
        }
        Ok(Self { segments })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentDescriptor> {
        self.segments.iter()
    }

    /// Number of distinct key identifiers referenced by the plan.
    pub fn distinct_keys(&self) -> usize {
        let mut uris: Vec<&Url> = self
            .segments
            .iter()
            .filter_map(|s| s.key.as_ref().map(|k| &k.uri))
            .collect();
        uris.sort();
        uris.dedup();
        uris.len()
    }
}

impl IntoIterator for DownloadPlan {
    type Item = SegmentDescriptor;
    type IntoIter = std::vec::IntoIter<SegmentDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.into_iter()
    }
}

pub struct SegmentPlanner;

impl SegmentPlanner {
    /// Builds the plan for `playlist`, resolving relative URIs against `base_url`
    /// (the playlist's own URL, so resolution is directory-relative).
    ///
    /// An `EXT-X-KEY` tag stays in effect for every following segment until the next
    /// tag replaces it; `METHOD=NONE` clears it. Any method other than AES-128 fails
    /// the whole plan.
    pub fn plan(
        playlist: &MediaPlaylist,
        base_url: &Url,
    ) -> Result<DownloadPlan, HlsDownloaderError> {
        let mut segments = Vec::with_capacity(playlist.segments.len());
        let mut interned: HashMap<(Url, Option<[u8; 16]>), Arc<EncryptionKey>> = HashMap::new();
        let mut active_key: Option<Arc<EncryptionKey>> = None;

        for segment in &playlist.segments {
            if let Some(key) = &segment.key {
                active_key = Self::resolve_key(key, base_url)?.map(|key| {
                    interned
                        .entry((key.uri.clone(), key.iv))
                        .or_insert_with(|| Arc::new(key))
                        .clone()
                });
            } else if Self::clears_key(segment) {
                active_key = None;
            }

            let uri = segment.uri.trim();
            if uri.is_empty() {
                debug!("Skipping segment with empty URI");
                continue;
            }

            let url = base_url.join(uri).map_err(|e| {
                HlsDownloaderError::PlaylistError(format!(
                    "Could not join base URL {base_url} with segment URI {uri}: {e}"
                ))
            })?;

            segments.push(SegmentDescriptor {
                ordinal: segments.len() as u32 + 1,
                url,
                key: active_key.clone(),
            });
        }

        let plan = DownloadPlan::new(segments)?;
        debug!(
            segments = plan.len(),
            keys = plan.distinct_keys(),
            "Download plan ready"
        );
        Ok(plan)
    }

    /// m3u8-rs only accepts `METHOD=NONE` when an IV is also present; without one the
    /// tag is kept as an unknown `X-KEY` tag on the segment.
    fn clears_key(segment: &MediaSegment) -> bool {
        segment.unknown_tags.iter().any(|tag| {
            tag.tag == "X-KEY"
                && tag.rest.as_deref().is_some_and(|rest| {
                    rest.split(',')
                        .any(|attr| attr.trim().eq_ignore_ascii_case("METHOD=NONE"))
                })
        })
    }

    fn resolve_key(key: &Key, base_url: &Url) -> Result<Option<EncryptionKey>, HlsDownloaderError> {
        match &key.method {
            KeyMethod::None => Ok(None),
            KeyMethod::AES128 => {
                let uri = key.uri.as_deref().map(str::trim).unwrap_or_default();
                if uri.is_empty() {
                    return Err(HlsDownloaderError::PlaylistError(
                        "AES-128 key tag without URI".to_string(),
                    ));
                }
                let uri = base_url.join(uri).map_err(|e| {
                    HlsDownloaderError::PlaylistError(format!(
                        "Could not join base URL {base_url} with key URI {uri}: {e}"
                    ))
                })?;
                let iv = key.iv.as_deref().map(parse_iv).transpose()?;
                Ok(Some(EncryptionKey {
                    uri,
                    method: EncryptionMethod::Aes128Cbc,
                    iv,
                }))
            }
            other => Err(HlsDownloaderError::UnsupportedEncryption(format!("{other}"))),
        }
    }
}

/// Parses an `EXT-X-KEY` IV attribute (hex, optional `0x` prefix).
pub fn parse_iv(iv_hex_str: &str) -> Result<[u8; 16], HlsDownloaderError> {
    let iv_str = iv_hex_str
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let mut iv_bytes = [0u8; 16];
    hex::decode_to_slice(iv_str, &mut iv_bytes).map_err(|e| {
        HlsDownloaderError::PlaylistError(format!("Failed to parse IV '{iv_hex_str}': {e}"))
    })?;
    Ok(iv_bytes)
}
