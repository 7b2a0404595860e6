#![allow(dead_code)]

use aes::Aes128;
use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use vodium_engine::{DownloadEvent, HlsVodBuilder, HlsVodDownloader, ProgressCallback};

struct Route {
    body: Bytes,
    /// Requests answered with 500 before the body is served
    failures: usize,
}

#[derive(Clone, Default)]
struct ServerState {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    request_counts: Arc<Mutex<HashMap<String, usize>>>,
    last_headers: Arc<Mutex<HashMap<String, HeaderMap>>>,
}

pub struct TestServer {
    base_url: String,
    state: ServerState,
}

impl TestServer {
    pub async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://127.0.0.1:{}", addr.port());

        let state = ServerState::default();
        let app = Router::new().fallback(serve_route).with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    pub fn serve(&self, path: &str, body: impl Into<Bytes>) {
        self.serve_flaky(path, body, 0);
    }

    pub fn serve_flaky(&self, path: &str, body: impl Into<Bytes>, failures: usize) {
        self.state.routes.lock().insert(
            path.to_string(),
            Route {
                body: body.into(),
                failures,
            },
        );
    }

    /// Makes every request to `path` fail.
    pub fn break_route(&self, path: &str) {
        let body = self
            .state
            .routes
            .lock()
            .remove(path)
            .map(|r| r.body)
            .unwrap_or_default();
        self.serve_flaky(path, body, usize::MAX);
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.state
            .request_counts
            .lock()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_requests(&self, prefix: &str) -> usize {
        self.state
            .request_counts
            .lock()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(_, count)| count)
            .sum()
    }

    pub fn last_header(&self, path: &str, name: &str) -> Option<String> {
        self.state
            .last_headers
            .lock()
            .get(path)
            .and_then(|headers| headers.get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

async fn serve_route(State(state): State<ServerState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let count = {
        let mut counts = state.request_counts.lock();
        let count = counts.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    };
    state
        .last_headers
        .lock()
        .insert(path.clone(), req.headers().clone());

    let routes = state.routes.lock();
    match routes.get(&path) {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(route) if count <= route.failures => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Some(route) => route.body.clone().into_response(),
    }
}

/// Two transport-stream packets tagged with `marker`, preceded by `filler` junk bytes.
pub fn ts_segment(marker: u8, filler: usize) -> Vec<u8> {
    let mut data = vec![0x00; filler];
    for _ in 0..2 {
        let mut packet = vec![marker; 188];
        packet[0] = 0x47;
        data.extend(packet);
    }
    data
}

pub fn encrypt(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    let cipher = cbc::Encryptor::<Aes128>::new_from_slices(key, iv).unwrap();
    let mut buffer = vec![0u8; (plaintext.len() / 16 + 1) * 16];
    buffer[..plaintext.len()].copy_from_slice(plaintext);
    let len = cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
        .unwrap()
        .len();
    buffer.truncate(len);
    buffer
}

pub fn media_playlist(key_line: Option<&str>, segments: &[&str]) -> String {
    let mut playlist = String::from(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:VOD\n",
    );
    if let Some(key_line) = key_line {
        playlist.push_str(key_line);
        playlist.push('\n');
    }
    for segment in segments {
        playlist.push_str("#EXTINF:4.0,\n");
        playlist.push_str(segment);
        playlist.push('\n');
    }
    playlist.push_str("#EXT-X-ENDLIST\n");
    playlist
}

pub fn event_recorder() -> (ProgressCallback, Arc<Mutex<Vec<DownloadEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let callback: ProgressCallback = Arc::new(move |event: DownloadEvent| sink.lock().push(event));
    (callback, events)
}

pub fn builder(dir: &std::path::Path) -> HlsVodBuilder {
    HlsVodBuilder::new()
        .output_dir(dir)
        .file_name("movie.ts")
        .download_concurrency(4)
        .segment_retry_delay(Duration::from_millis(1), Duration::from_millis(5))
        .timeout(Duration::from_secs(10))
}

pub fn downloader(dir: &std::path::Path) -> HlsVodDownloader {
    builder(dir).build().unwrap()
}
