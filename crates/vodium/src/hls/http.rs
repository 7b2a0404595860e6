// HLS Request Contract: one place that decides how playlist, key and segment GETs look.

use reqwest::header::{COOKIE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{trace, warn};
use url::Url;

use crate::DownloaderConfig;
use crate::hls::HlsDownloaderError;

/// Issues GET requests with the per-run headers on top of the client defaults.
#[derive(Debug, Clone)]
pub struct HttpRequester {
    http_client: Client,
    headers: HeaderMap,
}

impl HttpRequester {
    /// `origin` is the playlist URL; its origin becomes the referer unless one is configured.
    pub fn new(http_client: Client, config: &DownloaderConfig, origin: &Url) -> Self {
        let mut headers = HeaderMap::new();

        if let Some(cookie) = &config.cookie {
            match HeaderValue::from_str(cookie) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(_) => warn!("Ignoring cookie that is not a valid header value"),
            }
        }

        let referer = config
            .referer
            .clone()
            .unwrap_or_else(|| origin_of(origin));
        match HeaderValue::from_str(&referer) {
            Ok(value) => {
                headers.insert(REFERER, value);
            }
            Err(_) => warn!(referer = %referer, "Ignoring referer that is not a valid header value"),
        }

        Self {
            http_client,
            headers,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sends the request and maps any non-2xx status to `HttpStatus`.
    pub async fn get(&self, url: &Url, timeout: Duration) -> Result<Response, HlsDownloaderError> {
        trace!(url = %url, "GET");
        let mut request = self.http_client.get(url.clone()).headers(self.headers.clone());
        if !timeout.is_zero() {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(HlsDownloaderError::HttpStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

/// `scheme://host[:port]` of a URL.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}
