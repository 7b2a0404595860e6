//! # Builder for DownloaderConfig
//!
//! Fluent construction of the HTTP-layer configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vodium_engine::DownloaderConfig;
//!
//! let config = DownloaderConfig::builder()
//!     .with_timeout(Duration::from_secs(30))
//!     .with_cookie("session=abc")
//!     .with_referer("https://example.com/")
//!     .with_user_agent("vodium/0.1")
//!     .build();
//! assert_eq!(config.cookie.as_deref(), Some("session=abc"));
//! ```

use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::DownloaderConfig;

/// Builder for creating DownloaderConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct DownloaderConfigBuilder {
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: DownloaderConfig::default(),
        }
    }

    /// Set the overall timeout for a single HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Merge extra headers over the defaults; later values win
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.config.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set the cookie sent with every request. An empty string clears it.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        let cookie = cookie.into();
        self.config.cookie = (!cookie.is_empty()).then_some(cookie);
        self
    }

    /// Set an explicit referer. An empty string falls back to the playlist origin.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        let referer = referer.into();
        self.config.referer = (!referer.is_empty()).then_some(referer);
        self
    }

    /// Build the DownloaderConfig instance
    pub fn build(self) -> DownloaderConfig {
        self.config
    }
}

impl Default for DownloaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::time::Duration;

    #[test]
    fn test_builder_defaults() {
        let config = DownloaderConfigBuilder::new().build();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.follow_redirects);
        assert!(config.cookie.is_none());
        assert!(config.referer.is_none());
        assert_eq!(
            config.headers.get(reqwest::header::ACCEPT).unwrap(),
            "*/*"
        );
        assert!(config.headers.contains_key(reqwest::header::ACCEPT_LANGUAGE));
        assert!(config.headers.contains_key(reqwest::header::ACCEPT_ENCODING));
    }

    #[test]
    fn test_builder_customization() {
        let config = DownloaderConfigBuilder::new()
            .with_timeout(Duration::from_secs(5))
            .with_follow_redirects(false)
            .with_user_agent("CustomUserAgent/1.0")
            .with_headers({
                let mut extra = HeaderMap::new();
                extra.insert("x-custom-header", HeaderValue::from_static("CustomValue"));
                extra
            })
            .with_cookie("a=1; b=2")
            .with_referer("https://example.com/player")
            .build();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.follow_redirects);
        assert_eq!(config.user_agent, "CustomUserAgent/1.0");
        assert_eq!(config.cookie.as_deref(), Some("a=1; b=2"));
        assert_eq!(config.referer.as_deref(), Some("https://example.com/player"));

        let header_value = config.headers.get("X-Custom-Header").unwrap();
        assert_eq!(header_value.to_str().unwrap(), "CustomValue");
        // defaults survive a custom header
        assert!(config.headers.contains_key(reqwest::header::ACCEPT));
    }

    #[test]
    fn test_empty_cookie_and_referer_are_unset() {
        let config = DownloaderConfigBuilder::new()
            .with_cookie("")
            .with_referer("")
            .build();
        assert!(config.cookie.is_none());
        assert!(config.referer.is_none());
    }

    #[test]
    fn test_with_headers_overrides_defaults() {
        let mut extra = HeaderMap::new();
        extra.insert(reqwest::header::ACCEPT, HeaderValue::from_static("video/mp2t"));
        let config = DownloaderConfigBuilder::new().with_headers(extra).build();
        assert_eq!(
            config.headers.get(reqwest::header::ACCEPT).unwrap(),
            "video/mp2t"
        );
        assert!(config.headers.contains_key(reqwest::header::ACCEPT_LANGUAGE));
    }
}
