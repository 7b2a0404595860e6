// HLS Decryption Service: Resolves AES-128 keys once per identifier and decrypts segment payloads.

use crate::hls::HlsDownloaderError;
use crate::hls::http::HttpRequester;
use crate::hls::planner::EncryptionKey;
use crate::hls::retry::{RetryPolicy, retry_with_backoff};
use aes::Aes128;
use async_trait::async_trait;
use bytes::Bytes;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const AES128_KEY_LEN: usize = 16;

/// Source of raw key bytes. `KeyFetcher` is the HTTP implementation.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_key(&self, key_uri: &Url) -> Result<Bytes, HlsDownloaderError>;
}

// --- KeyFetcher Struct ---
// Fetches raw key data over HTTP with the same request contract as segments.
pub struct KeyFetcher {
    requester: HttpRequester,
    timeout: Duration,
    retry_policy: RetryPolicy,
    token: CancellationToken,
}

impl KeyFetcher {
    pub fn new(
        requester: HttpRequester,
        timeout: Duration,
        retry_policy: RetryPolicy,
        token: CancellationToken,
    ) -> Self {
        Self {
            requester,
            timeout,
            retry_policy,
            token,
        }
    }
}

#[async_trait]
impl KeySource for KeyFetcher {
    async fn fetch_key(&self, key_uri: &Url) -> Result<Bytes, HlsDownloaderError> {
        retry_with_backoff(&self.retry_policy, &self.token, |attempt| async move {
            debug!(url = %key_uri, attempt = attempt + 1, "Fetching decryption key");
            let response = self.requester.get(key_uri, self.timeout).await?;
            Ok(response.bytes().await?)
        })
        .await
    }
}

// --- KeyResolver Struct ---
/// Memoizing, single-flight key cache for one pipeline run.
///
/// Concurrent first requests for the same identifier share a single fetch; later
/// requests read the cached bytes. Failed fetches are not cached.
pub struct KeyResolver {
    source: Arc<dyn KeySource>,
    keys: Cache<String, Bytes>,
}

impl KeyResolver {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            keys: Cache::builder().max_capacity(1024).build(),
        }
    }

    /// Returns the 16 raw key bytes for `key`. Any failure is `KeyUnavailable`.
    pub async fn resolve(&self, key: &EncryptionKey) -> Result<Bytes, HlsDownloaderError> {
        let source = self.source.clone();
        let uri = key.uri.clone();
        self.keys
            .try_get_with(key.uri.to_string(), async move {
                let bytes = source.fetch_key(&uri).await.map_err(|e| match e {
                    HlsDownloaderError::Cancelled => HlsDownloaderError::Cancelled,
                    other => HlsDownloaderError::KeyUnavailable {
                        uri: uri.to_string(),
                        reason: other.to_string(),
                    },
                })?;
                if bytes.len() != AES128_KEY_LEN {
                    return Err(HlsDownloaderError::KeyUnavailable {
                        uri: uri.to_string(),
                        reason: format!(
                            "incorrect length: {} bytes (expected {AES128_KEY_LEN})",
                            bytes.len()
                        ),
                    });
                }
                debug!(url = %uri, "Decryption key cached");
                Ok(bytes)
            })
            .await
            .map_err(|e: Arc<HlsDownloaderError>| (*e).clone())
    }

    /// Number of keys currently cached.
    pub async fn cached_keys(&self) -> u64 {
        self.keys.run_pending_tasks().await;
        self.keys.entry_count()
    }
}

// --- DecryptionOffloader Struct ---
/// Runs AES-128-CBC decryption inline or on tokio's blocking pool.
pub struct DecryptionOffloader {
    enabled: bool,
}

impl DecryptionOffloader {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub async fn decrypt(
        &self,
        data: Bytes,
        key: &[u8; 16],
        iv: &[u8; 16],
    ) -> Result<Bytes, HlsDownloaderError> {
        if !self.enabled {
            return Self::decrypt_sync(data, key, iv);
        }
        let key = *key;
        let iv = *iv;
        tokio::task::spawn_blocking(move || Self::decrypt_sync(data, &key, &iv))
            .await
            .map_err(|e| {
                HlsDownloaderError::DecryptionError(format!("Decryption offload task failed: {e}"))
            })?
    }

    /// Decrypts and strips PKCS#7 padding.
    pub fn decrypt_sync(
        data: Bytes,
        key: &[u8; 16],
        iv: &[u8; 16],
    ) -> Result<Bytes, HlsDownloaderError> {
        let mut buffer = data.to_vec();
        let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| {
            HlsDownloaderError::DecryptionError(format!("Failed to initialize AES decryptor: {e}"))
        })?;

        let decrypted_len = cipher
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map_err(|e| HlsDownloaderError::DecryptionError(format!("Decryption failed: {e}")))?
            .len();

        buffer.truncate(decrypted_len);
        Ok(Bytes::from(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::planner::EncryptionMethod;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    fn encrypt_data(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
        use cipher::BlockEncryptMut;
        let cipher = Aes128CbcEnc::new_from_slices(key, iv).unwrap();
        let padded_len = ((plaintext.len() / 16) + 1) * 16;
        let mut buffer = vec![0u8; padded_len];
        buffer[..plaintext.len()].copy_from_slice(plaintext);
        cipher
            .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
            .unwrap()
            .to_vec()
    }

    struct CountingSource {
        calls: AtomicUsize,
        key: Bytes,
        delay: Duration,
    }

    #[async_trait]
    impl KeySource for CountingSource {
        async fn fetch_key(&self, _key_uri: &Url) -> Result<Bytes, HlsDownloaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.key.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl KeySource for FailingSource {
        async fn fetch_key(&self, key_uri: &Url) -> Result<Bytes, HlsDownloaderError> {
            Err(HlsDownloaderError::HttpStatus {
                status: reqwest::StatusCode::FORBIDDEN,
                url: key_uri.to_string(),
            })
        }
    }

    fn key_ref(path: &str) -> EncryptionKey {
        EncryptionKey {
            uri: Url::parse(&format!("https://cdn.example.com/{path}")).unwrap(),
            method: EncryptionMethod::Aes128Cbc,
            iv: None,
        }
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_fetch() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            key: Bytes::from_static(&[7u8; 16]),
            delay: Duration::from_millis(50),
        });
        let resolver = Arc::new(KeyResolver::new(source.clone()));
        let key = key_ref("key.bin");

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let resolver = resolver.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move { resolver.resolve(&key).await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().as_ref(), &[7u8; 16]);
        }

        resolver.resolve(&key).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached_keys().await, 1);
    }

    #[tokio::test]
    async fn distinct_identifiers_fetch_separately() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            key: Bytes::from_static(&[1u8; 16]),
            delay: Duration::ZERO,
        });
        let resolver = KeyResolver::new(source.clone());
        resolver.resolve(&key_ref("k1")).await.unwrap();
        resolver.resolve(&key_ref("k2")).await.unwrap();
        resolver.resolve(&key_ref("k1")).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn wrong_key_length_is_unavailable() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            key: Bytes::from_static(&[1u8; 8]),
            delay: Duration::ZERO,
        });
        let resolver = KeyResolver::new(source);
        let err = resolver.resolve(&key_ref("short")).await.unwrap_err();
        assert!(matches!(err, HlsDownloaderError::KeyUnavailable { .. }));
    }

    #[tokio::test]
    async fn fetch_failure_maps_to_key_unavailable() {
        let resolver = KeyResolver::new(Arc::new(FailingSource));
        let err = resolver.resolve(&key_ref("denied")).await.unwrap_err();
        match err {
            HlsDownloaderError::KeyUnavailable { uri, reason } => {
                assert_eq!(uri, "https://cdn.example.com/denied");
                assert!(reason.contains("403"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decrypt_sync_round_trip() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let plaintext: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let encrypted = Bytes::from(encrypt_data(&plaintext, &key, &iv));
        let decrypted = DecryptionOffloader::decrypt_sync(encrypted, &key, &iv).unwrap();
        assert_eq!(decrypted.as_ref(), plaintext.as_slice());
    }

    #[test]
    fn truncated_ciphertext_is_decryption_error() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let mut encrypted = encrypt_data(b"0123456789abcdef", &key, &iv);
        encrypted.truncate(20);
        let err = DecryptionOffloader::decrypt_sync(Bytes::from(encrypted), &key, &iv).unwrap_err();
        assert!(matches!(err, HlsDownloaderError::DecryptionError(_)));
    }

    #[tokio::test]
    async fn offloaded_decryption_matches_inline() {
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];
        let plaintext = vec![0x47u8; 188 * 4];
        let encrypted = Bytes::from(encrypt_data(&plaintext, &key, &iv));

        let offloaded = DecryptionOffloader::new(true);
        let inline = DecryptionOffloader::new(false);
        assert_eq!(
            offloaded.decrypt(encrypted.clone(), &key, &iv).await.unwrap(),
            inline.decrypt(encrypted, &key, &iv).await.unwrap()
        );
    }
}
