// HLS Segment Processor: Decrypts raw segment data and trims it to the first TS packet.

use crate::hls::HlsDownloaderError;
use crate::hls::decryption::{DecryptionOffloader, KeyResolver};
use crate::hls::planner::SegmentDescriptor;
use crate::hls::segment_utils::trim_to_sync_byte;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

#[async_trait]
pub trait SegmentTransformer: Send + Sync {
    async fn process_segment(
        &self,
        raw_data: Bytes,
        segment: &SegmentDescriptor,
    ) -> Result<Bytes, HlsDownloaderError>;
}

pub struct SegmentProcessor {
    key_resolver: Arc<KeyResolver>,
    offloader: DecryptionOffloader,
}

impl SegmentProcessor {
    pub fn new(key_resolver: Arc<KeyResolver>, offloader: DecryptionOffloader) -> Self {
        Self {
            key_resolver,
            offloader,
        }
    }
}

#[async_trait]
impl SegmentTransformer for SegmentProcessor {
    async fn process_segment(
        &self,
        raw_data: Bytes,
        segment: &SegmentDescriptor,
    ) -> Result<Bytes, HlsDownloaderError> {
        let Some(key_ref) = &segment.key else {
            return trim_to_sync_byte(raw_data).ok_or_else(|| {
                HlsDownloaderError::IntegrityError(format!(
                    "segment {} contains no transport stream sync byte",
                    segment.ordinal
                ))
            });
        };

        let key_bytes = self.key_resolver.resolve(key_ref).await?;
        let key: [u8; 16] = key_bytes.as_ref().try_into().map_err(|_| {
            HlsDownloaderError::InternalError(format!(
                "cached key {} is not 16 bytes",
                key_ref.uri
            ))
        })?;
        // Playlists without an IV attribute get the key itself as IV.
        let iv = key_ref.iv.unwrap_or(key);

        let decrypted = self.offloader.decrypt(raw_data, &key, &iv).await?;
        trace!(ordinal = segment.ordinal, bytes = decrypted.len(), "Decrypted segment");

        trim_to_sync_byte(decrypted).ok_or_else(|| {
            HlsDownloaderError::DecryptionError(format!(
                "decrypted segment {} contains no transport stream sync byte",
                segment.ordinal
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::decryption::KeySource;
    use crate::hls::planner::{EncryptionKey, EncryptionMethod};
    use aes::Aes128;
    use cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
    use url::Url;

    struct StaticKey([u8; 16]);

    #[async_trait]
    impl KeySource for StaticKey {
        async fn fetch_key(&self, _key_uri: &Url) -> Result<Bytes, HlsDownloaderError> {
            Ok(Bytes::copy_from_slice(&self.0))
        }
    }

    fn encrypt(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Bytes {
        let cipher = cbc::Encryptor::<Aes128>::new_from_slices(key, iv).unwrap();
        let mut buffer = vec![0u8; (plaintext.len() / 16 + 1) * 16];
        buffer[..plaintext.len()].copy_from_slice(plaintext);
        let len = cipher
            .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
            .unwrap()
            .len();
        buffer.truncate(len);
        Bytes::from(buffer)
    }

    fn processor(key: [u8; 16]) -> SegmentProcessor {
        SegmentProcessor::new(
            Arc::new(KeyResolver::new(Arc::new(StaticKey(key)))),
            DecryptionOffloader::new(false),
        )
    }

    fn segment(key: Option<EncryptionKey>) -> SegmentDescriptor {
        SegmentDescriptor {
            ordinal: 1,
            url: Url::parse("https://cdn.example.com/a.ts").unwrap(),
            key: key.map(Arc::new),
        }
    }

    fn aes_key(iv: Option<[u8; 16]>) -> EncryptionKey {
        EncryptionKey {
            uri: Url::parse("https://cdn.example.com/key.bin").unwrap(),
            method: EncryptionMethod::Aes128Cbc,
            iv,
        }
    }

    #[tokio::test]
    async fn unencrypted_segment_is_trimmed() {
        let raw = Bytes::from_static(&[0xde, 0xad, 0x47, 0x11, 0x22]);
        let out = processor([0; 16])
            .process_segment(raw, &segment(None))
            .await
            .unwrap();
        assert_eq!(out.as_ref(), &[0x47, 0x11, 0x22]);
    }

    #[tokio::test]
    async fn unencrypted_without_sync_byte_is_integrity_error() {
        let err = processor([0; 16])
            .process_segment(Bytes::from_static(b"<html>"), &segment(None))
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::IntegrityError(_)));
    }

    #[tokio::test]
    async fn decrypts_with_explicit_iv_and_trims_filler() {
        let key = [0x01u8; 16];
        let iv = [0x02u8; 16];
        let mut plaintext = vec![0x00, 0x00, 0x00];
        plaintext.extend(std::iter::repeat_n(0x47u8, 188));
        let out = processor(key)
            .process_segment(encrypt(&plaintext, &key, &iv), &segment(Some(aes_key(Some(iv)))))
            .await
            .unwrap();
        assert_eq!(out.as_ref(), &plaintext[3..]);
    }

    #[tokio::test]
    async fn missing_iv_falls_back_to_key_bytes() {
        let key = [0x5au8; 16];
        let plaintext = vec![0x47u8; 376];
        let out = processor(key)
            .process_segment(encrypt(&plaintext, &key, &key), &segment(Some(aes_key(None))))
            .await
            .unwrap();
        assert_eq!(out.as_ref(), plaintext.as_slice());
    }

    #[tokio::test]
    async fn decrypted_without_sync_byte_is_crypto_error() {
        let key = [0x01u8; 16];
        let iv = [0x02u8; 16];
        let plaintext = vec![0x00u8; 64];
        let err = processor(key)
            .process_segment(encrypt(&plaintext, &key, &iv), &segment(Some(aes_key(Some(iv)))))
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::DecryptionError(_)));
        assert!(err.is_retryable());
    }
}
