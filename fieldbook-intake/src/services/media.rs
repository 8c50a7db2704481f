//! Attachment retrieval and storage
//!
//! Gateway media URLs require basic auth with the account credentials.
//! Downloads retry transient failures; storage names files systematically
//! (worker, timestamp, short unique suffix) and hashes the bytes for
//! exact-duplicate detection.

use crate::config::GatewayConfig;
use crate::types::{AttachmentRef, FetchedMedia, StoredImage};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Below this size the image is probably unreadable; the worker gets a
/// quality advisory but processing continues.
pub const MIN_IMAGE_BYTES: u64 = 10 * 1024;

const DOWNLOAD_ATTEMPTS: u32 = 3;

/// Media retrieval / storage errors
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Storage failed: {0}")]
    Storage(String),
}

/// Attachment reference → raw bytes, or a retrieval failure.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, attachment: &AttachmentRef) -> Result<FetchedMedia, MediaError>;
}

/// Production fetcher talking to the messaging gateway's media host.
pub struct GatewayMediaFetcher {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
}

impl GatewayMediaFetcher {
    pub fn new(config: &GatewayConfig) -> Result<Self, MediaError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MediaError::Download(e.to_string()))?;

        Ok(Self {
            http_client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        })
    }
}

#[async_trait]
impl MediaFetcher for GatewayMediaFetcher {
    async fn fetch(&self, attachment: &AttachmentRef) -> Result<FetchedMedia, MediaError> {
        let mut last_error = String::new();

        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            let mut request = self.http_client.get(&attachment.url);
            if !self.account_sid.is_empty() {
                request = request.basic_auth(&self.account_sid, Some(&self.auth_token));
            }

            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string())
                        .or_else(|| {
                            (!attachment.content_type.is_empty())
                                .then(|| attachment.content_type.clone())
                        });
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| MediaError::Download(e.to_string()))?;
                    return Ok(FetchedMedia {
                        bytes: bytes.to_vec(),
                        content_type,
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < DOWNLOAD_ATTEMPTS {
                        warn!(attempt, url = %attachment.url, error = %last_error,
                              "Media download attempt failed, retrying");
                        tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                    }
                }
            }
        }

        Err(MediaError::Download(last_error))
    }
}

fn extension_for(media: &FetchedMedia) -> &'static str {
    if let Some(kind) = infer::get(&media.bytes) {
        return kind.extension();
    }
    match media.content_type.as_deref() {
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        _ => "jpg",
    }
}

fn sanitize_for_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Persist fetched bytes under the media root.
///
/// Filename shape: `omar_20260218_143052_a1b2c3d4.jpg`. Returns the path
/// relative to the media root, the content hash, and the byte length.
pub fn store_image(
    media_dir: &Path,
    worker_name: &str,
    media: &FetchedMedia,
) -> Result<StoredImage, MediaError> {
    std::fs::create_dir_all(media_dir).map_err(|e| MediaError::Storage(e.to_string()))?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    let filename = format!(
        "{}_{}_{}.{}",
        sanitize_for_filename(worker_name),
        stamp,
        suffix,
        extension_for(media)
    );

    let full_path = media_dir.join(&filename);
    std::fs::write(&full_path, &media.bytes).map_err(|e| MediaError::Storage(e.to_string()))?;

    let hash = format!("{:x}", Sha256::digest(&media.bytes));
    info!(path = %full_path.display(), bytes = media.bytes.len(), "Image saved");

    Ok(StoredImage {
        path: filename,
        hash,
        byte_len: media.bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stores_bytes_with_systematic_name_and_hash() {
        let dir = TempDir::new().unwrap();
        let media = FetchedMedia {
            bytes: b"not really a jpeg".to_vec(),
            content_type: Some("image/jpeg".to_string()),
        };

        let stored = store_image(dir.path(), "Omar R.", &media).unwrap();
        assert!(stored.path.starts_with("omarr_"));
        assert!(stored.path.ends_with(".jpg"));
        assert_eq!(stored.byte_len, 17);
        assert_eq!(stored.hash.len(), 64);
        assert!(dir.path().join(&stored.path).exists());
    }

    #[test]
    fn identical_bytes_hash_identically() {
        let dir = TempDir::new().unwrap();
        let media = FetchedMedia {
            bytes: vec![7; 64],
            content_type: None,
        };
        let first = store_image(dir.path(), "a", &media).unwrap();
        let second = store_image(dir.path(), "b", &media).unwrap();
        assert_eq!(first.hash, second.hash);
        assert_ne!(first.path, second.path);
    }
}
