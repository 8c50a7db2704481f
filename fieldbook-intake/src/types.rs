//! Core types shared across the intake pipeline

use serde::{Deserialize, Serialize};

/// One inbound message as delivered by the messaging gateway.
///
/// This is the complete contract with the gateway: everything the pipeline
/// knows about a submission arrives in this shape.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Gateway-assigned message id, used for retry idempotency
    pub message_id: String,
    /// Sender contact identifier (phone-number shaped)
    pub sender: String,
    /// Receiving number the worker texted
    pub destination: String,
    /// Free-text body (project caption, reply, intro...)
    pub body: String,
    /// Attached media references, possibly empty
    pub media: Vec<AttachmentRef>,
}

impl InboundMessage {
    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }
}

/// Reference to one gateway-hosted attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    pub content_type: String,
}

/// Raw bytes fetched for an attachment.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// An attachment persisted to local storage.
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Path relative to the media storage root
    pub path: String,
    /// SHA-256 of the image bytes, for exact-duplicate detection
    pub hash: String,
    /// Size in bytes, for the low-quality advisory
    pub byte_len: u64,
}
