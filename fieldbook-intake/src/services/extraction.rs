//! Extraction adapter
//!
//! Sends a receipt image to the external vision recognition service and
//! returns its raw response text, untrusted and unparsed. Everything
//! downstream of the transport (fencing, malformed JSON, missing fields)
//! is the structurer's problem; this module only defines the wire contract.

use crate::config::ExtractionConfig;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// The instruction sent with every image. The service is asked for bare
/// JSON; the structurer still tolerates fenced or decorated output.
const EXTRACTION_PROMPT: &str = r#"You read retail receipts. Extract everything from this receipt image and answer with a single JSON object, no markdown and no commentary, shaped exactly like:

{
  "vendor_name": "Store name as printed",
  "vendor_city": "City if visible, else null",
  "vendor_state": "Two-letter state code if visible, else null",
  "purchase_date": "YYYY-MM-DD",
  "subtotal": 0.00,
  "tax": 0.00,
  "total": 0.00,
  "payment_method": "CASH or card brand with last 4 digits",
  "category": "One of: Fuel, Materials, Food & Drinks, Safety Gear, Lodging, Tools, Other — your best guess, else null",
  "line_items": [
    {"item_name": "Description as printed", "quantity": 1, "unit_price": 0.00, "extended_price": 0.00}
  ]
}

Rules:
- Dollar amounts as bare numbers, no currency sign
- Use null for anything not visible or unreadable; never invent values
- Negative amounts for returns and refunds
- quantity defaults to 1 when the receipt does not show one
- extended_price = quantity x unit_price; if only one price is shown use it for both
- Normalize the date to YYYY-MM-DD however it is printed"#;

/// Extraction transport errors
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Extraction service not configured: {0}")]
    NotConfigured(String),

    #[error("Extraction request failed: {0}")]
    Transport(String),

    #[error("Extraction service error {0}: {1}")]
    Api(u16, String),

    #[error("Extraction service returned an empty response")]
    EmptyResponse,
}

/// Image bytes → raw recognition response text.
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    async fn extract(&self, image: &[u8], content_type: &str) -> Result<String, ExtractError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Production adapter for an OpenAI-compatible vision endpoint.
pub struct VisionExtractor {
    http_client: reqwest::Client,
    config: ExtractionConfig,
}

impl VisionExtractor {
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ExtractError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl ReceiptExtractor for VisionExtractor {
    async fn extract(&self, image: &[u8], content_type: &str) -> Result<String, ExtractError> {
        if self.config.api_key.is_empty() {
            return Err(ExtractError::NotConfigured(
                "extraction API key not set".to_string(),
            ));
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:{};base64,{}", content_type, encoded);

        let body = json!({
            "model": self.config.model,
            "max_tokens": 1500,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": EXTRACTION_PROMPT},
                    {"type": "image_url", "image_url": {"url": data_url, "detail": "high"}}
                ]
            }]
        });

        debug!(model = %self.config.model, bytes = image.len(), "Sending image to extraction service");

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExtractError::Api(status.as_u16(), detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ExtractError::EmptyResponse)?;

        info!(chars = content.len(), "Extraction response received");
        Ok(content)
    }
}
