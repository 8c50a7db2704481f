//! Gateway webhook endpoint
//!
//! The messaging gateway POSTs a form here for every inbound message. The
//! handler parses it, hands off to the conversation router, and always
//! answers within the gateway's latency window with an XML acknowledgment:
//! empty for silenced senders, and also on internal failure (the gateway
//! retries the same message id, which the idempotency claim then absorbs
//! only if the first delivery actually committed).

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::post,
    Form, Router,
};
use std::collections::HashMap;
use tracing::{error, info};

use crate::conversation::router::handle_message;
use crate::error::{ApiError, ApiResult};
use crate::types::{AttachmentRef, InboundMessage};
use crate::AppState;

/// Pull the fields we care about out of a gateway webhook form.
///
/// The gateway sends `From`, `Body`, `To`, `MessageSid`, `NumMedia`, and a
/// `MediaUrl{i}` / `MediaContentType{i}` pair per attachment.
pub fn parse_gateway_form(form: &HashMap<String, String>) -> InboundMessage {
    let num_media: usize = form
        .get("NumMedia")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut media = Vec::with_capacity(num_media);
    for i in 0..num_media {
        if let Some(url) = form.get(&format!("MediaUrl{}", i)) {
            if url.is_empty() {
                continue;
            }
            media.push(AttachmentRef {
                url: url.clone(),
                content_type: form
                    .get(&format!("MediaContentType{}", i))
                    .cloned()
                    .unwrap_or_default(),
            });
        }
    }

    InboundMessage {
        message_id: form.get("MessageSid").cloned().unwrap_or_default(),
        sender: form.get("From").cloned().unwrap_or_default(),
        destination: form.get("To").cloned().unwrap_or_default(),
        body: form.get("Body").map(|b| b.trim().to_string()).unwrap_or_default(),
        media,
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Build the gateway acknowledgment payload, with or without a reply.
pub fn ack_xml(reply: Option<&str>) -> String {
    match reply {
        Some(text) => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
            xml_escape(text)
        ),
        None => "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string(),
    }
}

/// POST /webhook/message
pub async fn message_webhook(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let inbound = parse_gateway_form(&form);
    if inbound.sender.is_empty() {
        // Not a gateway delivery at all; reject rather than register "".
        return Err(ApiError::BadRequest("missing sender".to_string()));
    }
    info!(
        sender = %inbound.sender,
        message_id = %inbound.message_id,
        media = inbound.media.len(),
        body_chars = inbound.body.len(),
        "Inbound message"
    );

    let reply = match handle_message(&state, &inbound).await {
        Ok(reply) => reply,
        Err(e) => {
            // Business failures degrade to flagged records inside the
            // pipeline; anything surfacing here is infrastructure.
            error!(sender = %inbound.sender, error = %e, "Message handling failed");
            None
        }
    };

    Ok((
        [(header::CONTENT_TYPE, "application/xml")],
        ack_xml(reply.as_deref()),
    ))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook/message", post(message_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_media_message() {
        let mut form = HashMap::new();
        form.insert("From".to_string(), "+14075551234".to_string());
        form.insert("To".to_string(), "+18635550000".to_string());
        form.insert("Body".to_string(), "  Sparrow  ".to_string());
        form.insert("MessageSid".to_string(), "SM123".to_string());
        form.insert("NumMedia".to_string(), "2".to_string());
        form.insert("MediaUrl0".to_string(), "https://gw.example/m/0".to_string());
        form.insert("MediaContentType0".to_string(), "image/jpeg".to_string());
        form.insert("MediaUrl1".to_string(), "https://gw.example/m/1".to_string());

        let msg = parse_gateway_form(&form);
        assert_eq!(msg.sender, "+14075551234");
        assert_eq!(msg.body, "Sparrow");
        assert_eq!(msg.message_id, "SM123");
        assert_eq!(msg.media.len(), 2);
        assert_eq!(msg.media[0].content_type, "image/jpeg");
        assert_eq!(msg.media[1].content_type, "");
    }

    #[test]
    fn parses_a_bare_text_message() {
        let mut form = HashMap::new();
        form.insert("From".to_string(), "+14075551234".to_string());
        form.insert("Body".to_string(), "no receipt".to_string());

        let msg = parse_gateway_form(&form);
        assert!(msg.media.is_empty());
        assert_eq!(msg.message_id, "");
    }

    #[test]
    fn ack_escapes_reply_text() {
        let xml = ack_xml(Some("Got it — 3 items <$5 & more>"));
        assert!(xml.contains("&lt;$5 &amp; more&gt;"));
        assert!(xml.starts_with("<?xml"));
    }

    #[test]
    fn empty_ack_has_no_message_element() {
        let xml = ack_xml(None);
        assert!(!xml.contains("<Message>"));
    }
}
