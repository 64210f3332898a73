//! Message source — unread notification listing and acknowledgment.
//!
//! The production implementation is a Gmail REST client: `messages.list`
//! with the fixed subject/unread query, `messages.get` for the body, and
//! `messages.modify` to drop the `UNREAD` label. The unread flag is the
//! pipeline's only durability marker; nothing else is persisted.

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::pipeline::types::CandidateMessage;

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Supplier of unread candidate messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// List unread messages matching the configured filter. A failure
    /// here is fatal to the run.
    async fn list_unread(&self) -> Result<Vec<CandidateMessage>, SourceError>;

    /// Mark one message as read. Idempotent; calling twice is harmless.
    async fn mark_read(&self, id: &str) -> Result<(), SourceError>;
}

/// Gmail REST message source.
pub struct GmailSource {
    token: SecretString,
    query: String,
    client: reqwest::Client,
}

impl GmailSource {
    pub fn new(token: SecretString, query: impl Into<String>) -> Self {
        Self {
            token,
            query: query.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_message(&self, id: &str) -> Result<Option<CandidateMessage>, SourceError> {
        let url = format!("{GMAIL_BASE}/messages/{id}");
        let message: GmailMessage = self
            .client
            .get(&url)
            .query(&[("format", "full")])
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| SourceError::Unavailable {
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| SourceError::Unavailable {
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse {
                reason: e.to_string(),
            })?;

        let subject = message.payload.header("Subject");
        let Some(body) = extract_body(&message.payload) else {
            warn!(id, "Message has no decodable body, skipping");
            return Ok(None);
        };

        Ok(Some(CandidateMessage {
            id: message.id,
            subject,
            body,
            is_unread: true,
        }))
    }
}

#[async_trait]
impl MessageSource for GmailSource {
    async fn list_unread(&self) -> Result<Vec<CandidateMessage>, SourceError> {
        let url = format!("{GMAIL_BASE}/messages");
        let listing: MessageListing = self
            .client
            .get(&url)
            .query(&[("q", self.query.as_str())])
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| SourceError::Unavailable {
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| SourceError::Unavailable {
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse {
                reason: e.to_string(),
            })?;

        debug!(count = listing.messages.len(), "Listed unread messages");

        let mut messages = Vec::with_capacity(listing.messages.len());
        for entry in &listing.messages {
            if let Some(message) = self.fetch_message(&entry.id).await? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    async fn mark_read(&self, id: &str) -> Result<(), SourceError> {
        let url = format!("{GMAIL_BASE}/messages/{id}/modify");
        let body = serde_json::json!({ "removeLabelIds": ["UNREAD"] });

        self.client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::AckFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| SourceError::AckFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        debug!(id, "Marked message as read");
        Ok(())
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageListing {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    payload: MessagePart,
}

#[derive(Debug, Default, Deserialize)]
struct MessagePart {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

impl MessagePart {
    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    }
}

/// Pick the best body from a (possibly multipart) payload: the first
/// `text/html` part wins, then `text/plain`, then the top-level body.
fn extract_body(payload: &MessagePart) -> Option<String> {
    find_part(payload, "text/html")
        .or_else(|| find_part(payload, "text/plain"))
        .or_else(|| payload.body.data.as_deref().and_then(decode_body))
}

fn find_part(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case(mime_type)
        && let Some(data) = part.body.data.as_deref()
    {
        return decode_body(data);
    }
    part.parts.iter().find_map(|p| find_part(p, mime_type))
}

/// Decode a base64url body, tolerating both padded and unpadded data.
fn decode_body(data: &str) -> Option<String> {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let bytes = engine.decode(data.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE.encode(text)
    }

    #[test]
    fn decodes_padded_and_unpadded_bodies() {
        let padded = encode("<html>hola</html>");
        assert_eq!(decode_body(&padded).unwrap(), "<html>hola</html>");

        let unpadded = padded.trim_end_matches('=').to_string();
        assert_eq!(decode_body(&unpadded).unwrap(), "<html>hola</html>");
    }

    #[test]
    fn html_part_preferred_over_plain_text() {
        let payload = MessagePart {
            mime_type: "multipart/alternative".into(),
            parts: vec![
                MessagePart {
                    mime_type: "text/plain".into(),
                    body: PartBody {
                        data: Some(encode("plain body")),
                    },
                    ..Default::default()
                },
                MessagePart {
                    mime_type: "text/html".into(),
                    body: PartBody {
                        data: Some(encode("<b>html body</b>")),
                    },
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        assert_eq!(extract_body(&payload).unwrap(), "<b>html body</b>");
    }

    #[test]
    fn nested_multipart_is_searched_recursively() {
        let payload = MessagePart {
            mime_type: "multipart/mixed".into(),
            parts: vec![MessagePart {
                mime_type: "multipart/alternative".into(),
                parts: vec![MessagePart {
                    mime_type: "text/html".into(),
                    body: PartBody {
                        data: Some(encode("<p>nested</p>")),
                    },
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(extract_body(&payload).unwrap(), "<p>nested</p>");
    }

    #[test]
    fn simple_message_uses_top_level_body() {
        let payload = MessagePart {
            mime_type: "text/html".into(),
            body: PartBody {
                data: Some(encode("<p>simple</p>")),
            },
            ..Default::default()
        };
        assert_eq!(extract_body(&payload).unwrap(), "<p>simple</p>");
    }

    #[test]
    fn missing_body_yields_none() {
        let payload = MessagePart::default();
        assert!(extract_body(&payload).is_none());
    }

    #[test]
    fn subject_header_lookup_is_case_insensitive() {
        let payload = MessagePart {
            headers: vec![Header {
                name: "subject".into(),
                value: "Notificación de Transacciones BCR".into(),
            }],
            ..Default::default()
        };
        assert_eq!(
            payload.header("Subject").as_deref(),
            Some("Notificación de Transacciones BCR")
        );
    }
}
