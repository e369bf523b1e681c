//! Gmail REST mail source.
//!
//! Uses `users/me/messages` with a bearer token. Acquiring and refreshing the
//! token is left to whatever provisions `GMAIL_ACCESS_TOKEN`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::text::{normalize_body, single_line, strip_html};
use super::{MailMessage, MailSource, MessageId};
use crate::config::{
    DEFAULT_ADAPTER_TIMEOUT_SECS, DEFAULT_MAX_BATCH, EnvLookup, env_or, env_parse, env_required,
};
use crate::error::{ConfigError, MailError};

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Gmail mail source configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub access_token: SecretString,
    pub api_base: String,
    pub max_batch: usize,
    pub request_timeout: Duration,
}

impl GmailConfig {
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let token = env_required(
            env,
            "GMAIL_ACCESS_TOKEN",
            "Provide an OAuth access token with the gmail.modify scope",
        )?;
        let timeout: u64 =
            env_parse(env, "DIGEST_ADAPTER_TIMEOUT_SECS", DEFAULT_ADAPTER_TIMEOUT_SECS)?;
        Ok(Self {
            access_token: SecretString::from(token),
            api_base: env_or(env, "GMAIL_API_BASE", DEFAULT_API_BASE),
            max_batch: env_parse(env, "DIGEST_MAX_BATCH", DEFAULT_MAX_BATCH)?,
            request_timeout: Duration::from_secs(timeout),
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    payload: Option<Part>,
}

/// One node of a Gmail message payload tree.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: PartBody,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartBody {
    pub data: Option<String>,
}

// ── Source ──────────────────────────────────────────────────────────

/// Mail source backed by the Gmail API.
pub struct GmailSource {
    client: Client,
    config: GmailConfig,
}

impl GmailSource {
    pub fn new(config: GmailConfig) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MailError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/users/me/{}",
            self.config.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, MailError> {
        let response = request
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| MailError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MailError::AuthFailed {
                reason: format!("{status}: {body}"),
            },
            _ => MailError::Http(format!("{status}: {body}")),
        })
    }
}

#[async_trait]
impl MailSource for GmailSource {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn list_unread_ids(&self) -> Result<Vec<MessageId>, MailError> {
        let max = self.config.max_batch.to_string();
        let request = self
            .client
            .get(self.url("messages"))
            .query(&[("q", "is:unread"), ("maxResults", max.as_str())]);
        let list: ListResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| MailError::Http(format!("invalid list response: {e}")))?;

        debug!(count = list.messages.len(), "Gmail unread listing");
        Ok(list
            .messages
            .into_iter()
            .map(|m| MessageId::new(m.id))
            .collect())
    }

    async fn fetch(&self, id: &MessageId) -> Result<MailMessage, MailError> {
        let request = self
            .client
            .get(self.url(&format!("messages/{}", id.as_str())))
            .query(&[("format", "full")]);
        let response = match self.send(request).await {
            Err(MailError::Http(reason)) if reason.starts_with(StatusCode::NOT_FOUND.as_str()) => {
                return Err(MailError::NotFound { id: id.to_string() });
            }
            other => other?,
        };
        let full: FullMessage = response.json().await.map_err(|e| MailError::Parse {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        let payload = full.payload.unwrap_or_default();
        Ok(message_from_payload(&payload))
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), MailError> {
        let request = self
            .client
            .post(self.url(&format!("messages/{}/modify", id.as_str())))
            .json(&serde_json::json!({ "removeLabelIds": ["UNREAD"] }));
        self.send(request).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), MailError> {
        self.send(self.client.get(self.url("profile"))).await?;
        Ok(())
    }
}

// ── Payload helpers (public for testing) ────────────────────────────

/// Build a [`MailMessage`] from a `format=full` payload.
pub fn message_from_payload(payload: &Part) -> MailMessage {
    let header = |name: &str| {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .unwrap_or_default()
    };

    MailMessage {
        sender: single_line(header("From"), "Unknown"),
        subject: single_line(header("Subject"), "No Subject"),
        body: normalize_body(&extract_body(payload)),
    }
}

/// First `text/plain` part wins; otherwise the first `text/html` part, stripped.
pub fn extract_body(payload: &Part) -> String {
    if let Some(text) = find_part(payload, "text/plain") {
        return text;
    }
    find_part(payload, "text/html")
        .map(|html| strip_html(&html))
        .unwrap_or_default()
}

fn find_part(part: &Part, mime: &str) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case(mime)
        && let Some(text) = part.body.data.as_deref().and_then(decode_base64url)
    {
        return Some(text);
    }
    part.parts.iter().find_map(|p| find_part(p, mime))
}

/// Decode Gmail's base64url body data (padding optional).
pub fn decode_base64url(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(s: &str) -> String {
        URL_SAFE_NO_PAD.encode(s)
    }

    fn leaf(mime: &str, text: &str) -> Part {
        Part {
            mime_type: mime.to_string(),
            body: PartBody {
                data: Some(encode(text)),
            },
            ..Default::default()
        }
    }

    #[test]
    fn decode_accepts_padded_and_unpadded() {
        assert_eq!(decode_base64url("aGk").as_deref(), Some("hi"));
        assert_eq!(decode_base64url("aGk=").as_deref(), Some("hi"));
        assert!(decode_base64url("!!!").is_none());
    }

    #[test]
    fn plain_text_preferred_over_html() {
        let payload = Part {
            mime_type: "multipart/alternative".to_string(),
            parts: vec![leaf("text/html", "<b>html</b>"), leaf("text/plain", "plain")],
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "plain");
    }

    #[test]
    fn html_fallback_is_stripped() {
        let payload = Part {
            mime_type: "multipart/mixed".to_string(),
            parts: vec![Part {
                mime_type: "multipart/alternative".to_string(),
                parts: vec![leaf("text/html", "<p>Hello <i>there</i></p>")],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "Hello there");
    }

    #[test]
    fn headers_and_defaults() {
        let mut payload = leaf("text/plain", "Line one\nLine two");
        payload.headers = vec![Header {
            name: "from".to_string(),
            value: "Bob <bob@example.com>".to_string(),
        }];
        let msg = message_from_payload(&payload);
        assert_eq!(msg.sender, "Bob <bob@example.com>");
        assert_eq!(msg.subject, "No Subject");
        assert_eq!(msg.body, "Line one Line two");
    }

    #[test]
    fn full_message_json_deserializes() {
        let json = serde_json::json!({
            "id": "18c",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "From", "value": "Carol <carol@example.com>"},
                    {"name": "Subject", "value": "Lunch?"}
                ],
                "body": {"size": 5, "data": encode("Noon?")}
            }
        });
        let full: FullMessage = serde_json::from_value(json).unwrap();
        let msg = message_from_payload(&full.payload.unwrap());
        assert_eq!(msg.subject, "Lunch?");
        assert_eq!(msg.body, "Noon?");
    }

    #[test]
    fn empty_listing_deserializes() {
        let list: ListResponse =
            serde_json::from_value(serde_json::json!({"resultSizeEstimate": 0})).unwrap();
        assert!(list.messages.is_empty());
    }
}
