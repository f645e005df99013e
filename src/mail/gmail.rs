//! Gmail REST API connector.
//!
//! Fetches messages for a label and normalizes each into a `Document`:
//! headers become metadata, the body is base64url-decoded, HTML parts are
//! converted to plain text, and the embedding text is the subject plus
//! cleaned body. OAuth token acquisition is outside this connector; it
//! consumes an already-issued access token.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::Deserialize;

use crate::document::{Document, Metadata};
use crate::mail::{html_to_text, normalize_whitespace, unescape_entities, MailError, MailSource};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    id: String,
    #[serde(rename = "threadId", default)]
    thread_id: String,
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default)]
    body: Option<Body>,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    data: Option<String>,
}

/// Mail source over the Gmail REST API.
pub struct GmailSource {
    base_url: String,
    token: String,
    http: reqwest::blocking::Client,
}

impl GmailSource {
    pub fn new(access_token: impl Into<String>) -> Result<Self, MailError> {
        Ok(Self {
            base_url: GMAIL_API_BASE.to_string(),
            token: access_token.into(),
            http: reqwest::blocking::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
        })
    }

    /// Read an access token from a token file (the `token.json` the OAuth
    /// flow leaves behind).
    pub fn from_token_file(path: &Path) -> Result<Self, MailError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MailError::Auth(format!("cannot read token file {path:?}: {e}")))?;

        #[derive(Deserialize)]
        struct TokenFile {
            #[serde(alias = "access_token")]
            token: Option<String>,
        }

        let parsed: TokenFile = serde_json::from_str(&raw)?;
        let token = parsed
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MailError::Auth(format!("no access token in {path:?}")))?;

        Self::new(token)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T, MailError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, path_and_query))
            .bearer_auth(&self.token)
            .send()?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(MailError::Auth(format!(
                "Gmail rejected the access token (status {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json()?)
    }

    fn resolve_label_id(&self, label_name: &str) -> Result<String, MailError> {
        let list: LabelList = self.get_json("labels")?;
        list.labels
            .into_iter()
            .find(|label| label.name == label_name)
            .map(|label| label.id)
            .ok_or_else(|| MailError::LabelNotFound(label_name.to_string()))
    }
}

impl MailSource for GmailSource {
    fn fetch(&self, label: &str, limit: usize) -> Result<Vec<Document>, MailError> {
        // Nested labels arrive shell-escaped as backslashes.
        let label = label.replace('\\', "/");
        let label_id = self.resolve_label_id(&label)?;

        let list: MessageList = self.get_json(&format!(
            "messages?labelIds={}&maxResults={}",
            label_id, limit
        ))?;

        let mut documents = Vec::with_capacity(list.messages.len());
        for message_ref in list.messages {
            let message: Message =
                self.get_json(&format!("messages/{}?format=full", message_ref.id))?;
            documents.push(message_to_document(&message)?);
        }

        tracing::info!(label = %label, count = documents.len(), "fetched messages");
        Ok(documents)
    }
}

/// Normalize a Gmail message into a `Document`.
///
/// The embedding text is `Subject: <subject>\n\n<cleaned body>`; headers
/// and the source type land in metadata.
pub(crate) fn message_to_document(message: &Message) -> Result<Document, MailError> {
    let header = |name: &str| -> String {
        message
            .payload
            .headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.clone())
            .unwrap_or_default()
    };

    let subject = header("Subject");
    let body = extract_body(message)?;
    let text = format!("Subject: {}\n\n{}", subject, body);

    let mut metadata = Metadata::new();
    metadata.insert("message_id".into(), message.id.clone().into());
    metadata.insert("thread_id".into(), message.thread_id.clone().into());
    metadata.insert("date".into(), header("Date").into());
    metadata.insert("from".into(), header("From").into());
    metadata.insert("subject".into(), subject.into());
    metadata.insert("type".into(), "email".into());

    Ok(Document::new(message.id.clone(), text, metadata))
}

/// Extract and clean the message body.
///
/// Multipart messages prefer a text/plain part and fall back to text/html;
/// single-part messages use the payload body directly. HTML is converted
/// to plain text, and the result is whitespace-normalized.
fn extract_body(message: &Message) -> Result<String, MailError> {
    let payload = &message.payload;

    let (raw, is_html) = if !payload.parts.is_empty() {
        let plain = payload
            .parts
            .iter()
            .find(|part| part.mime_type == "text/plain")
            .and_then(|part| part.body.as_ref())
            .and_then(|body| body.data.as_deref());

        match plain {
            Some(data) => (Some(data), false),
            None => {
                let html = payload
                    .parts
                    .iter()
                    .find(|part| part.mime_type == "text/html")
                    .and_then(|part| part.body.as_ref())
                    .and_then(|body| body.data.as_deref());
                (html, true)
            }
        }
    } else {
        let data = payload.body.as_ref().and_then(|body| body.data.as_deref());
        (data, payload.mime_type == "text/html")
    };

    let Some(raw) = raw else {
        return Ok(String::new());
    };

    let decoded_bytes = decode_base64url(raw)?;
    let decoded = String::from_utf8_lossy(&decoded_bytes);

    if is_html {
        Ok(html_to_text(&decoded))
    } else {
        // Plain-text bodies still occasionally carry entities, but must
        // not go through the HTML parser: it would treat angle-bracketed
        // addresses and bare URLs as tags and drop them.
        Ok(normalize_whitespace(&unescape_entities(&decoded)))
    }
}

/// Gmail pads inconsistently; accept both padded and unpadded base64url.
fn decode_base64url(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetaValue;

    fn encode(text: &str) -> String {
        URL_SAFE.encode(text.as_bytes())
    }

    fn message_json(parts: serde_json::Value) -> Message {
        serde_json::from_value(serde_json::json!({
            "id": "msg-123",
            "threadId": "thread-456",
            "payload": parts,
        }))
        .unwrap()
    }

    #[test]
    fn test_multipart_prefers_plain_text() {
        let message = message_json(serde_json::json!({
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "Subject", "value": "Budget report"},
                {"name": "Date", "value": "Mon, 3 Feb 2025 10:00:00 +0000"},
                {"name": "From", "value": "alice@example.com"},
            ],
            "parts": [
                {"mimeType": "text/html", "body": {"data": encode("<b>ignored</b>")}},
                {"mimeType": "text/plain", "body": {"data": encode("plain   body\nhere")}},
            ],
        }));

        let doc = message_to_document(&message).unwrap();
        assert_eq!(doc.id, "msg-123");
        assert_eq!(doc.text, "Subject: Budget report\n\nplain body here");
        assert_eq!(
            doc.metadata.get("from"),
            Some(&MetaValue::Str("alice@example.com".into()))
        );
        assert_eq!(doc.metadata.get("type"), Some(&MetaValue::Str("email".into())));
    }

    #[test]
    fn test_plain_text_keeps_angle_brackets() {
        // Addresses and bare URLs in text/plain must survive verbatim;
        // only entities are decoded.
        let message = message_json(serde_json::json!({
            "mimeType": "multipart/alternative",
            "headers": [{"name": "Subject", "value": "Intro"}],
            "parts": [
                {"mimeType": "text/plain", "body": {"data": encode(
                    "From Alice <alice@example.com>: see <https://example.com/link> for Q&amp;A"
                )}},
            ],
        }));

        let doc = message_to_document(&message).unwrap();
        assert_eq!(
            doc.text,
            "Subject: Intro\n\nFrom Alice <alice@example.com>: see <https://example.com/link> for Q&A"
        );
    }

    #[test]
    fn test_multipart_falls_back_to_html() {
        let message = message_json(serde_json::json!({
            "mimeType": "multipart/alternative",
            "headers": [{"name": "Subject", "value": "Newsletter"}],
            "parts": [
                {"mimeType": "text/html", "body": {"data": encode("<p>Fish &amp; chips</p>")}},
            ],
        }));

        let doc = message_to_document(&message).unwrap();
        assert_eq!(doc.text, "Subject: Newsletter\n\nFish & chips");
    }

    #[test]
    fn test_single_part_html_body() {
        let message = message_json(serde_json::json!({
            "mimeType": "text/html",
            "headers": [{"name": "Subject", "value": "Promo"}],
            "body": {"data": encode("<div>Buy   now</div>")},
        }));

        let doc = message_to_document(&message).unwrap();
        assert_eq!(doc.text, "Subject: Promo\n\nBuy now");
    }

    #[test]
    fn test_missing_body_yields_subject_only() {
        let message = message_json(serde_json::json!({
            "mimeType": "text/plain",
            "headers": [{"name": "Subject", "value": "Empty"}],
        }));

        let doc = message_to_document(&message).unwrap();
        assert_eq!(doc.text, "Subject: Empty\n\n");
    }

    #[test]
    fn test_decode_unpadded_base64url() {
        let padded = URL_SAFE.encode("hi!");
        let unpadded = padded.trim_end_matches('=');
        assert_eq!(decode_base64url(unpadded).unwrap(), b"hi!");
        assert_eq!(decode_base64url(&padded).unwrap(), b"hi!");
    }
}
