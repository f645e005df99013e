//! Mail source connector.
//!
//! Owns authentication, pagination and per-message text extraction; the
//! retrieval core only ever sees the normalized `Document` stream a
//! source produces.
//!
//! - `gmail`: connector for the Gmail REST API
//! - text cleanup helpers shared by connectors live here

mod gmail;

pub use gmail::GmailSource;

use crate::document::Document;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail source authentication failed: {0}")]
    Auth(String),

    #[error("label '{0}' not found")]
    LabelNotFound(String),

    #[error("mail API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode message body: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("unexpected mail API response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A finite, produced-once stream of normalized documents.
pub trait MailSource {
    /// Fetch up to `limit` messages carrying the given label.
    fn fetch(&self, label: &str, limit: usize) -> Result<Vec<Document>, MailError>;
}

/// Strip markup and decode HTML entities, returning plain text with
/// single-space separation. Only for bodies that really are HTML:
/// tokenization treats `<` + letter as a tag opener, which would eat
/// angle-bracketed addresses in plain text.
pub fn html_to_text(html: &str) -> String {
    let fragment = scraper::Html::parse_document(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    normalize_whitespace(&text.join(" "))
}

/// Decode HTML entities without parsing markup, for text/plain bodies
/// that still carry entities. Unknown entities pass through untouched.
pub fn unescape_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        // Entities are short; cap the scan so a bare '&' doesn't walk
        // the whole remaining body.
        let end = match rest[..rest.len().min(32)].find(';') {
            Some(end) => end,
            None => {
                out.push('&');
                rest = &rest[1..];
                continue;
            }
        };

        match decode_entity(&rest[1..end]) {
            Some(decoded) => {
                out.push_str(&decoded);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<String> {
    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            return char::from_u32(code).map(String::from);
        }
    };
    Some(decoded.to_string())
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_strips_markup() {
        let html = "<html><body><p>Hello <b>world</b></p><div>again</div></body></html>";
        assert_eq!(html_to_text(html), "Hello world again");
    }

    #[test]
    fn test_html_to_text_decodes_entities() {
        let html = "<p>Fish &amp; chips &lt;today&gt;</p>";
        assert_eq!(html_to_text(html), "Fish & chips <today>");
    }

    #[test]
    fn test_unescape_entities_named_and_numeric() {
        assert_eq!(
            unescape_entities("Fish &amp; chips &lt;today&gt; &quot;hot&quot; &#39;n&#39; fresh"),
            "Fish & chips <today> \"hot\" 'n' fresh"
        );
        assert_eq!(unescape_entities("caf&#233; &#x263A;"), "café ☺");
    }

    #[test]
    fn test_unescape_entities_leaves_plain_text_alone() {
        let text = "Alice <alice@example.com> sent <https://example.com/a?x=1&y=2>";
        assert_eq!(unescape_entities(text), text);
        assert_eq!(unescape_entities("AT&T; &unknown; & co"), "AT&T; &unknown; & co");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  too\n\nmany\t spaces \r\n"),
            "too many spaces"
        );
    }
}
