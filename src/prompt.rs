//! Grounded prompt assembly for the generation model.

use serde::Serialize;

use crate::index::Hit;

/// Fixed system instruction establishing the assistant's persona.
const SYSTEM_PROMPT: &str = "You are a political scientist AI agent. \
Respond with the relevant information as accurately as possible with several paragraphs answering the question.";

/// One turn of the two-role conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Render the query and its retrieved evidence as the user-turn text.
///
/// One line per hit, identifying the message by subject together with its
/// similarity score, so the generation step can reference the evidence.
pub fn render_results(query: &str, hits: &[Hit]) -> String {
    let mut out = format!("Query: {query}\n");
    out.push_str(&format!("Returned {} results:\n", hits.len()));

    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "{}. Subject: {}, Similarity Score: {}\n",
            i + 1,
            hit.document.subject(),
            hit.distance
        ));
    }

    out
}

/// Build the two-role generation request: system persona plus a user turn
/// carrying the original query and the rendered evidence.
///
/// With no hits the request still carries the query alone; generation
/// proceeds ungrounded rather than failing.
pub fn compose(query: &str, hits: &[Hit]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(render_results(query, hits)),
    ]
}
