//! Streaming generation over the Ollama chat API.
//!
//! Thin adapter: the composed prompt goes out as one `/api/chat` request
//! with `stream: true`, and the NDJSON response body is exposed as a
//! pull-based iterator of text chunks. Failures surface as a terminal
//! error on the stream; nothing is retried here.

use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::prompt::ChatMessage;

/// Connect timeout for the chat request. No overall request timeout:
/// generation legitimately streams for a long time.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("invalid Ollama endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("request to generation model failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation model returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("generation model reported an error: {0}")]
    Model(String),

    #[error("failed to decode model output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("error reading model stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("model stream ended before signaling completion")]
    Truncated,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

/// One NDJSON line of the chat stream.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a local Ollama server.
pub struct OllamaClient {
    endpoint: Url,
    model: String,
    http: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(endpoint: &str, model: &str) -> Result<Self, GenerateError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            model: model.to_string(),
            http: reqwest::blocking::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()?,
        })
    }

    /// Start a streamed chat completion for the composed prompt.
    ///
    /// Returns a lazy chunk stream; the request is sent before this
    /// returns, so configuration problems (unreachable server, unknown
    /// model) fail here rather than on first read.
    pub fn chat_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, GenerateError> {
        let url = self.endpoint.join("api/chat")?;

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": messages,
                "stream": true,
            }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(GenerateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(ChunkStream::from_reader(response))
    }
}

/// Lazy sequence of generated text chunks.
///
/// Single-consumer and non-restartable: iterate until `None` (model
/// signaled completion) or until an `Err` item, which is terminal.
/// Dropping the stream early cancels generation.
pub struct ChunkStream<R: Read = reqwest::blocking::Response> {
    lines: std::io::Lines<BufReader<R>>,
    finished: bool,
}

impl<R: Read> ChunkStream<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            finished: false,
        }
    }
}

impl<R: Read> Iterator for ChunkStream<R> {
    type Item = Result<String, GenerateError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err.into()));
                }
                None => {
                    // The server closes the body after the done chunk, so
                    // running out of lines first means the stream was cut.
                    self.finished = true;
                    return Some(Err(GenerateError::Truncated));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let chunk: StreamChunk = match serde_json::from_str(&line) {
                Ok(chunk) => chunk,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err.into()));
                }
            };

            if let Some(error) = chunk.error {
                self.finished = true;
                return Some(Err(GenerateError::Model(error)));
            }

            if chunk.done {
                self.finished = true;
                return None;
            }

            let content = chunk.message.map(|m| m.content).unwrap_or_default();
            if content.is_empty() {
                continue;
            }
            return Some(Ok(content));
        }
    }
}
