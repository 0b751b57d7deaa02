//! Shared chat-completion HTTP client
//!
//! All remote variants speak the same wire shape: `POST
//! {base_url}/chat/completions` with `{model, messages, temperature?,
//! stream?}`. Non-streaming responses are parsed from
//! `choices[0].message.content`; streaming responses are decoded line by
//! line, concatenating `choices[0].delta.content` until the `[DONE]`
//! sentinel. Cancellation is a cooperative flag checked between stream
//! chunks.

use crate::cancel::CancelFlag;
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageBody>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageBody {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Outcome of decoding one line of a streamed response.
#[derive(Debug, PartialEq)]
pub(crate) enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

/// Decode one streamed line: tolerate an SSE `data:` prefix, stop at the
/// `[DONE]` sentinel, and skip anything that is not a content delta.
pub(crate) fn decode_stream_line(line: &str) -> StreamLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return StreamLine::Skip;
    }
    if trimmed.contains("[DONE]") {
        return StreamLine::Done;
    }
    let payload = trimmed
        .strip_prefix("data:")
        .map(str::trim)
        .unwrap_or(trimmed);

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .map(StreamLine::Delta)
            .unwrap_or(StreamLine::Skip),
        Err(_) => StreamLine::Skip,
    }
}

/// Accumulates raw response bytes and yields complete lines.
///
/// Splitting happens at the byte level: a multibyte UTF-8 character whose
/// bytes straddle two network chunks is never decoded until its line is
/// complete, so chunk boundaries cannot mangle it.
#[derive(Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left after the last newline, decoded in one piece.
    fn take_remainder(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.bytes)).into_owned()
    }
}

/// Parse a non-streaming completion body.
pub(crate) fn parse_completion_body(body: &[u8]) -> Result<String, ProviderError> {
    let response: ChatResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| {
            ProviderError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

/// HTTP client for one configured chat-completion endpoint.
pub struct ChatCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    headers: Vec<(&'static str, String)>,
    cancel: CancelFlag,
}

impl ChatCompletionClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: None,
            headers: Vec::new(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_header(mut self, name: &'static str, value: String) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Cancel the in-flight call; observed between stream chunks.
    pub fn cancel(&self) {
        self.cancel.set();
    }

    /// Issue one chat completion and return the concatenated text.
    pub async fn complete(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        streaming: bool,
    ) -> Result<String, ProviderError> {
        self.cancel.clear();

        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: streaming.then_some(true),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }

        tracing::debug!(url = %url, model = %self.model, streaming, "Issuing chat completion");
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Network(format!(
                "server returned {}",
                status
            )));
        }

        if streaming {
            self.read_stream(response).await
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;
            parse_completion_body(&body)
        }
    }

    async fn read_stream(&self, response: reqwest::Response) -> Result<String, ProviderError> {
        use futures::StreamExt;

        let mut stream = response.bytes_stream();
        let mut buffer = LineBuffer::default();
        let mut result = String::new();

        'outer: while let Some(chunk) = stream.next().await {
            if self.cancel.is_set() {
                tracing::debug!("Stream cancelled, returning partial text");
                return Ok(result);
            }
            let chunk = chunk.map_err(|e| ProviderError::Network(e.to_string()))?;
            buffer.push(&chunk);

            while let Some(line) = buffer.next_line() {
                match decode_stream_line(&line) {
                    StreamLine::Done => break 'outer,
                    StreamLine::Delta(text) => result.push_str(&text),
                    StreamLine::Skip => {}
                }
            }
        }

        // A final line without a trailing newline still counts.
        if let StreamLine::Delta(text) = decode_stream_line(&buffer.take_remainder()) {
            result.push_str(&text);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_delta_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(decode_stream_line(line), StreamLine::Delta("Hel".into()));
    }

    #[test]
    fn test_decode_line_without_sse_prefix() {
        let line = r#"{"choices":[{"delta":{"content":"lo"}}]}"#;
        assert_eq!(decode_stream_line(line), StreamLine::Delta("lo".into()));
    }

    #[test]
    fn test_decode_done_sentinel() {
        assert_eq!(decode_stream_line("data: [DONE]"), StreamLine::Done);
        assert_eq!(decode_stream_line("[DONE]"), StreamLine::Done);
    }

    #[test]
    fn test_decode_skips_blank_and_garbage() {
        assert_eq!(decode_stream_line(""), StreamLine::Skip);
        assert_eq!(decode_stream_line("   "), StreamLine::Skip);
        assert_eq!(decode_stream_line("not json"), StreamLine::Skip);
        // A delta without content (e.g. role announcement) is skipped
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(decode_stream_line(line), StreamLine::Skip);
    }

    #[test]
    fn test_parse_completion_body() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"Hello"}}]}"#;
        assert_eq!(parse_completion_body(body).unwrap(), "Hello");
    }

    #[test]
    fn test_parse_completion_missing_content() {
        let body = br#"{"choices":[{"message":{"role":"assistant"}}]}"#;
        let err = parse_completion_body(body).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));

        let body = br#"{"choices":[]}"#;
        assert!(parse_completion_body(body).is_err());
    }

    #[test]
    fn test_parse_completion_invalid_json() {
        let err = parse_completion_body(b"<html>502</html>").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn test_line_buffer_reassembles_multibyte_char_split_across_chunks() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        // Split inside the two-byte encoding of 'é' (0xC3 0xA9)
        let split = payload.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = LineBuffer::default();
        buffer.push(&payload[..split]);
        assert!(buffer.next_line().is_none());
        buffer.push(&payload[split..]);

        let line = buffer.next_line().unwrap();
        assert_eq!(decode_stream_line(&line), StreamLine::Delta("café".into()));
        assert!(buffer.next_line().is_none());
        assert!(buffer.take_remainder().is_empty());
    }

    #[test]
    fn test_line_buffer_yields_each_complete_line() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"first\nsecond\ntrail");
        assert_eq!(buffer.next_line().as_deref(), Some("first\n"));
        assert_eq!(buffer.next_line().as_deref(), Some("second\n"));
        assert!(buffer.next_line().is_none());
        assert_eq!(buffer.take_remainder(), "trail");
    }

    #[test]
    fn test_line_buffer_multibyte_remainder_without_newline() {
        let payload = "{\"choices\":[{\"delta\":{\"content\":\"naïve\"}}]}".as_bytes();
        let split = payload.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = LineBuffer::default();
        buffer.push(&payload[..split]);
        buffer.push(&payload[split..]);
        assert!(buffer.next_line().is_none());
        assert_eq!(
            decode_stream_line(&buffer.take_remainder()),
            StreamLine::Delta("naïve".into())
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "gpt-4o",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            temperature: Some(0.5),
            stream: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        // stream is omitted entirely for non-streaming requests
        assert!(json.get("stream").is_none());
    }
}
