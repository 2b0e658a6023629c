//! Ollama chat client.
//!
//! Streams `POST /api/chat` responses, which arrive as newline-delimited JSON
//! objects carrying one content fragment each.

use crate::config::LlmConfig;
use crate::error::{Result, VocaliveError};
use crate::llm::generator::Generator;
use crate::session::history::Turn;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Sampling options forwarded verbatim to Ollama.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
    options: GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// What one NDJSON line means for the stream.
#[derive(Debug, PartialEq)]
enum ChunkEvent {
    Fragment(String),
    Done,
    Skip,
}

fn parse_chunk(line: &str) -> Result<ChunkEvent> {
    let chunk: ChatChunk =
        serde_json::from_str(line).map_err(|e| VocaliveError::Generation {
            message: format!("invalid chunk from Ollama: {}", e),
        })?;
    if let Some(error) = chunk.error {
        return Err(VocaliveError::Generation { message: error });
    }
    if chunk.done {
        return Ok(ChunkEvent::Done);
    }
    match chunk.message {
        Some(message) if !message.content.is_empty() => Ok(ChunkEvent::Fragment(message.content)),
        _ => Ok(ChunkEvent::Skip),
    }
}

/// Splits a byte stream on newlines, buffering partial lines across reads.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every complete, non-blank line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let rest = self.buffer.split_off(pos + 1);
            let line = std::mem::replace(&mut self.buffer, rest);
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Return the unterminated last line, if any.
    pub fn finish(self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        if line.is_empty() { None } else { Some(line) }
    }
}

/// Generator backed by a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    options: GenerationOptions,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/chat", config.host.trim_end_matches('/')),
            model: config.model.clone(),
            options: GenerationOptions {
                num_predict: config.num_predict,
                temperature: config.temperature,
                top_p: config.top_p,
            },
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Forward one decoded line. Returns false once the stream should stop.
    async fn forward(line: &str, fragments: &mpsc::Sender<String>) -> Result<bool> {
        match parse_chunk(line)? {
            ChunkEvent::Fragment(text) => Ok(fragments.send(text).await.is_ok()),
            ChunkEvent::Done => Ok(false),
            ChunkEvent::Skip => Ok(true),
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: &[Turn], fragments: mpsc::Sender<String>) -> Result<()> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
            options: self.options,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| VocaliveError::Generation {
                message: format!("Ollama unreachable at {}: {}", self.endpoint, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VocaliveError::Generation {
                message: format!("Ollama returned {}: {}", status, body.trim()),
            });
        }

        let mut decoder = NdjsonDecoder::new();
        let mut stream = response.bytes_stream();
        while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| VocaliveError::Generation {
                message: format!("failed to read Ollama stream: {}", e),
            })?;
            for line in decoder.push(&bytes) {
                if !Self::forward(&line, &fragments).await? {
                    return Ok(());
                }
            }
        }
        if let Some(line) = decoder.finish() {
            Self::forward(&line, &fragments).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let config = LlmConfig {
            host: "http://gpu-box:11434/".to_string(),
            ..LlmConfig::default()
        };
        let generator = OllamaGenerator::new(&config);
        assert_eq!(generator.endpoint(), "http://gpu-box:11434/api/chat");
        assert_eq!(generator.model_name(), "mistral:7b-instruct-v0.3-q4_0");
    }

    #[test]
    fn test_request_serializes_ollama_shape() {
        let messages = vec![Turn::system("Tu es Léa."), Turn::user("Salut")];
        let request = ChatRequest {
            model: "mistral",
            messages: &messages,
            stream: true,
            options: GenerationOptions {
                num_predict: 150,
                temperature: 0.7,
                top_p: 0.9,
            },
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "mistral");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Salut");
        assert_eq!(json["options"]["num_predict"], 150);
    }

    #[test]
    fn test_parse_chunk_variants() {
        assert_eq!(
            parse_chunk(r#"{"message":{"role":"assistant","content":"Bon"},"done":false}"#)
                .unwrap(),
            ChunkEvent::Fragment("Bon".to_string())
        );
        assert_eq!(
            parse_chunk(r#"{"message":{"role":"assistant","content":""},"done":true}"#).unwrap(),
            ChunkEvent::Done
        );
        assert_eq!(
            parse_chunk(r#"{"message":{"role":"assistant","content":""},"done":false}"#)
                .unwrap(),
            ChunkEvent::Skip
        );
        assert!(matches!(
            parse_chunk(r#"{"error":"model 'x' not found"}"#),
            Err(VocaliveError::Generation { message }) if message.contains("not found")
        ));
        assert!(parse_chunk("not json").is_err());
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(b"{\"a\":").is_empty());
        assert_eq!(decoder.push(b"1}\n\n{\"b\":2}\n{\"c\""), vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(decoder.push(b":3}"), Vec::<String>::new());
        assert_eq!(decoder.finish(), Some("{\"c\":3}".to_string()));
    }

    #[test]
    fn test_decoder_handles_multibyte_split() {
        let line = "{\"message\":{\"content\":\"été\"}}\n".as_bytes();
        let (head, tail) = line.split_at(24);
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(head).is_empty());
        let lines = decoder.push(tail);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("été"));
    }

    #[tokio::test]
    async fn test_forward_stops_on_done_and_closed_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        assert!(
            OllamaGenerator::forward(r#"{"message":{"content":"Oui"}}"#, &tx)
                .await
                .unwrap()
        );
        assert_eq!(rx.recv().await, Some("Oui".to_string()));
        assert!(!OllamaGenerator::forward(r#"{"done":true}"#, &tx).await.unwrap());

        drop(rx);
        assert!(
            !OllamaGenerator::forward(r#"{"message":{"content":"Non"}}"#, &tx)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_generation_error() {
        let config = LlmConfig {
            host: "http://127.0.0.1:9".to_string(),
            ..LlmConfig::default()
        };
        let generator = OllamaGenerator::new(&config);
        let (tx, _rx) = mpsc::channel(1);

        let result = generator.stream_chat(&[Turn::user("Salut")], tx).await;
        assert!(matches!(result, Err(VocaliveError::Generation { .. })));
    }
}
