use crate::error::{Result, VocaliveError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Supported synthesis backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisEngine {
    /// Fast, low-latency voice.
    #[default]
    Melo,
    /// Expressive voice with emotion control and optional cloning.
    Chatterbox,
}

impl SynthesisEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisEngine::Melo => "melo",
            SynthesisEngine::Chatterbox => "chatterbox",
        }
    }

    /// Parse an engine name, falling back to melo on unknown input.
    pub fn from_name_or_default(name: &str) -> Self {
        match name.parse() {
            Ok(engine) => engine,
            Err(_) => {
                tracing::warn!(engine = %name, "Unknown synthesis engine, falling back to melo");
                SynthesisEngine::Melo
            }
        }
    }
}

impl FromStr for SynthesisEngine {
    type Err = VocaliveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "melo" => Ok(SynthesisEngine::Melo),
            "chatterbox" => Ok(SynthesisEngine::Chatterbox),
            _ => Err(VocaliveError::UnknownEngine {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SynthesisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One utterance to speak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub speed: f32,
    pub emotion_exaggeration: f32,
}

/// Streaming text-to-speech.
///
/// Implementations push 24kHz mono PCM16 segments into `chunks` as they become
/// available and return once the utterance is complete. A closed receiver means
/// the consumer went away; implementations stop early and return `Ok(())`.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn engine(&self) -> SynthesisEngine;

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        chunks: mpsc::Sender<Vec<u8>>,
    ) -> Result<()>;
}

/// Mock synthesizer for testing
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    engine: SynthesisEngine,
    chunks: Vec<Vec<u8>>,
    fail_after: Option<usize>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<SynthesisRequest>>>,
}

impl MockSynthesizer {
    /// Create a mock that emits a single two-byte chunk.
    pub fn new(engine: SynthesisEngine) -> Self {
        Self {
            engine,
            chunks: vec![vec![0, 0]],
            fail_after: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the chunks emitted per call
    pub fn with_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Fail after emitting `count` chunks
    pub fn with_failure_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Number of synthesize calls, shared across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    fn engine(&self) -> SynthesisEngine {
        self.engine
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        chunks: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        for (index, chunk) in self.chunks.iter().enumerate() {
            if self.fail_after == Some(index) {
                return Err(VocaliveError::Synthesis {
                    message: "mock synthesis failure".to_string(),
                });
            }
            if chunks.send(chunk.clone()).await.is_err() {
                return Ok(());
            }
        }
        if let Some(count) = self.fail_after
            && count >= self.chunks.len()
        {
            return Err(VocaliveError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            voice_id: "fr_FR-melo-voice1".to_string(),
            speed: 1.0,
            emotion_exaggeration: 0.5,
        }
    }

    #[test]
    fn test_engine_parsing_is_case_insensitive() {
        assert_eq!("melo".parse::<SynthesisEngine>().unwrap(), SynthesisEngine::Melo);
        assert_eq!(
            " Chatterbox ".parse::<SynthesisEngine>().unwrap(),
            SynthesisEngine::Chatterbox
        );
        assert!(matches!(
            "piper".parse::<SynthesisEngine>(),
            Err(VocaliveError::UnknownEngine { .. })
        ));
    }

    #[test]
    fn test_unknown_engine_falls_back_to_melo() {
        assert_eq!(
            SynthesisEngine::from_name_or_default("espeak"),
            SynthesisEngine::Melo
        );
        assert_eq!(
            SynthesisEngine::from_name_or_default("chatterbox"),
            SynthesisEngine::Chatterbox
        );
    }

    #[test]
    fn test_engine_serializes_lowercase() {
        let json = serde_json::to_string(&SynthesisEngine::Chatterbox).unwrap();
        assert_eq!(json, "\"chatterbox\"");
        assert_eq!(SynthesisEngine::Melo.to_string(), "melo");
    }

    #[tokio::test]
    async fn test_mock_emits_configured_chunks_in_order() {
        let synth = MockSynthesizer::new(SynthesisEngine::Melo)
            .with_chunks(vec![vec![1, 1], vec![2, 2], vec![3, 3]]);
        let (tx, mut rx) = mpsc::channel(8);

        synth.synthesize(&request("Salut"), tx).await.unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.push(chunk);
        }
        assert_eq!(received, vec![vec![1, 1], vec![2, 2], vec![3, 3]]);
        assert_eq!(synth.call_count(), 1);
        assert_eq!(synth.requests()[0].text, "Salut");
    }

    #[tokio::test]
    async fn test_mock_failure_after_partial_output() {
        let synth = MockSynthesizer::new(SynthesisEngine::Chatterbox)
            .with_chunks(vec![vec![1, 1], vec![2, 2]])
            .with_failure_after(1);
        let (tx, mut rx) = mpsc::channel(8);

        let result = synth.synthesize(&request("Salut"), tx).await;

        assert!(matches!(result, Err(VocaliveError::Synthesis { .. })));
        assert_eq!(rx.recv().await, Some(vec![1, 1]));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_mock_stops_when_receiver_dropped() {
        let synth =
            MockSynthesizer::new(SynthesisEngine::Melo).with_chunks(vec![vec![1, 1], vec![2, 2]]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert!(synth.synthesize(&request("Salut"), tx).await.is_ok());
    }
}
