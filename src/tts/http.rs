//! HTTP sidecar synthesizer.
//!
//! Both engines run as local services exposing `POST /synthesize`, which
//! streams raw 24kHz mono PCM16 in the response body. The body is re-cut into
//! fixed one-second segments before being handed to the session.

use crate::defaults;
use crate::error::{Result, VocaliveError};
use crate::tts::synthesizer::{SynthesisEngine, SynthesisRequest, Synthesizer};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;

/// Re-chunks an arbitrary byte stream into fixed-size PCM segments.
#[derive(Debug)]
pub struct PcmChunker {
    segment_bytes: usize,
    pending: Vec<u8>,
}

impl PcmChunker {
    pub fn new(segment_bytes: usize) -> Self {
        Self {
            segment_bytes: segment_bytes.max(defaults::PCM16_BYTES_PER_SAMPLE),
            pending: Vec::with_capacity(segment_bytes),
        }
    }

    /// Append bytes and return every segment that is now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut segments = Vec::new();
        while self.pending.len() >= self.segment_bytes {
            let rest = self.pending.split_off(self.segment_bytes);
            segments.push(std::mem::replace(&mut self.pending, rest));
        }
        segments
    }

    /// Flush the trailing partial segment. An unpaired final byte is discarded.
    pub fn finish(mut self) -> Option<Vec<u8>> {
        if self.pending.len() % defaults::PCM16_BYTES_PER_SAMPLE != 0 {
            tracing::debug!("Dropping trailing odd byte from synthesis stream");
            self.pending.pop();
        }
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending)
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    voice_id: &'a str,
    sample_rate: u32,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exaggeration: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_audio: Option<&'a str>,
}

/// Synthesizer backed by a melo or chatterbox HTTP sidecar.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    engine: SynthesisEngine,
    endpoint: reqwest::Url,
    reference_audio: Option<String>,
    segment_bytes: usize,
}

impl HttpSynthesizer {
    /// Create a client for the sidecar at `base_url`.
    ///
    /// # Errors
    /// Returns `VocaliveError::ModelLoad` when the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        engine: SynthesisEngine,
        base_url: &str,
        reference_audio: Option<String>,
    ) -> Result<Self> {
        let load_error = |message: String| VocaliveError::ModelLoad {
            model: format!("synthesis:{}", engine),
            message,
        };
        let endpoint = reqwest::Url::parse(base_url)
            .and_then(|url| url.join("synthesize"))
            .map_err(|e| load_error(format!("invalid sidecar URL '{}': {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| load_error(e.to_string()))?;

        Ok(Self {
            client,
            engine,
            endpoint,
            reference_audio,
            segment_bytes: defaults::SYNTHESIS_SEGMENT_BYTES,
        })
    }

    /// Override the forwarded segment size.
    pub fn with_segment_bytes(mut self, segment_bytes: usize) -> Self {
        self.segment_bytes = segment_bytes;
        self
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn body<'a>(&'a self, request: &'a SynthesisRequest) -> SynthesizeBody<'a> {
        let (speed, exaggeration, reference_audio) = match self.engine {
            SynthesisEngine::Melo => (Some(request.speed), None, None),
            SynthesisEngine::Chatterbox => (
                None,
                Some(request.emotion_exaggeration),
                self.reference_audio.as_deref(),
            ),
        };
        SynthesizeBody {
            text: &request.text,
            voice_id: &request.voice_id,
            sample_rate: defaults::OUTPUT_SAMPLE_RATE,
            format: "pcm_s16le",
            speed,
            exaggeration,
            reference_audio,
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    fn engine(&self) -> SynthesisEngine {
        self.engine
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        chunks: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| VocaliveError::Synthesis {
                message: format!("{} sidecar unreachable: {}", self.engine, e),
            })?;

        if !response.status().is_success() {
            return Err(VocaliveError::Synthesis {
                message: format!("{} sidecar returned {}", self.engine, response.status()),
            });
        }

        let mut chunker = PcmChunker::new(self.segment_bytes);
        let mut stream = response.bytes_stream();
        while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| VocaliveError::Synthesis {
                message: format!("failed to read audio stream: {}", e),
            })?;
            for segment in chunker.push(&bytes) {
                if chunks.send(segment).await.is_err() {
                    return Ok(());
                }
            }
        }
        if let Some(tail) = chunker.finish()
            && chunks.send(tail).await.is_err()
        {
            tracing::debug!("Synthesis consumer closed before final segment");
        }
        Ok(())
    }
}
