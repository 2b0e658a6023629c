use crate::error::{Result, VocaliveError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Output of one transcription call.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    /// Recognized text, trimmed.
    pub text: String,
    /// Detected or configured language code.
    pub language: String,
    /// Mean segment confidence in 0.0..=1.0.
    pub confidence: f32,
}

impl TranscriptionResult {
    /// True when nothing intelligible was recognized.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Speech-to-text over one drained audio block.
///
/// Calls block; the turn pipeline runs them on the blocking pool.
pub trait Transcriber: Send + Sync {
    /// Recognise one block of 16 kHz mono PCM16 samples.
    fn transcribe(&self, audio: &[i16]) -> Result<TranscriptionResult>;

    fn model_name(&self) -> &str;

    /// False when the backend cannot run inference at all.
    fn is_ready(&self) -> bool;
}

impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16]) -> Result<TranscriptionResult> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Scripted transcriber for tests; every clone shares one call counter.
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Text returned for every block
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Fail every call with `Transcription`
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of transcribe calls, shared across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            Err(VocaliveError::Transcription {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(TranscriptionResult {
                text: self.response.clone(),
                language: "fr".to_string(),
                confidence: 1.0,
            })
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
