//! Adapter wiring shared by every session.
//!
//! Generation and memory clients are stateless and shared. Transcription and
//! synthesis models are per session, so only their factories live here.

use crate::config::Config;
use crate::defaults;
use crate::error::Result;
use crate::llm::generator::Generator;
use crate::llm::ollama::OllamaGenerator;
use crate::memory::mem0::Mem0Client;
use crate::memory::store::{DisabledMemory, MemoryStore};
use crate::session::load_guard::{Loader, ModelLoadGuard};
use crate::stt::transcriber::Transcriber;
use crate::stt::whisper::{WhisperConfig, WhisperTranscriber};
use crate::tts::http::HttpSynthesizer;
use crate::tts::synthesizer::{SynthesisEngine, Synthesizer};
use std::fmt;
use std::sync::Arc;

pub type SharedTranscriber = Arc<dyn Transcriber>;
pub type SharedSynthesizer = Arc<dyn Synthesizer>;

/// Builds a transcriber. Called on the blocking pool.
pub type TranscriberFactory = Loader<SharedTranscriber>;

/// Builds a synthesizer for an engine. Called on the blocking pool.
pub type SynthesizerFactory = Arc<dyn Fn(SynthesisEngine) -> Result<SharedSynthesizer> + Send + Sync>;

pub struct Backends {
    transcriber_factory: TranscriberFactory,
    synthesizer_factory: SynthesizerFactory,
    pub generator: Arc<dyn Generator>,
    pub memory: Arc<dyn MemoryStore>,
    pub history_window: usize,
    pub min_audio_bytes: usize,
    pub memory_search_limit: usize,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("generator", &self.generator.model_name())
            .field("memory_enabled", &self.memory.is_enabled())
            .field("history_window", &self.history_window)
            .field("min_audio_bytes", &self.min_audio_bytes)
            .finish_non_exhaustive()
    }
}

impl Backends {
    pub fn new(
        transcriber_factory: TranscriberFactory,
        synthesizer_factory: SynthesizerFactory,
        generator: Arc<dyn Generator>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            transcriber_factory,
            synthesizer_factory,
            generator,
            memory,
            history_window: defaults::HISTORY_WINDOW,
            min_audio_bytes: defaults::MIN_AUDIO_BYTES,
            memory_search_limit: defaults::MEMORY_SEARCH_LIMIT,
        }
    }

    /// Production wiring: whisper, HTTP sidecars, Ollama and mem0.
    pub fn from_config(config: &Config) -> Result<Self> {
        let stt = config.stt.clone();
        let transcriber_factory: TranscriberFactory = Arc::new(move || -> Result<SharedTranscriber> {
            let whisper = WhisperTranscriber::new(WhisperConfig::from_config(&stt)?)?;
            Ok(Arc::new(whisper) as SharedTranscriber)
        });

        let tts = config.tts.clone();
        let synthesizer_factory: SynthesizerFactory = Arc::new(move |engine| -> Result<SharedSynthesizer> {
            let synth =
                HttpSynthesizer::new(engine, tts.url_for(engine), tts.reference_audio.clone())?;
            Ok(Arc::new(synth) as SharedSynthesizer)
        });

        let memory: Arc<dyn MemoryStore> = if config.memory.enabled {
            Arc::new(Mem0Client::new(&config.memory)?)
        } else {
            Arc::new(DisabledMemory)
        };

        Ok(Self::new(
            transcriber_factory,
            synthesizer_factory,
            Arc::new(OllamaGenerator::new(&config.llm)),
            memory,
        )
        .with_history_window(config.session.history_window)
        .with_min_audio_bytes(config.session.min_audio_bytes)
        .with_memory_search_limit(config.memory.search_limit))
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_min_audio_bytes(mut self, bytes: usize) -> Self {
        self.min_audio_bytes = bytes;
        self
    }

    pub fn with_memory_search_limit(mut self, limit: usize) -> Self {
        self.memory_search_limit = limit;
        self
    }

    /// Fresh, unloaded transcription guard for a new session.
    pub fn transcriber_guard(&self) -> ModelLoadGuard<SharedTranscriber> {
        ModelLoadGuard::new("transcription", Arc::clone(&self.transcriber_factory))
    }

    /// Fresh, unloaded synthesis guard bound to `engine`.
    pub fn synthesizer_guard(&self, engine: SynthesisEngine) -> ModelLoadGuard<SharedSynthesizer> {
        let factory = Arc::clone(&self.synthesizer_factory);
        ModelLoadGuard::new(
            format!("synthesis:{}", engine),
            Arc::new(move || -> Result<SharedSynthesizer> { (*factory)(engine) }),
        )
    }
}
