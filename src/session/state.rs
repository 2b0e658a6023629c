use crate::backends::{Backends, SharedSynthesizer, SharedTranscriber};
use crate::session::audio_buffer::AudioIngestBuffer;
use crate::session::config::{SessionConfig, SessionUpdate};
use crate::session::history::ConversationHistory;
use crate::session::load_guard::ModelLoadGuard;
use std::sync::Arc;
use uuid::Uuid;

/// Everything one conversation owns.
///
/// Exactly one connection task holds a session at a time, so nothing here is
/// internally synchronized beyond the model guards.
#[derive(Debug)]
pub struct SessionState {
    id: Uuid,
    config: SessionConfig,
    history: ConversationHistory,
    audio: AudioIngestBuffer,
    transcriber: ModelLoadGuard<SharedTranscriber>,
    synthesizer: ModelLoadGuard<SharedSynthesizer>,
    backends: Arc<Backends>,
}

impl SessionState {
    pub fn new(id: Uuid, config: SessionConfig, backends: Arc<Backends>) -> Self {
        Self {
            id,
            history: ConversationHistory::new(&config, backends.history_window),
            audio: AudioIngestBuffer::new(backends.min_audio_bytes),
            transcriber: backends.transcriber_guard(),
            synthesizer: backends.synthesizer_guard(config.tts_engine),
            config,
            backends,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut ConversationHistory {
        &mut self.history
    }

    pub fn audio_mut(&mut self) -> &mut AudioIngestBuffer {
        &mut self.audio
    }

    pub fn transcriber(&self) -> &ModelLoadGuard<SharedTranscriber> {
        &self.transcriber
    }

    pub fn synthesizer(&self) -> &ModelLoadGuard<SharedSynthesizer> {
        &self.synthesizer
    }

    pub fn backends(&self) -> &Arc<Backends> {
        &self.backends
    }

    /// Inject recalled memories into the preamble.
    pub fn inject_memory(&mut self, memory_context: &str) {
        self.history.inject_memory(&self.config, memory_context);
    }

    /// Apply a client reconfiguration.
    ///
    /// The preamble is rebuilt; existing turns are kept. A different engine
    /// replaces the synthesis guard, so the next turn loads the new backend.
    /// Returns true when the engine changed.
    pub fn apply_update(&mut self, update: &SessionUpdate) -> bool {
        let next = self.config.apply(update);
        let engine_changed = next.tts_engine != self.config.tts_engine;
        if engine_changed {
            tracing::info!(
                session = %self.id,
                from = %self.config.tts_engine,
                to = %next.tts_engine,
                "Switching synthesis engine"
            );
            self.synthesizer = self.backends.synthesizer_guard(next.tts_engine);
        }
        self.config = next;
        self.history.refresh_preamble(&self.config);
        engine_changed
    }

    /// Reset the conversation to the bare preamble.
    pub fn clear_history(&mut self) {
        self.history.clear(&self.config);
    }
}
