//! One conversational turn: transcribe, recall, generate, speak.

use crate::defaults;
use crate::error::{Result, VocaliveError};
use crate::llm::generator::collect_response;
use crate::memory::store::format_memories;
use crate::pipeline::events::EventSender;
use crate::pipeline::latency::TurnTiming;
use crate::server::protocol::ServerEvent;
use crate::session::audio_buffer::pcm16_to_samples;
use crate::session::state::SessionState;
use crate::tts::synthesizer::SynthesisRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Audio chunks buffered between a synthesizer and the socket.
const AUDIO_CHANNEL_CAPACITY: usize = 32;

/// What starts a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnInput {
    /// A drained block of 16 kHz mono PCM16.
    Audio(Vec<u8>),
    /// Typed text that bypasses transcription.
    Text(String),
}

impl TurnInput {
    fn audio_duration(&self) -> Duration {
        match self {
            TurnInput::Audio(bytes) => {
                let samples = bytes.len() / defaults::PCM16_BYTES_PER_SAMPLE;
                Duration::from_secs_f64(samples as f64 / defaults::INPUT_SAMPLE_RATE as f64)
            }
            TurnInput::Text(_) => Duration::ZERO,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing intelligible was heard; no events were sent.
    NoSpeech,
    /// The transcription model could not be used; no events were sent.
    TranscriptionUnavailable,
    /// The model produced an empty reply.
    EmptyResponse,
    /// A backend failed and the client got an error event.
    Failed,
    /// Reply spoken in full.
    Completed,
}

enum Heard {
    Text(String),
    Nothing,
    Unavailable,
}

/// Runs turns for one connection.
///
/// Every turn that gets past transcription ends with `response.end`. The only
/// error returned is `ConnectionClosed`, when the client is gone.
#[derive(Debug, Clone)]
pub struct TurnPipeline {
    events: EventSender,
}

impl TurnPipeline {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    pub async fn run(&self, state: &mut SessionState, input: TurnInput) -> Result<TurnOutcome> {
        let mut timing = TurnTiming::start(input.audio_duration());

        let (text, source) = match input {
            TurnInput::Audio(bytes) => match self.transcribe(state, bytes).await {
                Heard::Text(text) => (text, None),
                Heard::Nothing => return Ok(TurnOutcome::NoSpeech),
                Heard::Unavailable => return Ok(TurnOutcome::TranscriptionUnavailable),
            },
            TurnInput::Text(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Ok(TurnOutcome::NoSpeech);
                }
                (text, Some("text".to_string()))
            }
        };
        timing.mark_transcribed();
        tracing::info!(session = %state.id(), text = %text, "User said");

        self.events.send(ServerEvent::Transcription {
            text: text.clone(),
            is_final: true,
            source,
        })?;

        self.recall(state, &text).await;
        state.history_mut().append_user(text.as_str());

        self.events.send(ServerEvent::ResponseStart)?;
        let outcome = self.respond(state, &text, &mut timing).await?;
        self.events.send(ServerEvent::ResponseEnd)?;

        timing.log(&state.id());
        Ok(outcome)
    }

    async fn transcribe(&self, state: &SessionState, bytes: Vec<u8>) -> Heard {
        let transcriber = match state.transcriber().acquire().await {
            Ok(transcriber) => transcriber,
            Err(e) => {
                tracing::warn!(session = %state.id(), error = %e, "Transcription unavailable, dropping audio");
                return Heard::Unavailable;
            }
        };

        let samples = pcm16_to_samples(&bytes);
        let result = tokio::task::spawn_blocking(move || transcriber.transcribe(&samples)).await;
        match result {
            Ok(Ok(result)) if result.is_empty() => {
                tracing::debug!(session = %state.id(), "No speech detected");
                Heard::Nothing
            }
            Ok(Ok(result)) => Heard::Text(result.text.trim().to_string()),
            Ok(Err(e)) => {
                tracing::warn!(session = %state.id(), error = %e, "Transcription failed");
                Heard::Unavailable
            }
            Err(e) => {
                tracing::warn!(session = %state.id(), error = %e, "Transcription task failed");
                Heard::Unavailable
            }
        }
    }

    /// Inject relevant memories into the preamble. Failures count as no memories.
    async fn recall(&self, state: &mut SessionState, query: &str) {
        let backends = Arc::clone(state.backends());
        if !backends.memory.is_enabled() {
            return;
        }
        let user_id = state.config().user_id.clone();
        match backends
            .memory
            .search(query, &user_id, backends.memory_search_limit)
            .await
        {
            Ok(memories) => {
                let context = format_memories(&memories);
                if !context.is_empty() {
                    tracing::debug!(session = %state.id(), count = memories.len(), "Injecting memories");
                    state.inject_memory(&context);
                }
            }
            Err(e) => tracing::warn!(session = %state.id(), error = %e, "Memory search failed"),
        }
    }

    /// Generation and synthesis. Backend errors become an `error` event.
    async fn respond(
        &self,
        state: &mut SessionState,
        user_text: &str,
        timing: &mut TurnTiming,
    ) -> Result<TurnOutcome> {
        let backends = Arc::clone(state.backends());
        let snapshot = state.history().snapshot();

        let reply = match collect_response(backends.generator.as_ref(), &snapshot).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(session = %state.id(), error = %e, "Generation failed");
                self.events.error(format!("Processing error: {}", e))?;
                return Ok(TurnOutcome::Failed);
            }
        };
        timing.mark_generated();

        if reply.is_empty() {
            tracing::debug!(session = %state.id(), "Empty response from model");
            return Ok(TurnOutcome::EmptyResponse);
        }
        tracing::info!(session = %state.id(), text = %reply, "Agent says");

        self.events.send(ServerEvent::ResponseText {
            text: reply.clone(),
        })?;
        state.history_mut().append_assistant(reply.as_str());
        self.remember(state, user_text, &reply);

        self.speak(state, reply, timing).await
    }

    /// Store the exchange in the background.
    fn remember(&self, state: &SessionState, user_text: &str, reply: &str) {
        let memory = Arc::clone(&state.backends().memory);
        if !memory.is_enabled() {
            return;
        }
        let session = state.id();
        let user_id = state.config().user_id.clone();
        let user_text = user_text.to_string();
        let reply = reply.to_string();
        tokio::spawn(async move {
            if let Err(e) = memory.add_exchange(&user_id, &user_text, &reply).await {
                tracing::warn!(session = %session, error = %e, "Failed to store exchange in memory");
            }
        });
    }

    async fn speak(
        &self,
        state: &SessionState,
        text: String,
        timing: &mut TurnTiming,
    ) -> Result<TurnOutcome> {
        self.events.send(ServerEvent::AudioStart {
            sample_rate: defaults::OUTPUT_SAMPLE_RATE,
            channels: defaults::OUTPUT_CHANNELS,
        })?;

        let synthesizer = match state.synthesizer().acquire().await {
            Ok(synthesizer) => synthesizer,
            Err(e) => {
                tracing::warn!(session = %state.id(), error = %e, "Synthesis unavailable, skipping audio");
                self.events.send(ServerEvent::AudioEnd)?;
                return Ok(TurnOutcome::Completed);
            }
        };

        let config = state.config();
        let request = SynthesisRequest {
            text,
            voice_id: config.voice_id.clone(),
            speed: config.tts_speed,
            emotion_exaggeration: config.emotion_exaggeration,
        };

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(AUDIO_CHANNEL_CAPACITY);
        let producer = synthesizer.synthesize(&request, tx);
        let events = &self.events;
        // Owns `rx`: bailing out drops it, so a blocked producer sees a closed channel.
        let consumer = async move {
            let mut chunks = 0usize;
            while let Some(chunk) = rx.recv().await {
                timing.mark_first_audio();
                events.audio(chunk)?;
                chunks += 1;
            }
            Ok::<usize, VocaliveError>(chunks)
        };
        let (produced, forwarded) = tokio::join!(producer, consumer);
        let chunks = forwarded?;

        let outcome = match produced {
            Ok(()) => {
                tracing::debug!(session = %state.id(), engine = %synthesizer.engine(), chunks, "Synthesis complete");
                TurnOutcome::Completed
            }
            Err(e) => {
                tracing::error!(session = %state.id(), engine = %synthesizer.engine(), error = %e, "Synthesis failed");
                self.events.error(format!("Processing error: {}", e))?;
                TurnOutcome::Failed
            }
        };
        self.events.send(ServerEvent::AudioEnd)?;
        Ok(outcome)
    }
}
