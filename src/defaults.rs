//! Default configuration constants for vocalive.
//!
//! Shared by the config file layer, the session model and the protocol so the
//! audio formats on both sides of the socket stay consistent.

/// Sample rate of client microphone audio in Hz.
///
/// 16kHz mono is what the speech recognizer consumes without resampling.
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Bytes per sample for 16-bit signed PCM.
pub const PCM16_BYTES_PER_SAMPLE: usize = 2;

/// Duration of audio accumulated before a transcription attempt, in milliseconds.
pub const INGEST_WINDOW_MS: u32 = 500;

/// Byte threshold of the ingest buffer: 0.5s at 16kHz, 16-bit, mono.
pub const MIN_AUDIO_BYTES: usize = bytes_for_duration(INGEST_WINDOW_MS, INPUT_SAMPLE_RATE);

/// Sample rate of synthesized audio sent back to the client in Hz.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Channel count of synthesized audio.
pub const OUTPUT_CHANNELS: u16 = 1;

/// Size of one forwarded synthesis segment: ~1 second of 24kHz PCM16.
pub const SYNTHESIS_SEGMENT_BYTES: usize = OUTPUT_SAMPLE_RATE as usize * PCM16_BYTES_PER_SAMPLE;

/// Number of trailing user/assistant turns kept in the conversation window.
pub const HISTORY_WINDOW: usize = 20;

/// Maximum number of memories injected into the preamble per turn.
pub const MEMORY_SEARCH_LIMIT: usize = 5;

/// Characters kept when echoing long personality/situation texts back to clients.
pub const SUMMARY_CHARS: usize = 100;

/// Language tag advertised for new sessions.
pub const DEFAULT_LANGUAGE: &str = "fr-FR";

/// Language code handed to the speech recognizer.
pub const DEFAULT_STT_LANGUAGE: &str = "fr";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Default synthesis voice.
pub const DEFAULT_VOICE_ID: &str = "fr_FR-melo-voice1";

/// User identifier used for memory when the client does not supply one.
pub const DEFAULT_USER_ID: &str = "default";

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8765;

/// Largest accepted WebSocket message.
pub const WS_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Byte length of `duration_ms` of mono PCM16 audio at `sample_rate`.
pub const fn bytes_for_duration(duration_ms: u32, sample_rate: u32) -> usize {
    (sample_rate as usize * duration_ms as usize / 1000) * PCM16_BYTES_PER_SAMPLE
}
