//! whisper.cpp transcription of drained session audio blocks.
//!
//! Inference needs the `whisper` feature (cmake is required to build
//! whisper.cpp). Without it [`WhisperTranscriber::new`] always fails, which a
//! session treats as a transcription load failure: audio is ignored while
//! `input.text` keeps working.

use crate::config::SttConfig;
use crate::defaults;
use crate::error::{Result, VocaliveError};
use crate::stt::transcriber::{Transcriber, TranscriptionResult};
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState};

/// Beam width used for every block.
#[cfg(feature = "whisper")]
const BEAM_SIZE: i32 = 5;

#[cfg(feature = "whisper")]
static WHISPER_LOG_HOOKS: Once = Once::new();

/// Settings for one loaded whisper model.
#[derive(Debug, Clone, PartialEq)]
pub struct WhisperConfig {
    /// GGML model file
    pub model_path: PathBuf,
    /// Forced language, or `auto`
    pub language: String,
    pub threads: Option<i32>,
}

impl WhisperConfig {
    /// Build from the `[stt]` section.
    ///
    /// # Errors
    /// `ConfigInvalidValue` when no model path is configured.
    pub fn from_config(config: &SttConfig) -> Result<Self> {
        let Some(model_path) = config.model_path.clone() else {
            return Err(VocaliveError::ConfigInvalidValue {
                key: "stt.model_path".to_string(),
                message: "no whisper model configured (set VOCALIVE_STT_MODEL)".to_string(),
            });
        };
        Ok(Self {
            model_path,
            language: config.language.clone(),
            threads: config.threads,
        })
    }

    /// `None` lets whisper detect the language.
    pub fn forced_language(&self) -> Option<&str> {
        let language = self.language.trim();
        if language.is_empty() || language == defaults::AUTO_LANGUAGE {
            None
        } else {
            Some(language)
        }
    }

    /// `ggml-small.bin` -> `ggml-small`
    pub fn model_name(&self) -> String {
        model_stem(&self.model_path)
    }

    fn ensure_model_exists(&self) -> Result<()> {
        if self.model_path.is_file() {
            Ok(())
        } else {
            Err(VocaliveError::TranscriptionModelNotFound {
                path: self.model_path.display().to_string(),
            })
        }
    }
}

fn model_stem(path: &Path) -> String {
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem.to_string(),
        None => "unknown".to_string(),
    }
}

/// Scale PCM16 samples into whisper's `[-1.0, 1.0]` input range.
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}

/// Join trimmed segment texts with single spaces, skipping empty ones.
pub fn join_segments<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for segment in segments {
        let segment = segment.as_ref().trim();
        if segment.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(segment);
    }
    text
}

fn inference_error(what: &str, e: impl std::fmt::Display) -> VocaliveError {
    VocaliveError::TranscriptionInferenceFailed {
        message: format!("{}: {}", what, e),
    }
}

/// One loaded whisper model.
///
/// Each session owns its own instance; the context mutex only serialises
/// calls made through clones of the same `Arc`.
#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("model", &self.model_name)
            .field("language", &self.config.language)
            .finish_non_exhaustive()
    }
}

impl WhisperTranscriber {
    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Load the GGML model. Blocking; run it off the async executor.
    ///
    /// # Errors
    /// `TranscriptionModelNotFound` for a missing file,
    /// `TranscriptionInferenceFailed` when whisper.cpp rejects it.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        WHISPER_LOG_HOOKS.call_once(whisper_rs::install_logging_hooks);
        config.ensure_model_exists()?;

        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| inference_error("Model path", "not valid UTF-8"))?;
        let mut params = WhisperContextParameters::default();
        params.flash_attn(true);
        let context = WhisperContext::new_with_params(path, params)
            .map_err(|e| inference_error("Failed to load whisper model", e))?;

        let model_name = config.model_name();
        tracing::info!(
            model = %model_name,
            language = config.forced_language().unwrap_or(defaults::AUTO_LANGUAGE),
            "Whisper model loaded"
        );
        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    fn params(&self) -> FullParams<'_, '_> {
        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: BEAM_SIZE,
            patience: -1.0,
        });
        params.set_language(self.config.forced_language());
        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads);
        }
        // Blocks are independent utterances.
        params.set_no_context(true);
        params.set_suppress_blank(true);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params
    }

    fn read_segments(state: &WhisperState) -> (String, f32) {
        let mut texts = Vec::new();
        let mut speech_probability = 0.0_f32;
        for segment in state.as_iter() {
            texts.push(segment.to_string());
            speech_probability += 1.0 - segment.no_speech_probability();
        }
        let confidence = if texts.is_empty() {
            0.0
        } else {
            (speech_probability / texts.len() as f32).clamp(0.0, 1.0)
        };
        (join_segments(&texts), confidence)
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    /// Always fails: no speech recognition is compiled in.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        config.ensure_model_exists()?;
        Err(VocaliveError::TranscriptionInferenceFailed {
            message: "built without the `whisper` feature; rebuild with --features whisper"
                .to_string(),
        })
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &[i16]) -> Result<TranscriptionResult> {
        let samples = pcm16_to_f32(audio);
        let context = self
            .context
            .lock()
            .map_err(|e| inference_error("Whisper context poisoned", e))?;
        let mut state = context
            .create_state()
            .map_err(|e| inference_error("Failed to create whisper state", e))?;
        state
            .full(self.params(), &samples)
            .map_err(|e| inference_error("Whisper inference failed", e))?;

        let (text, confidence) = Self::read_segments(&state);
        let language = match self.config.forced_language() {
            Some(language) => language.to_string(),
            None => whisper_rs::get_lang_str(state.full_lang_id_from_state())
                .unwrap_or_default()
                .to_string(),
        };
        Ok(TranscriptionResult {
            text,
            language,
            confidence,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<TranscriptionResult> {
        Err(VocaliveError::TranscriptionInferenceFailed {
            message: "built without the `whisper` feature".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}
