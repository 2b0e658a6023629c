use crate::defaults;
use crate::error::{Result, VocaliveError};
use crate::tts::synthesizer::SynthesisEngine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub memory: MemoryConfig,
    pub session: SessionSettings,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL advertised to clients in `/start-session` responses.
    pub public_url: Option<String>,
}

/// Ollama generation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Path to a whisper GGML model file.
    pub model_path: Option<PathBuf>,
    pub language: String,
    pub threads: Option<i32>,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub engine: SynthesisEngine,
    pub voice_id: String,
    pub speed: f32,
    pub emotion_exaggeration: f32,
    pub melo_url: String,
    pub chatterbox_url: String,
    /// Reference clip for voice cloning (chatterbox only).
    pub reference_audio: Option<String>,
}

/// Long-term memory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub url: String,
    pub search_limit: usize,
}

/// Per-session defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    pub history_window: usize,
    pub min_audio_bytes: usize,
    pub language: String,
    pub user_id: String,
    pub personality: Option<String>,
    pub situation: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
            public_url: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "mistral:7b-instruct-v0.3-q4_0".to_string(),
            num_predict: 150,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            language: defaults::DEFAULT_STT_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: SynthesisEngine::Melo,
            voice_id: defaults::DEFAULT_VOICE_ID.to_string(),
            speed: 1.0,
            emotion_exaggeration: 0.5,
            melo_url: "http://localhost:8001".to_string(),
            chatterbox_url: "http://localhost:8002".to_string(),
            reference_audio: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8888".to_string(),
            search_limit: defaults::MEMORY_SEARCH_LIMIT,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_window: defaults::HISTORY_WINDOW,
            min_audio_bytes: defaults::MIN_AUDIO_BYTES,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            user_id: defaults::DEFAULT_USER_ID.to_string(),
            personality: None,
            situation: None,
        }
    }
}

impl TtsConfig {
    /// Sidecar base URL for the given engine.
    pub fn url_for(&self, engine: SynthesisEngine) -> &str {
        match engine {
            SynthesisEngine::Melo => &self.melo_url,
            SynthesisEngine::Chatterbox => &self.chatterbox_url,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOCALIVE_HOST → server.host
    /// - VOCALIVE_PORT → server.port
    /// - VOCALIVE_OLLAMA_HOST → llm.host
    /// - VOCALIVE_OLLAMA_MODEL → llm.model
    /// - VOCALIVE_STT_MODEL → stt.model_path
    /// - VOCALIVE_STT_LANGUAGE → stt.language
    /// - VOCALIVE_TTS_ENGINE → tts.engine
    /// - VOCALIVE_TTS_VOICE_ID → tts.voice_id
    /// - VOCALIVE_MEMORY_ENABLED → memory.enabled
    /// - VOCALIVE_MEMORY_URL → memory.url
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(host) = env_value("VOCALIVE_HOST") {
            self.server.host = host;
        }

        if let Some(port) = env_value("VOCALIVE_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid VOCALIVE_PORT"),
            }
        }

        if let Some(host) = env_value("VOCALIVE_OLLAMA_HOST") {
            self.llm.host = host;
        }

        if let Some(model) = env_value("VOCALIVE_OLLAMA_MODEL") {
            self.llm.model = model;
        }

        if let Some(model) = env_value("VOCALIVE_STT_MODEL") {
            self.stt.model_path = Some(PathBuf::from(model));
        }

        if let Some(language) = env_value("VOCALIVE_STT_LANGUAGE") {
            self.stt.language = language;
        }

        if let Some(engine) = env_value("VOCALIVE_TTS_ENGINE") {
            self.tts.engine = SynthesisEngine::from_name_or_default(&engine);
        }

        if let Some(voice) = env_value("VOCALIVE_TTS_VOICE_ID") {
            self.tts.voice_id = voice;
        }

        if let Some(enabled) = env_value("VOCALIVE_MEMORY_ENABLED") {
            match parse_bool(&enabled) {
                Some(enabled) => self.memory.enabled = enabled,
                None => tracing::warn!(value = %enabled, "Ignoring invalid VOCALIVE_MEMORY_ENABLED"),
            }
        }

        if let Some(url) = env_value("VOCALIVE_MEMORY_URL") {
            self.memory.url = url;
        }

        self
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "must be non-zero"));
        }
        if self.session.history_window == 0 {
            return Err(invalid("session.history_window", "must be at least 1"));
        }
        if self.session.min_audio_bytes < defaults::PCM16_BYTES_PER_SAMPLE {
            return Err(invalid(
                "session.min_audio_bytes",
                "must hold at least one PCM16 sample",
            ));
        }
        if self.tts.speed.is_nan() || self.tts.speed <= 0.0 {
            return Err(invalid("tts.speed", "must be positive"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid("llm.temperature", "must be within 0.0..=2.0"));
        }
        if self.llm.top_p.is_nan() || self.llm.top_p <= 0.0 || self.llm.top_p > 1.0 {
            return Err(invalid("llm.top_p", "must be within (0.0, 1.0]"));
        }
        for (key, url) in [
            ("llm.host", self.llm.host.as_str()),
            ("tts.melo_url", self.tts.melo_url.as_str()),
            ("tts.chatterbox_url", self.tts.chatterbox_url.as_str()),
            ("memory.url", self.memory.url.as_str()),
        ] {
            if let Err(e) = reqwest::Url::parse(url) {
                return Err(invalid(key, &format!("invalid URL '{}': {}", url, e)));
            }
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VocaliveError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/vocalive/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vocalive")
            .join("config.toml")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str, message: &str) -> VocaliveError {
    VocaliveError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_vocalive_env() {
        for key in [
            "VOCALIVE_HOST",
            "VOCALIVE_PORT",
            "VOCALIVE_OLLAMA_HOST",
            "VOCALIVE_OLLAMA_MODEL",
            "VOCALIVE_STT_MODEL",
            "VOCALIVE_STT_LANGUAGE",
            "VOCALIVE_TTS_ENGINE",
            "VOCALIVE_TTS_VOICE_ID",
            "VOCALIVE_MEMORY_ENABLED",
            "VOCALIVE_MEMORY_URL",
        ] {
            remove_env(key);
        }
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.llm.model, "mistral:7b-instruct-v0.3-q4_0");
        assert_eq!(config.llm.num_predict, 150);
        assert_eq!(config.stt.language, "fr");
        assert_eq!(config.stt.model_path, None);
        assert_eq!(config.tts.engine, SynthesisEngine::Melo);
        assert_eq!(config.tts.voice_id, "fr_FR-melo-voice1");
        assert!(config.memory.enabled);
        assert_eq!(config.memory.search_limit, 5);
        assert_eq!(config.session.history_window, 20);
        assert_eq!(config.session.min_audio_bytes, 16000);
        assert_eq!(config.session.language, "fr-FR");
        assert_eq!(config.session.user_id, "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [llm]
            model = "llama3.2:3b"
            temperature = 0.3

            [tts]
            engine = "chatterbox"
            voice_id = "narrator"

            [memory]
            enabled = false

            [session]
            history_window = 8
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.model, "llama3.2:3b");
        assert_eq!(config.llm.temperature, 0.3);
        assert_eq!(config.tts.engine, SynthesisEngine::Chatterbox);
        assert_eq!(config.tts.voice_id, "narrator");
        assert!(!config.memory.enabled);
        assert_eq!(config.session.history_window, 8);

        // Untouched sections keep defaults
        assert_eq!(config.llm.num_predict, 150);
        assert_eq!(config.stt.language, "fr");
    }

    #[test]
    fn test_unknown_engine_in_file_is_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[tts]\nengine = \"espeak\"\n")
            .unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_override_server_and_llm() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalive_env();

        set_env("VOCALIVE_PORT", "9100");
        set_env("VOCALIVE_OLLAMA_MODEL", "qwen2.5:7b");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.llm.model, "qwen2.5:7b");
        assert_eq!(config.server.host, "0.0.0.0"); // Not overridden

        clear_vocalive_env();
    }

    #[test]
    fn test_env_override_invalid_port_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalive_env();

        set_env("VOCALIVE_PORT", "not-a-port");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.server.port, 8765);

        clear_vocalive_env();
    }

    #[test]
    fn test_env_override_engine_and_memory() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalive_env();

        set_env("VOCALIVE_TTS_ENGINE", "chatterbox");
        set_env("VOCALIVE_MEMORY_ENABLED", "false");
        set_env("VOCALIVE_STT_MODEL", "/models/ggml-small.bin");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.tts.engine, SynthesisEngine::Chatterbox);
        assert!(!config.memory.enabled);
        assert_eq!(
            config.stt.model_path,
            Some(PathBuf::from("/models/ggml-small.bin"))
        );

        clear_vocalive_env();
    }

    #[test]
    fn test_env_override_unknown_engine_falls_back_to_melo() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalive_env();

        set_env("VOCALIVE_TTS_ENGINE", "espeak");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.tts.engine, SynthesisEngine::Melo);

        clear_vocalive_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalive_env();

        set_env("VOCALIVE_OLLAMA_MODEL", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.llm.model, "mistral:7b-instruct-v0.3-q4_0");

        clear_vocalive_env();
    }

    #[test]
    fn test_validate_rejects_zero_history_window() {
        let mut config = Config::default();
        config.session.history_window = 0;
        match config.validate() {
            Err(VocaliveError::ConfigInvalidValue { key, message }) => {
                assert_eq!(key, "session.history_window");
                assert_eq!(message, "must be at least 1");
            }
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }

        config.session.history_window = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.memory.url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(VocaliveError::ConfigInvalidValue { ref key, .. }) if key == "memory.url"
        ));

        let mut config = Config::default();
        config.llm.top_p = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_url_for_engine() {
        let tts = TtsConfig::default();
        assert_eq!(tts.url_for(SynthesisEngine::Melo), "http://localhost:8001");
        assert_eq!(
            tts.url_for(SynthesisEngine::Chatterbox),
            "http://localhost:8002"
        );
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[server\nhost = \"broken\n").unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_ends_with_vocalive_config() {
        let path = Config::default_path();
        assert!(path.ends_with("vocalive/config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
