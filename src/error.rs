//! Error types for vocalive.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VocaliveError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Transcription errors
    #[error("Transcription model not found at {path}")]
    TranscriptionModelNotFound { path: String },

    #[error("Transcription inference failed: {message}")]
    TranscriptionInferenceFailed { message: String },

    #[error("Transcription error: {message}")]
    Transcription { message: String },

    // Backend errors
    #[error("Generation failed: {message}")]
    Generation { message: String },

    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Unknown synthesis engine: {name}")]
    UnknownEngine { name: String },

    #[error("Memory backend error: {message}")]
    Memory { message: String },

    #[error("Failed to load {model} model: {message}")]
    ModelLoad { model: String, message: String },

    // Session errors
    #[error("Session {id} already has an active connection")]
    SessionBusy { id: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VocaliveError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_parse_display() {
        let error = VocaliveError::ConfigParse {
            message: "invalid TOML syntax".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to parse configuration: invalid TOML syntax"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = VocaliveError::ConfigInvalidValue {
            key: "server.port".to_string(),
            message: "must be non-zero".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for server.port: must be non-zero"
        );
    }

    #[test]
    fn test_transcription_model_not_found_display() {
        let error = VocaliveError::TranscriptionModelNotFound {
            path: "/models/whisper.bin".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transcription model not found at /models/whisper.bin"
        );
    }

    #[test]
    fn test_generation_display() {
        let error = VocaliveError::Generation {
            message: "model not pulled".to_string(),
        };
        assert_eq!(error.to_string(), "Generation failed: model not pulled");
    }

    #[test]
    fn test_unknown_engine_display() {
        let error = VocaliveError::UnknownEngine {
            name: "espeak".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown synthesis engine: espeak");
    }

    #[test]
    fn test_model_load_display() {
        let error = VocaliveError::ModelLoad {
            model: "synthesis:melo".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to load synthesis:melo model: connection refused"
        );
    }

    #[test]
    fn test_session_busy_display() {
        let error = VocaliveError::SessionBusy {
            id: "abc".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Session abc already has an active connection"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VocaliveError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: VocaliveError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VocaliveError>();
        assert_sync::<VocaliveError>();
    }
}
