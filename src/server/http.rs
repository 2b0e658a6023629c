//! Bootstrap REST endpoints.

use crate::config::ServerConfig;
use crate::server::AppState;
use crate::session::config::{SessionConfig, truncate_for_display};
use crate::session::registry::SessionSummary;
use crate::tts::synthesizer::SynthesisEngine;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
    pub memory_enabled: bool,
}

/// Body of `POST /start-session`. Missing fields take the server defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartSessionRequest {
    pub voice_id: Option<String>,
    pub personality: Option<String>,
    pub situation: Option<String>,
    pub language: Option<String>,
    pub tts_engine: Option<String>,
    pub tts_speed: Option<f32>,
    pub emotion_exaggeration: Option<f32>,
    pub user_id: Option<String>,
}

impl StartSessionRequest {
    /// Overlay this request on `defaults`.
    pub fn into_config(self, defaults: &SessionConfig) -> SessionConfig {
        let mut config = defaults.clone();
        if let Some(voice_id) = self.voice_id {
            config.voice_id = voice_id;
        }
        if let Some(personality) = self.personality {
            config.personality = personality;
        }
        if let Some(situation) = self.situation {
            config.situation = situation;
        }
        if let Some(language) = self.language {
            config.language = language;
        }
        if let Some(engine) = self.tts_engine {
            config.tts_engine = SynthesisEngine::from_name_or_default(&engine);
        }
        if let Some(speed) = self.tts_speed {
            config.tts_speed = speed;
        }
        if let Some(exaggeration) = self.emotion_exaggeration {
            config.emotion_exaggeration = exaggeration;
        }
        if let Some(user_id) = self.user_id {
            config.user_id = user_id;
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionConfig {
    pub voice_id: String,
    pub personality: String,
    pub situation: String,
    pub language: String,
    pub tts_engine: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
    pub config: StartSessionConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionList {
    pub sessions: Vec<SessionSummary>,
}

/// WebSocket URL a client should dial for session `id`.
pub fn websocket_url(server: &ServerConfig, id: Uuid) -> String {
    match server.public_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(base) => format!("{}/ws/{}", base.trim_end_matches('/'), id),
        None => format!("ws://{}:{}/ws/{}", server.host, server.port, id),
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::version_string(),
        active_sessions: state.registry.len(),
        memory_enabled: state.registry.backends().memory.is_enabled(),
    })
}

pub async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> Json<StartSessionResponse> {
    let config = request.into_config(state.registry.defaults());
    let echo = StartSessionConfig {
        voice_id: config.voice_id.clone(),
        personality: truncate_for_display(&config.personality),
        situation: truncate_for_display(&config.situation),
        language: config.language.clone(),
        tts_engine: config.tts_engine.to_string(),
    };
    tracing::info!(voice = %config.voice_id, engine = %config.tts_engine, "Starting session");
    let id = state.registry.create(config);

    Json(StartSessionResponse {
        session_id: id.to_string(),
        websocket_url: websocket_url(&state.config.server, id),
        config: echo,
    })
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionList> {
    Json(SessionList {
        sessions: state.registry.list(),
    })
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let removed = Uuid::parse_str(&session_id)
        .map(|id| state.registry.remove(id))
        .unwrap_or(false);
    if removed {
        Json(json!({ "status": "deleted", "session_id": session_id })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Session not found" })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(public_url: Option<&str>) -> ServerConfig {
        ServerConfig {
            public_url: public_url.map(str::to_string),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_websocket_url_from_listener() {
        let id = Uuid::nil();
        assert_eq!(
            websocket_url(&server(None), id),
            format!("ws://0.0.0.0:8765/ws/{}", id)
        );
    }

    #[test]
    fn test_websocket_url_prefers_public_url() {
        let id = Uuid::nil();
        assert_eq!(
            websocket_url(&server(Some("wss://voice.example.org/")), id),
            format!("wss://voice.example.org/ws/{}", id)
        );
        assert_eq!(
            websocket_url(&server(Some("  ")), id),
            format!("ws://0.0.0.0:8765/ws/{}", id)
        );
    }

    #[test]
    fn test_request_overlays_defaults() {
        let request = StartSessionRequest {
            personality: Some("un pirate".to_string()),
            tts_engine: Some("chatterbox".to_string()),
            user_id: Some("alice".to_string()),
            ..StartSessionRequest::default()
        };

        let config = request.into_config(&SessionConfig::default());

        assert_eq!(config.personality, "un pirate");
        assert_eq!(config.tts_engine, SynthesisEngine::Chatterbox);
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.voice_id, SessionConfig::default().voice_id);
    }

    #[test]
    fn test_unknown_engine_in_request_falls_back() {
        let request = StartSessionRequest {
            tts_engine: Some("espeak".to_string()),
            ..StartSessionRequest::default()
        };
        assert_eq!(
            request.into_config(&SessionConfig::default()).tts_engine,
            SynthesisEngine::Melo
        );
    }
}
