//! JSON messages exchanged over the session WebSocket.

use crate::session::config::{SessionConfig, SessionUpdate, truncate_for_display};
use crate::tts::synthesizer::SynthesisEngine;
use serde::{Deserialize, Serialize};

/// Control messages sent by the client as text frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session.update")]
    SessionUpdate {
        #[serde(default)]
        voice_id: Option<String>,
        #[serde(default)]
        personality: Option<String>,
        #[serde(default)]
        situation: Option<String>,
        #[serde(default)]
        tts_engine: Option<String>,
    },
    #[serde(rename = "conversation.clear")]
    ConversationClear,
    #[serde(rename = "memory.clear")]
    MemoryClear,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "input.text")]
    InputText {
        #[serde(default)]
        text: String,
    },
}

/// Result of decoding one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Message(ClientMessage),
    /// Valid JSON object with a `type` we do not handle.
    Unknown(String),
    /// Not JSON, or a known type with the wrong shape.
    Malformed(String),
}

impl ClientMessage {
    pub fn parse(text: &str) -> ParsedMessage {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return ParsedMessage::Malformed(e.to_string()),
        };
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string);

        match serde_json::from_value::<ClientMessage>(value) {
            Ok(message) => ParsedMessage::Message(message),
            Err(e) => match kind {
                Some(kind) if !Self::is_known_type(&kind) => ParsedMessage::Unknown(kind),
                _ => ParsedMessage::Malformed(e.to_string()),
            },
        }
    }

    fn is_known_type(kind: &str) -> bool {
        matches!(
            kind,
            "session.update" | "conversation.clear" | "memory.clear" | "ping" | "input.text"
        )
    }

    /// Convert a `session.update` payload into a session update.
    ///
    /// Unknown engine names fall back to melo.
    pub fn to_update(&self) -> Option<SessionUpdate> {
        match self {
            ClientMessage::SessionUpdate {
                voice_id,
                personality,
                situation,
                tts_engine,
            } => Some(SessionUpdate {
                voice_id: voice_id.clone(),
                personality: personality.clone(),
                situation: situation.clone(),
                tts_engine: tts_engine
                    .as_deref()
                    .filter(|name| !name.trim().is_empty())
                    .map(SynthesisEngine::from_name_or_default),
            }),
            _ => None,
        }
    }
}

/// Session settings echoed back to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigEcho {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_engine: Option<String>,
}

impl ConfigEcho {
    /// Echo sent with `session.created`.
    pub fn created(config: &SessionConfig) -> Self {
        Self {
            voice_id: Some(config.voice_id.clone()),
            language: Some(config.language.clone()),
            tts_engine: Some(config.tts_engine.to_string()),
            ..Self::default()
        }
    }

    /// Echo sent with `session.updated`; free text is shortened.
    pub fn updated(config: &SessionConfig) -> Self {
        Self {
            voice_id: Some(config.voice_id.clone()),
            personality: Some(truncate_for_display(&config.personality)),
            situation: Some(truncate_for_display(&config.situation)),
            tts_engine: Some(config.tts_engine.to_string()),
            ..Self::default()
        }
    }
}

/// Events sent by the server as text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated { session_id: String, config: ConfigEcho },
    #[serde(rename = "transcription")]
    Transcription {
        text: String,
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    #[serde(rename = "response.start")]
    ResponseStart,
    #[serde(rename = "response.text")]
    ResponseText { text: String },
    #[serde(rename = "audio.start")]
    AudioStart { sample_rate: u32, channels: u16 },
    #[serde(rename = "audio.end")]
    AudioEnd,
    #[serde(rename = "response.end")]
    ResponseEnd,
    #[serde(rename = "session.updated")]
    SessionUpdated { config: ConfigEcho },
    #[serde(rename = "conversation.cleared")]
    ConversationCleared,
    #[serde(rename = "memory.cleared")]
    MemoryCleared,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Wire name of the event, as found in its `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SessionCreated { .. } => "session.created",
            ServerEvent::Transcription { .. } => "transcription",
            ServerEvent::ResponseStart => "response.start",
            ServerEvent::ResponseText { .. } => "response.text",
            ServerEvent::AudioStart { .. } => "audio.start",
            ServerEvent::AudioEnd => "audio.end",
            ServerEvent::ResponseEnd => "response.end",
            ServerEvent::SessionUpdated { .. } => "session.updated",
            ServerEvent::ConversationCleared => "conversation.cleared",
            ServerEvent::MemoryCleared => "memory.cleared",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// One frame queued for the client.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Event(ServerEvent),
    Audio(Vec<u8>),
    /// Close the socket after everything queued before it.
    Close,
}

/// One frame received from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Binary(Vec<u8>),
    Text(String),
    Close,
}
