//! Per-session persona and voice settings.

use crate::config::Config;
use crate::defaults;
use crate::tts::synthesizer::SynthesisEngine;
use serde::Serialize;

pub const DEFAULT_PERSONALITY: &str = "Tu es un assistant vocal intelligent, chaleureux et naturel. \
Tu parles avec un ton décontracté, amical et engageant. \
Tu utilises des expressions naturelles du français parlé.";

pub const DEFAULT_SITUATION: &str = "Tu es dans une conversation vocale en temps réel. \
Réponds de manière concise et naturelle, comme dans une vraie discussion.";

const SPOKEN_STYLE_RULES: &str = "Instructions importantes :
- Parle TOUJOURS en français naturel et décontracté.
- Utilise un ton conversationnel, comme si tu parlais à un ami.
- Tes réponses doivent être CONCISES (2-3 phrases max) car elles seront prononcées à voix haute.
- Tu peux utiliser des expressions familières, des interjections (ah, oh, ben, euh, etc.).
- N'utilise JAMAIS de markdown, de listes à puces, ou de formatage texte.
- N'utilise JAMAIS d'émojis.
- Si l'utilisateur t'interrompt, arrête-toi et réponds à sa nouvelle question.
- Sois expressif et montre des émotions dans tes réponses.
";

/// Settings that shape one conversation.
///
/// Replaced wholesale on update; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub voice_id: String,
    pub personality: String,
    pub situation: String,
    pub language: String,
    pub tts_engine: SynthesisEngine,
    pub tts_speed: f32,
    pub emotion_exaggeration: f32,
    pub user_id: String,
}

/// Partial reconfiguration requested by a client. Blank fields are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub voice_id: Option<String>,
    pub personality: Option<String>,
    pub situation: Option<String>,
    pub tts_engine: Option<SynthesisEngine>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice_id: defaults::DEFAULT_VOICE_ID.to_string(),
            personality: DEFAULT_PERSONALITY.to_string(),
            situation: DEFAULT_SITUATION.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            tts_engine: SynthesisEngine::Melo,
            tts_speed: 1.0,
            emotion_exaggeration: 0.5,
            user_id: defaults::DEFAULT_USER_ID.to_string(),
        }
    }
}

impl SessionConfig {
    /// Session defaults derived from the server configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            voice_id: config.tts.voice_id.clone(),
            personality: config
                .session
                .personality
                .clone()
                .unwrap_or_else(|| DEFAULT_PERSONALITY.to_string()),
            situation: config
                .session
                .situation
                .clone()
                .unwrap_or_else(|| DEFAULT_SITUATION.to_string()),
            language: config.session.language.clone(),
            tts_engine: config.tts.engine,
            tts_speed: config.tts.speed,
            emotion_exaggeration: config.tts.emotion_exaggeration,
            user_id: config.session.user_id.clone(),
        }
    }

    /// System preamble built from personality and situation.
    pub fn build_preamble(&self) -> String {
        format!(
            "Tu es {}\n\nLa situation actuelle est : {}\n\n{}",
            self.personality, self.situation, SPOKEN_STYLE_RULES
        )
    }

    /// Preamble with a block of recalled memories appended.
    pub fn build_preamble_with_memory(&self, memory_context: &str) -> String {
        format!(
            "{}\n\nContexte mémorisé sur l'utilisateur :\n{}\n\
             Utilise ces informations de manière naturelle dans la conversation, \
             sans les répéter mot pour mot.",
            self.build_preamble(),
            memory_context
        )
    }

    /// New config with the non-blank fields of `update` applied.
    pub fn apply(&self, update: &SessionUpdate) -> Self {
        let mut next = self.clone();
        if let Some(voice_id) = non_blank(&update.voice_id) {
            next.voice_id = voice_id;
        }
        if let Some(personality) = non_blank(&update.personality) {
            next.personality = personality;
        }
        if let Some(situation) = non_blank(&update.situation) {
            next.situation = situation;
        }
        if let Some(engine) = update.tts_engine {
            next.tts_engine = engine;
        }
        next
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Shorten long free text for display: first characters plus an ellipsis.
pub fn truncate_for_display(text: &str) -> String {
    let head: String = text.chars().take(defaults::SUMMARY_CHARS).collect();
    format!("{}...", head)
}
