//! Bounded conversation history.
//!
//! The system preamble lives in its own slot and is never trimmed; only the
//! user/assistant turns behind it are windowed.

use crate::session::config::SessionConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the conversation, in chat-completion shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// System preamble followed by at most `window` user/assistant turns.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    preamble: Turn,
    turns: VecDeque<Turn>,
    window: usize,
}

impl ConversationHistory {
    /// `Config::validate` rejects a zero window; callers building
    /// `Backends` by hand still get at least one turn.
    pub fn new(config: &SessionConfig, window: usize) -> Self {
        Self {
            preamble: Turn::system(config.build_preamble()),
            turns: VecDeque::with_capacity(window + 1),
            window: window.max(1),
        }
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.push(Turn::user(text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.push(Turn::assistant(text));
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.window {
            self.turns.pop_front();
        }
    }

    /// Replace the preamble with one that carries `memory_context`.
    ///
    /// Always rebuilt from `config`, so repeated calls never stack blocks.
    pub fn inject_memory(&mut self, config: &SessionConfig, memory_context: &str) {
        self.preamble.content = config.build_preamble_with_memory(memory_context);
    }

    /// Rebuild the plain preamble after a reconfiguration.
    pub fn refresh_preamble(&mut self, config: &SessionConfig) {
        self.preamble.content = config.build_preamble();
    }

    /// Drop every turn and reset the preamble.
    pub fn clear(&mut self, config: &SessionConfig) {
        self.turns.clear();
        self.refresh_preamble(config);
    }

    pub fn preamble(&self) -> &str {
        &self.preamble.content
    }

    /// User/assistant turns, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Full message list for generation: preamble then turns.
    pub fn snapshot(&self) -> Vec<Turn> {
        std::iter::once(&self.preamble)
            .chain(self.turns.iter())
            .cloned()
            .collect()
    }

    /// Total entries including the preamble.
    pub fn len(&self) -> usize {
        self.turns.len() + 1
    }

    /// True when only the preamble is present.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
