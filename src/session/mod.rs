//! Per-conversation state: settings, history, audio ingest and model handles.

pub mod audio_buffer;
pub mod config;
pub mod history;
pub mod load_guard;
pub mod registry;
pub mod state;

pub use audio_buffer::{AudioIngestBuffer, pcm16_to_samples};
pub use config::{SessionConfig, SessionUpdate};
pub use history::{ConversationHistory, Role, Turn};
pub use load_guard::ModelLoadGuard;
pub use registry::{SessionHandle, SessionRegistry, SessionSummary};
pub use state::SessionState;
