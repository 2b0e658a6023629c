use crate::error::{Result, VocaliveError};
use crate::session::history::Turn;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Capacity of the fragment channel between a generator and its consumer.
pub const FRAGMENT_CHANNEL_CAPACITY: usize = 64;

/// Streaming chat completion.
///
/// `messages` is the full conversation, system preamble first. Text fragments
/// are pushed into `fragments` in generation order; the call returns when the
/// model is done. A closed receiver means the turn was cancelled and the
/// implementation returns `Ok(())` without draining the rest.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn stream_chat(&self, messages: &[Turn], fragments: mpsc::Sender<String>) -> Result<()>;
}

/// Run a generator to completion and return the trimmed response.
///
/// Producer and consumer run concurrently on the calling task, so dropping the
/// returned future cancels both.
pub async fn collect_response(generator: &dyn Generator, messages: &[Turn]) -> Result<String> {
    let (tx, mut rx) = mpsc::channel::<String>(FRAGMENT_CHANNEL_CAPACITY);
    let producer = generator.stream_chat(messages, tx);
    let consumer = async move {
        let mut text = String::new();
        while let Some(fragment) = rx.recv().await {
            text.push_str(&fragment);
        }
        text
    };
    let (result, text) = tokio::join!(producer, consumer);
    result?;
    Ok(text.trim().to_string())
}

/// Mock generator for testing
#[derive(Debug, Clone)]
pub struct MockGenerator {
    model_name: String,
    fragments: Vec<String>,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
    conversations: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl MockGenerator {
    /// Create a mock that answers "Bonjour !"
    pub fn new() -> Self {
        Self {
            model_name: "mock-llm".to_string(),
            fragments: vec!["Bonjour".to_string(), " !".to_string()],
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            conversations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the streamed fragments
    pub fn with_fragments(mut self, fragments: &[&str]) -> Self {
        self.fragments = fragments.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Configure the mock to fail on every call
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of stream_chat calls, shared across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every message list passed to `stream_chat`, in call order.
    pub fn conversations(&self) -> Vec<Vec<Turn>> {
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn stream_chat(&self, messages: &[Turn], fragments: mpsc::Sender<String>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(messages.to_vec());

        if self.should_fail {
            return Err(VocaliveError::Generation {
                message: "mock generation failure".to_string(),
            });
        }
        for fragment in &self.fragments {
            if fragments.send(fragment.clone()).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}
