use crate::error::{Result, VocaliveError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Long-term memory keyed by user id.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Whether lookups and writes should happen at all.
    fn is_enabled(&self) -> bool;

    /// Memories relevant to `query`, most relevant first.
    async fn search(&self, query: &str, user_id: &str, limit: usize) -> Result<Vec<String>>;

    /// Persist one user/assistant exchange.
    async fn add_exchange(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()>;

    /// Forget everything stored for `user_id`.
    async fn clear_user(&self, user_id: &str) -> Result<()>;
}

/// Render search hits as the bullet list injected into the preamble.
pub fn format_memories(memories: &[String]) -> String {
    memories
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(|m| format!("- {}", m))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Store used when memory is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMemory;

#[async_trait]
impl MemoryStore for DisabledMemory {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _user_id: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn add_exchange(&self, _user_id: &str, _user: &str, _assistant: &str) -> Result<()> {
        Ok(())
    }

    async fn clear_user(&self, _user_id: &str) -> Result<()> {
        Ok(())
    }
}

/// In-process memory for tests. Search returns every stored line for the user.
#[derive(Debug, Clone, Default)]
pub struct MockMemory {
    entries: Arc<Mutex<HashMap<String, Vec<String>>>>,
    searches: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    clears: Arc<AtomicUsize>,
    disabled: bool,
    should_fail: bool,
}

impl MockMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `is_enabled() == false`
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Fail every call
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Pre-populate a memory for `user_id`
    pub fn with_memory(self, user_id: &str, memory: &str) -> Self {
        self.lock()
            .entry(user_id.to_string())
            .or_default()
            .push(memory.to_string());
        self
    }

    pub fn memories(&self, user_id: &str) -> Vec<String> {
        self.lock().get(user_id).cloned().unwrap_or_default()
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Total calls of any kind.
    pub fn call_count(&self) -> usize {
        self.search_count() + self.write_count() + self.clear_count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> Result<()> {
        if self.should_fail {
            Err(VocaliveError::Memory {
                message: "mock memory failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MemoryStore for MockMemory {
    fn is_enabled(&self) -> bool {
        !self.disabled
    }

    async fn search(&self, _query: &str, user_id: &str, limit: usize) -> Result<Vec<String>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.memories(user_id).into_iter().take(limit).collect())
    }

    async fn add_exchange(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.lock()
            .entry(user_id.to_string())
            .or_default()
            .push(format!("user: {} / assistant: {}", user_text, assistant_text));
        Ok(())
    }

    async fn clear_user(&self, user_id: &str) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.lock().remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_memories_bullets_and_skips_blanks() {
        let memories = vec![
            "Aime le jazz".to_string(),
            "  ".to_string(),
            " Habite à Lyon ".to_string(),
        ];
        assert_eq!(format_memories(&memories), "- Aime le jazz\n- Habite à Lyon");
        assert_eq!(format_memories(&[]), "");
    }

    #[tokio::test]
    async fn test_disabled_memory_is_inert() {
        let memory = DisabledMemory;
        assert!(!memory.is_enabled());
        assert!(memory.search("q", "u", 5).await.unwrap().is_empty());
        assert!(memory.add_exchange("u", "a", "b").await.is_ok());
        assert!(memory.clear_user("u").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_memory_round_trip_per_user() {
        let memory = MockMemory::new().with_memory("alice", "Aime le jazz");

        memory.add_exchange("alice", "Salut", "Bonjour").await.unwrap();
        let hits = memory.search("musique", "alice", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(memory.search("musique", "bob", 5).await.unwrap().is_empty());

        memory.clear_user("alice").await.unwrap();
        assert!(memory.memories("alice").is_empty());
        assert_eq!(memory.search_count(), 2);
        assert_eq!(memory.write_count(), 1);
        assert_eq!(memory.clear_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_memory_search_respects_limit() {
        let memory = MockMemory::new()
            .with_memory("u", "a")
            .with_memory("u", "b")
            .with_memory("u", "c");
        assert_eq!(memory.search("q", "u", 2).await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_mock_memory_failure() {
        let memory = MockMemory::new().with_failure();
        assert!(matches!(
            memory.search("q", "u", 5).await,
            Err(VocaliveError::Memory { .. })
        ));
    }
}
