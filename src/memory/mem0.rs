//! Client for a mem0 REST server.
//!
//! Endpoints used:
//! - `POST /search` with `{query, user_id, limit}`
//! - `POST /memories` with `{messages, user_id}`
//! - `DELETE /memories?user_id=...`

use crate::config::MemoryConfig;
use crate::error::{Result, VocaliveError};
use crate::memory::store::MemoryStore;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    user_id: &'a str,
    limit: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AddBody<'a> {
    messages: [ChatMessage<'a>; 2],
    user_id: &'a str,
}

/// Pull memory texts out of a search response.
///
/// Accepts either a bare array or `{"results": [...]}`; each hit may be a
/// string or an object with a `memory` (or `text`) field.
pub fn extract_memories(response: &Value) -> Vec<String> {
    let hits: &[Value] = match response {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    hits.iter()
        .filter_map(|hit| match hit {
            Value::String(text) => Some(text.clone()),
            Value::Object(map) => map
                .get("memory")
                .or_else(|| map.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// Memory store backed by mem0 over HTTP.
#[derive(Debug, Clone)]
pub struct Mem0Client {
    client: reqwest::Client,
    base_url: reqwest::Url,
    enabled: bool,
}

impl Mem0Client {
    /// # Errors
    /// Returns `VocaliveError::ConfigInvalidValue` when `memory.url` is not a URL.
    pub fn new(config: &MemoryConfig) -> Result<Self> {
        let base_url =
            reqwest::Url::parse(&config.url).map_err(|e| VocaliveError::ConfigInvalidValue {
                key: "memory.url".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            enabled: config.enabled,
        })
    }

    fn url(&self, path: &str) -> Result<reqwest::Url> {
        self.base_url.join(path).map_err(|e| VocaliveError::Memory {
            message: format!("invalid memory URL: {}", e),
        })
    }

    fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(VocaliveError::Memory {
                message: format!("{} returned {}", action, response.status()),
            })
        }
    }
}

#[async_trait]
impl MemoryStore for Mem0Client {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn search(&self, query: &str, user_id: &str, limit: usize) -> Result<Vec<String>> {
        let response = self
            .client
            .post(self.url("search")?)
            .json(&SearchBody {
                query,
                user_id,
                limit,
            })
            .send()
            .await?;
        let body: Value = Self::check(response, "memory search")?.json().await?;
        let mut memories = extract_memories(&body);
        memories.truncate(limit);
        Ok(memories)
    }

    async fn add_exchange(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        let body = AddBody {
            messages: [
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
                ChatMessage {
                    role: "assistant",
                    content: assistant_text,
                },
            ],
            user_id,
        };
        let response = self
            .client
            .post(self.url("memories")?)
            .json(&body)
            .send()
            .await?;
        Self::check(response, "memory write")?;
        tracing::debug!(user_id, "Conversation turn stored");
        Ok(())
    }

    async fn clear_user(&self, user_id: &str) -> Result<()> {
        let mut url = self.url("memories")?;
        url.query_pairs_mut().append_pair("user_id", user_id);
        let response = self.client.delete(url).send().await?;
        Self::check(response, "memory clear")?;
        tracing::info!(user_id, "Cleared all memories");
        Ok(())
    }
}
