//! Single-flight lazy model loading.
//!
//! Concurrent `acquire` calls share one in-flight load and all receive the same
//! handle. A failed load leaves the guard empty, so a later call retries.

use crate::error::{Result, VocaliveError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::OnceCell;

/// Blocking constructor for a model handle.
pub type Loader<T> = Arc<dyn Fn() -> Result<T> + Send + Sync>;

pub struct ModelLoadGuard<T> {
    label: String,
    loader: Loader<T>,
    cell: OnceCell<T>,
    attempts: AtomicUsize,
}

impl<T> fmt::Debug for ModelLoadGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLoadGuard")
            .field("label", &self.label)
            .field("loaded", &self.cell.initialized())
            .field("attempts", &self.attempts.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T> ModelLoadGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(label: impl Into<String>, loader: Loader<T>) -> Self {
        Self {
            label: label.into(),
            loader,
            cell: OnceCell::new(),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Return the loaded handle, loading it on first use.
    ///
    /// The loader runs on the blocking pool so heavy model construction never
    /// stalls the runtime.
    pub async fn acquire(&self) -> Result<T> {
        let handle = self
            .cell
            .get_or_try_init(|| async {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                let loader = Arc::clone(&self.loader);
                let started = Instant::now();
                tracing::info!(model = %self.label, "Loading model");

                let loaded = tokio::task::spawn_blocking(move || (*loader)())
                    .await
                    .map_err(|e| VocaliveError::ModelLoad {
                        model: self.label.clone(),
                        message: format!("loader task failed: {}", e),
                    })?;

                match &loaded {
                    Ok(_) => tracing::info!(
                        model = %self.label,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Model loaded"
                    ),
                    Err(e) => tracing::warn!(model = %self.label, error = %e, "Model load failed"),
                }
                loaded
            })
            .await?;
        Ok(handle.clone())
    }

    /// The handle if already loaded.
    pub fn get(&self) -> Option<T> {
        self.cell.get().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of loads started so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}
