//! Bounded worker pool in front of an [`Embedder`].
//!
//! Embedding can take seconds on CPU. Every call is moved onto its own
//! worker task, at most `workers` run at once, at most `queue_depth` more
//! may wait for a slot, and each call is bounded by a timeout. Anything past
//! the queue bound is rejected immediately rather than queued.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::embeddings::SharedEmbedder;
use crate::error::EmbeddingError;

/// Sizing and timeout for an [`EmbeddingPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Concurrent embedder calls.
    pub workers: usize,
    /// Calls allowed to wait for a worker before new ones are rejected.
    pub queue_depth: usize,
    /// Upper bound on queueing plus inference for one call.
    pub timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Shared, cloneable handle to the embedding worker pool.
#[derive(Clone)]
pub struct EmbeddingPool {
    embedder: SharedEmbedder,
    /// Admission: workers + queue_depth permits.
    admission: Arc<Semaphore>,
    /// Execution: `workers` permits.
    workers: Arc<Semaphore>,
    capacity: usize,
    timeout: Duration,
}

impl EmbeddingPool {
    pub fn new(embedder: SharedEmbedder, config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        let capacity = workers + config.queue_depth;
        Self {
            embedder,
            admission: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(workers)),
            capacity,
            timeout: config.timeout,
        }
    }

    /// Dimension every vector from this pool has.
    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    /// Name of the underlying embedder.
    pub fn model_name(&self) -> &str {
        self.embedder.name()
    }

    /// Calls currently admitted (running or waiting).
    pub fn in_flight(&self) -> usize {
        self.capacity - self.admission.available_permits()
    }

    /// Embed `text` on a worker task.
    ///
    /// `language_hint` is advisory: the configured model is multilingual, so
    /// it is only recorded for diagnostics.
    pub async fn embed(
        &self,
        text: &str,
        language_hint: Option<&str>,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let admitted = match Arc::clone(&self.admission).try_acquire_owned() {
            Ok(permit) => permit,
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                let in_flight = self.in_flight();
                warn!(in_flight, "Embedding pool saturated, rejecting request");
                return Err(EmbeddingError::Saturated { in_flight });
            }
            Err(tokio::sync::TryAcquireError::Closed) => return Err(EmbeddingError::Closed),
        };

        let embedder = Arc::clone(&self.embedder);
        let workers = Arc::clone(&self.workers);
        let owned = text.to_string();

        let mut handle = tokio::spawn(async move {
            let _admitted = admitted;
            let _slot = workers
                .acquire_owned()
                .await
                .map_err(|_| EmbeddingError::Closed)?;
            embedder.embed(&owned).await.map_err(EmbeddingError::from)
        });

        let started = std::time::Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(EmbeddingError::Worker(join_error.to_string())),
            Err(_) => {
                // Abandon the worker; its permits are released when it drops.
                handle.abort();
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Embedding timed out"
                );
                return Err(EmbeddingError::Timeout(self.timeout));
            }
        };

        let embedding = outcome?;
        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        debug!(
            model = self.embedder.name(),
            language = language_hint.unwrap_or("auto"),
            chars = text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Embedded text"
        );
        Ok(embedding)
    }

    /// Stop admitting new calls. In-flight calls finish normally.
    pub fn close(&self) {
        self.admission.close();
    }
}

impl std::fmt::Debug for EmbeddingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingPool")
            .field("embedder", &self.embedder.name())
            .field("capacity", &self.capacity)
            .field("timeout", &self.timeout)
            .finish()
    }
}
