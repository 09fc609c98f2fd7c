use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_QUEUE_SIZE: usize = 128;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Searchable snapshot of a cabin product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDocument {
    pub product_id: Uuid,
    pub total: i32,
    pub available: i32,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index(&self, doc: &ProductDocument) -> anyhow::Result<()>;
}

/// Writes documents to the log. Used when no search cluster is configured.
pub struct TracingIndexer;

#[async_trait]
impl SearchIndexer for TracingIndexer {
    async fn index(&self, doc: &ProductDocument) -> anyhow::Result<()> {
        info!(product_id = %doc.product_id, total = doc.total, available = doc.available, "indexed product document");
        Ok(())
    }
}

#[derive(Debug)]
struct RetryTask {
    doc: ProductDocument,
    attempts: u32,
}

struct Inner {
    indexer: Arc<dyn SearchIndexer>,
    tasks: Mutex<VecDeque<RetryTask>>,
    ready: Notify,
    capacity: usize,
    max_attempts: u32,
    base_backoff: Duration,
    dropped: AtomicU64,
}

impl Inner {
    fn tasks(&self) -> MutexGuard<'_, VecDeque<RetryTask>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, task: RetryTask) {
        {
            let mut tasks = self.tasks();
            if tasks.len() >= self.capacity {
                if let Some(oldest) = tasks.pop_front() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(product_id = %oldest.doc.product_id, "search queue full, dropped oldest document");
                }
            }
            tasks.push_back(task);
        }
        self.ready.notify_one();
    }
}

/// Best-effort indexing with bounded, non-blocking retries.
///
/// Enqueueing never waits: a full queue drops its oldest entry. A failed
/// attempt is retried after `base_backoff * 2^(attempts - 1)` until
/// `max_attempts` attempts have been made.
#[derive(Clone)]
pub struct SearchRetryQueue {
    inner: Arc<Inner>,
}

impl SearchRetryQueue {
    /// Zero values fall back to the `DEFAULT_*` constants.
    pub fn new(indexer: Arc<dyn SearchIndexer>, capacity: usize, max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                indexer,
                tasks: Mutex::new(VecDeque::new()),
                ready: Notify::new(),
                capacity: if capacity == 0 { DEFAULT_QUEUE_SIZE } else { capacity },
                max_attempts: if max_attempts == 0 { DEFAULT_MAX_ATTEMPTS } else { max_attempts },
                base_backoff: if base_backoff.is_zero() { DEFAULT_BACKOFF } else { base_backoff },
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn enqueue(&self, doc: ProductDocument) {
        debug!(product_id = %doc.product_id, "search document queued");
        self.inner.push(RetryTask { doc, attempts: 0 });
    }

    pub fn len(&self) -> usize {
        self.inner.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Documents discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn backoff(&self, attempts: u32) -> Duration {
        self.inner.base_backoff * 2u32.saturating_pow(attempts.saturating_sub(1))
    }

    /// Drains the queue forever.
    pub async fn run(&self) {
        loop {
            let task = self.next().await;
            self.attempt(task).await;
        }
    }

    async fn next(&self) -> RetryTask {
        loop {
            let next = self.inner.tasks().pop_front();
            if let Some(task) = next {
                return task;
            }
            self.inner.ready.notified().await;
        }
    }

    async fn attempt(&self, mut task: RetryTask) {
        let result = self.inner.indexer.index(&task.doc).await;
        task.attempts += 1;

        let Err(e) = result else {
            debug!(product_id = %task.doc.product_id, attempts = task.attempts, "search document indexed");
            return;
        };

        if task.attempts >= self.inner.max_attempts {
            error!(product_id = %task.doc.product_id, attempts = task.attempts, error = %e, "giving up on search document");
            return;
        }

        let delay = self.backoff(task.attempts);
        warn!(product_id = %task.doc.product_id, attempts = task.attempts, retry_in_ms = delay.as_millis() as u64, error = %e, "search indexing failed, will retry");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            inner.push(task);
        });
    }
}
