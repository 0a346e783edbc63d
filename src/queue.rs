//! Offline action queue - at-least-once delivery for mutations made while
//! disconnected
//!
//! The backing store is external (durable key-value storage behind
//! [`QueueStore`]), so a crash between enqueue and flush loses nothing.
//! Idempotency of retried actions is the target's responsibility, not the
//! queue's.

use crate::error::{MatchError, Result};
use crate::types::{QueueItem, generate_id};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Durable storage for pending items, keyed by a per-item random id.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn add(&self, item: QueueItem) -> Result<()>;
    /// All pending items, in insertion order.
    async fn get_all(&self) -> Result<Vec<QueueItem>>;
    async fn remove(&self, id: &str) -> Result<()>;
    /// Returns the incremented retry count.
    async fn increment_retries(&self, id: &str) -> Result<u32>;
}

/// Delivery target for queued actions.
#[async_trait]
pub trait ActionSender: Send + Sync {
    async fn send(&self, item: &QueueItem) -> Result<()>;
}

/// In-process [`QueueStore`]. Reference implementation and test backing;
/// production deployments put a persistent store behind the same trait.
#[derive(Default)]
pub struct MemoryQueueStore {
    items: RwLock<Vec<QueueItem>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn add(&self, item: QueueItem) -> Result<()> {
        self.items.write().await.push(item);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueueItem>> {
        Ok(self.items.read().await.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|i| i.id != id);
        if items.len() == before {
            return Err(MatchError::QueueItemNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn increment_retries(&self, id: &str) -> Result<u32> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| MatchError::QueueItemNotFound(id.to_string()))?;
        item.retries += 1;
        Ok(item.retries)
    }
}

/// Outcome of one flush pass. Dropped items are reported, never thrown.
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    pub delivered: usize,
    pub retained: usize,
    pub dropped: Vec<QueueItem>,
}

pub struct OfflineActionQueue {
    store: Arc<dyn QueueStore>,
    max_retries: u32,
}

impl OfflineActionQueue {
    pub fn new(store: Arc<dyn QueueStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub async fn enqueue(
        &self,
        action: &str,
        payload: serde_json::Value,
        now: u64,
    ) -> Result<QueueItem> {
        let item = QueueItem {
            id: generate_id(),
            action: action.to_string(),
            payload,
            created_at: now,
            retries: 0,
            max_retries: self.max_retries,
        };
        self.store.add(item.clone()).await?;
        debug!("Queued {} ({})", item.action, item.id);
        Ok(item)
    }

    pub async fn pending(&self) -> Result<usize> {
        Ok(self.store.get_all().await?.len())
    }

    /// Walk all queued items in insertion order. A successful send removes
    /// the item; a failure increments its retry counter; an item at or
    /// beyond its budget is removed without another attempt.
    pub async fn flush(&self, sender: &dyn ActionSender) -> Result<FlushReport> {
        let mut report = FlushReport::default();

        for item in self.store.get_all().await? {
            if item.retries >= item.max_retries {
                self.store.remove(&item.id).await?;
                let exhausted = MatchError::QueueExhausted {
                    action: item.action.clone(),
                    retries: item.retries,
                };
                warn!("{} ({}), no attempt made", exhausted, item.id);
                report.dropped.push(item);
                continue;
            }

            match sender.send(&item).await {
                Ok(()) => {
                    self.store.remove(&item.id).await?;
                    report.delivered += 1;
                }
                Err(err) => {
                    let retries = self.store.increment_retries(&item.id).await?;
                    if retries >= item.max_retries {
                        self.store.remove(&item.id).await?;
                        let exhausted = MatchError::QueueExhausted {
                            action: item.action.clone(),
                            retries,
                        };
                        warn!("{} ({}), last error: {}", exhausted, item.id, err);
                        report.dropped.push(QueueItem { retries, ..item });
                    } else {
                        debug!("Send failed for {} (attempt {}): {}", item.id, retries, err);
                        report.retained += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}
