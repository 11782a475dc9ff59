//! In-memory queue store (no persistence)
//!
//! This store keeps hashes and lists behind a single mutex, so every
//! operation, including the combined field write + push, is trivially atomic.
//! It's useful for:
//! - Testing without database dependencies
//! - Single-process deployments that can afford to lose queued jobs on restart

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::error::{StoreError, StoreResult};
use super::store::{HealthStatus, QueueStore};

#[derive(Debug, Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
    closed: bool,
}

impl Inner {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

/// In-memory queue store
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    inner: Mutex<Inner>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn push_with_field(
        &self,
        hash_key: &str,
        field: &str,
        value: &str,
        list_key: &str,
        element: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;

        let hash = inner.hashes.entry(hash_key.to_string()).or_default();
        if hash.contains_key(field) {
            return Err(StoreError::DuplicateKey(format!("{hash_key}/{field}")));
        }
        hash.insert(field.to_string(), value.to_string());
        inner
            .lists
            .entry(list_key.to_string())
            .or_default()
            .push_front(element.to_string());

        trace!("pushed {element} onto {list_key}");
        Ok(())
    }

    async fn pop_tail(&self, list_key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;

        Ok(inner.lists.get_mut(list_key).and_then(|list| list.pop_back()))
    }

    async fn get_field(&self, hash_key: &str, field: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().await;
        inner.ensure_open()?;

        Ok(inner
            .hashes
            .get(hash_key)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    async fn set_field(&self, hash_key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_open()?;

        inner
            .hashes
            .entry(hash_key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn list_len(&self, list_key: &str) -> StoreResult<usize> {
        let inner = self.inner.lock().await;
        inner.ensure_open()?;

        Ok(inner.lists.get(list_key).map_or(0, VecDeque::len))
    }

    async fn health_check(&self) -> StoreResult<HealthStatus> {
        let inner = self.inner.lock().await;
        Ok(HealthStatus {
            healthy: !inner.closed,
            message: if inner.closed {
                "In-memory queue store closed".to_string()
            } else {
                "In-memory queue store operational".to_string()
            },
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("hashes".to_string(), inner.hashes.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.closed {
            debug!("closing in-memory queue store");
            inner.closed = true;
        }
        Ok(())
    }
}
