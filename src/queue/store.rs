//! Queue store trait definition
//!
//! The job queue only needs a handful of primitives from its backing store:
//! an atomic "write hash field + push list element", a pop from the tail of a
//! list, and single hash field reads and writes.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StoreResult;

/// Health status of the queue store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the store operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for durable queue stores
///
/// Lists are pushed at the head and popped from the tail, so a list used
/// through `push_with_field` + `pop_tail` behaves as a FIFO queue.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between the
/// dispatcher's fan-out tasks and queue consumers.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Write `value` into `field` of the hash at `hash_key` and push `element`
    /// onto the head of the list at `list_key` as one transaction.
    ///
    /// Either both writes become visible or neither does. If `field` already
    /// exists on the hash, nothing is written and
    /// [`StoreError::DuplicateKey`](super::error::StoreError::DuplicateKey) is
    /// returned.
    async fn push_with_field(
        &self,
        hash_key: &str,
        field: &str,
        value: &str,
        list_key: &str,
        element: &str,
    ) -> StoreResult<()>;

    /// Pop the element at the tail of the list at `list_key`.
    ///
    /// Returns `Ok(None)` when the list is empty or does not exist.
    async fn pop_tail(&self, list_key: &str) -> StoreResult<Option<String>>;

    /// Read a single hash field, `Ok(None)` if the key or field is absent
    async fn get_field(&self, hash_key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Write a single hash field
    async fn set_field(&self, hash_key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Number of elements currently in the list at `list_key`
    async fn list_len(&self, list_key: &str) -> StoreResult<usize>;

    /// Check store health
    async fn health_check(&self) -> StoreResult<HealthStatus>;

    /// Release the connection. Calling it more than once is a no-op.
    async fn close(&self) -> StoreResult<()>;
}
