//! SQLite queue store implementation
//!
//! This module provides a SQLite-based implementation of the `QueueStore` trait.
//!
//! ## Layout
//!
//! - `queue_hashes (hash_key, field, value)` holds job records
//! - `queue_lists (seq, list_key, element)` holds pending ids; the head of a
//!   list is its highest `seq`, the tail its lowest
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers are not blocked by the writer
//! - **Transactions**: The field write + push pair commits or rolls back as a unit
//! - **Migrations**: Automatic schema versioning with sqlx

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::error::{StoreError, StoreResult};
use super::store::{HealthStatus, QueueStore};

/// SQLite queue store
pub struct SqliteQueueStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteQueueStore {
    /// Open (or create) the store at `db_path` and run migrations
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use fleet_dispatch::queue::sqlite::SqliteQueueStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteQueueStore::new("./queue.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite queue store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!("running queue store migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    #[instrument(skip(self, value))]
    async fn push_with_field(
        &self,
        hash_key: &str,
        field: &str,
        value: &str,
        list_key: &str,
        element: &str,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // dropping `tx` on any early return rolls the transaction back
        sqlx::query("INSERT INTO queue_hashes (hash_key, field, value) VALUES (?, ?, ?)")
            .bind(hash_key)
            .bind(field)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => {
                    StoreError::DuplicateKey(format!("{hash_key}/{field}"))
                }
                _ => StoreError::TransactionAborted(e.to_string()),
            })?;

        sqlx::query("INSERT INTO queue_lists (list_key, element) VALUES (?, ?)")
            .bind(list_key)
            .bind(element)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::TransactionAborted(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::TransactionAborted(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn pop_tail(&self, list_key: &str) -> StoreResult<Option<String>> {
        // single statement, so concurrent consumers never pop the same element
        let row = sqlx::query(
            r#"
            DELETE FROM queue_lists
            WHERE seq = (
                SELECT seq FROM queue_lists
                WHERE list_key = ?
                ORDER BY seq ASC
                LIMIT 1
            )
            RETURNING element
            "#,
        )
        .bind(list_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("element")))
    }

    async fn get_field(&self, hash_key: &str, field: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM queue_hashes WHERE hash_key = ? AND field = ?")
            .bind(hash_key)
            .bind(field)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get("value")))
    }

    async fn set_field(&self, hash_key: &str, field: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_hashes (hash_key, field, value)
            VALUES (?, ?, ?)
            ON CONFLICT (hash_key, field) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(hash_key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_len(&self, list_key: &str) -> StoreResult<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queue_lists WHERE list_key = ?")
            .bind(list_key)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 as usize)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StoreResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite queue store operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.pool.is_closed() {
            info!("closing SQLite queue store");
            self.pool.close().await;
        }
        Ok(())
    }
}
