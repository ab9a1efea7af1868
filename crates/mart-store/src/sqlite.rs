//! SQLite durability sink.

use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use mart_core::{ChannelConfig, DurabilitySink, Marker, Message, SinkError, SinkEvent, StoredMessage};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS payloads (
    channel TEXT    NOT NULL,
    id      INTEGER NOT NULL,
    expiry  INTEGER NOT NULL,
    size    INTEGER NOT NULL,
    life    INTEGER NOT NULL,
    one2one INTEGER NOT NULL,
    key     TEXT,
    payload BLOB    NOT NULL,
    PRIMARY KEY (channel, id)
)";

const SELECT_ROWS: &str = "SELECT channel, id, expiry, size, life, one2one, key, payload \
     FROM payloads ORDER BY channel, id";

/// Stores channel messages in a SQLite table named `payloads`.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Open (creating if missing) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = Self::pool_options().connect_with(options).await?;
        info!(path = %path.as_ref().display(), "Opened persistence database");
        Self::from_pool(pool).await
    }

    /// Connect using a SQLite URL such as `sqlite::memory:`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the connection fails or the
    /// schema cannot be created.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = Self::pool_options().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    // Events are applied one at a time, and an in-memory database lives only
    // as long as its single connection.
    fn pool_options() -> SqlitePoolOptions {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payloads")
            .fetch_one(&self.pool)
            .await?;
        from_i64("count", count)
    }

    async fn persist(
        &self,
        channel: &str,
        config: &ChannelConfig,
        message: &Message,
        evicted: Option<&Message>,
    ) -> Result<(), StoreError> {
        let row = StoredMessage::from_message(channel, config.clone(), message);
        let mut tx = self.pool.begin().await?;

        // Replace so a retried event is idempotent.
        sqlx::query(
            "INSERT OR REPLACE INTO payloads (channel, id, expiry, size, life, one2one, key, payload) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(channel)
        .bind(to_i64("id", row.marker)?)
        .bind(to_i64("expiry", row.expiry())?)
        .bind(to_i64("size", config.capacity as u64)?)
        .bind(to_i64("life", config.life_nanos())?)
        .bind(config.one2one)
        .bind(config.key.as_deref())
        .bind(message.payload.to_vec())
        .execute(&mut *tx)
        .await?;

        if let Some(old) = evicted {
            sqlx::query("DELETE FROM payloads WHERE channel = ? AND id = ?")
                .bind(channel)
                .bind(to_i64("id", old.created)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(channel, marker = message.created, evicted = ?evicted.map(|m| m.created), "Persisted message");
        Ok(())
    }

    async fn clear(&self, channel: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM payloads WHERE channel = ?")
            .bind(channel)
            .execute(&self.pool)
            .await?;
        debug!(channel, rows = result.rows_affected(), "Cleared stored channel");
        Ok(())
    }

    async fn dump(&self) -> Result<(), StoreError> {
        let rows = sqlx::query(SELECT_ROWS).fetch_all(&self.pool).await?;
        for row in &rows {
            let stored = decode_row(row)?;
            info!(
                channel = %stored.channel,
                id = stored.marker,
                expiry = stored.expiry(),
                size = stored.config.capacity,
                life = stored.config.life_nanos(),
                one2one = stored.config.one2one,
                key = ?stored.config.key,
                payload = %String::from_utf8_lossy(&stored.payload),
                "Stored row"
            );
        }
        info!(rows = rows.len(), "Dumped persistence database");
        Ok(())
    }

    async fn load_rows(&self, now: Marker) -> Result<Vec<StoredMessage>, StoreError> {
        let purged = sqlx::query("DELETE FROM payloads WHERE expiry < ?")
            .bind(to_i64("expiry", now)?)
            .execute(&self.pool)
            .await?;
        let rows = sqlx::query(SELECT_ROWS).fetch_all(&self.pool).await?;
        info!(
            purged = purged.rows_affected(),
            loaded = rows.len(),
            "Loaded persisted rows"
        );
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl DurabilitySink for SqliteSink {
    async fn apply(&self, event: &SinkEvent) -> Result<(), SinkError> {
        match event {
            SinkEvent::Persist {
                channel,
                config,
                message,
                evicted,
            } => self.persist(channel, config, message, evicted.as_deref()).await?,
            SinkEvent::Clear { channel } => self.clear(channel).await?,
            SinkEvent::Dump => self.dump().await?,
        }
        Ok(())
    }

    async fn load(&self, now: Marker) -> Result<Vec<StoredMessage>, SinkError> {
        Ok(self.load_rows(now).await?)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn decode_row(row: &SqliteRow) -> Result<StoredMessage, StoreError> {
    let channel: String = row.try_get("channel")?;
    let id: i64 = row.try_get("id")?;
    let size: i64 = row.try_get("size")?;
    let life: i64 = row.try_get("life")?;
    let one2one: bool = row.try_get("one2one")?;
    let key: Option<String> = row.try_get("key")?;
    let payload: Vec<u8> = row.try_get("payload")?;

    let capacity = usize::try_from(from_i64("size", size)?).map_err(|_| StoreError::OutOfRange {
        column: "size",
        value: size.to_string(),
    })?;
    let mut config = ChannelConfig::new(capacity)
        .with_life(Duration::from_nanos(from_i64("life", life)?))
        .with_one2one(one2one);
    if let Some(key) = key.filter(|k| !k.is_empty()) {
        config = config.with_key(key);
    }

    Ok(StoredMessage {
        channel,
        config,
        marker: from_i64("id", id)?,
        payload: Bytes::from(payload),
    })
}

fn to_i64(column: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange {
        column,
        value: value.to_string(),
    })
}

fn from_i64(column: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange {
        column,
        value: value.to_string(),
    })
}
