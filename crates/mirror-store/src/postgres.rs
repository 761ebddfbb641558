//! Postgres-backed store for committed topic messages and entities.
//!
//! This backend only reads: the schema is owned by the ingestion pathway,
//! which writes entities and topic messages as they reach consensus. No
//! migrations run here and no transactions are held across pages; each page
//! leases one pooled connection for the duration of a single `SELECT`.
//!
//! Pool sizing and acquire timeouts are configured explicitly. A paging
//! query that cannot obtain a connection fails fast as
//! [`StoreError::Unavailable`] so the retriever's bounded retry can decide
//! what to do, instead of hanging a subscription on an unhealthy database.
use super::{EntityLookup, MessagePager, PageWindow, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use mirror_common::{Entity, EntityId, EntityKind, TopicMessage};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/mirror_node".to_string(),
            max_connections: 10,
            acquire_timeout_ms: 3_000,
        }
    }
}

/// Read-only store over the mirror database.
///
/// Safe to share across subscriptions; `sqlx` leases pooled connections per
/// query, so concurrent pages from many subscriptions interleave without
/// coordination here.
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

/// Row shape for the `entity` table (only the columns the existence check
/// needs).
#[derive(Debug, Clone, FromRow)]
struct EntityRow {
    id: i64,
    #[sqlx(rename = "type")]
    kind: String,
}

/// Row shape for the `topic_message` table.
#[derive(Debug, Clone, FromRow)]
struct TopicMessageRow {
    topic_id: i64,
    sequence_number: i64,
    consensus_timestamp: i64,
    message: Vec<u8>,
    running_hash: Vec<u8>,
    running_hash_version: i32,
}

impl TopicMessageRow {
    fn into_message(self) -> TopicMessage {
        TopicMessage {
            topic_id: EntityId::new(self.topic_id),
            sequence_number: self.sequence_number as u64,
            consensus_timestamp: self.consensus_timestamp,
            message: Bytes::from(self.message),
            running_hash: Bytes::from(self.running_hash),
            running_hash_version: self.running_hash_version,
        }
    }
}

impl PostgresStore {
    pub async fn connect(config: &PostgresConfig) -> StoreResult<Self> {
        let options =
            PgConnectOptions::from_str(&config.url).map_err(|err| fatal("parse url", err))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;
        tracing::info!(
            max_connections = config.max_connections,
            "connected to mirror database"
        );
        Ok(Self { pool })
    }
}

#[async_trait]
impl EntityLookup for PostgresStore {
    async fn find_entity(&self, id: EntityId) -> StoreResult<Option<Entity>> {
        let row = sqlx::query_as::<_, EntityRow>("SELECT id, type FROM entity WHERE id = $1")
            .bind(id.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(entity_from_row).transpose()
    }
}

#[async_trait]
impl MessagePager for PostgresStore {
    async fn page_messages(&self, window: &PageWindow) -> StoreResult<Vec<TopicMessage>> {
        let rows = match window.end_time {
            Some(end_time) => {
                sqlx::query_as::<_, TopicMessageRow>(
                    "SELECT topic_id, sequence_number, consensus_timestamp, message, \
                     running_hash, running_hash_version \
                     FROM topic_message \
                     WHERE topic_id = $1 AND consensus_timestamp >= $2 \
                     AND consensus_timestamp < $3 \
                     ORDER BY consensus_timestamp ASC LIMIT $4",
                )
                .bind(window.topic_id.id())
                .bind(window.start_time)
                .bind(end_time)
                .bind(window.page_size as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, TopicMessageRow>(
                    "SELECT topic_id, sequence_number, consensus_timestamp, message, \
                     running_hash, running_hash_version \
                     FROM topic_message \
                     WHERE topic_id = $1 AND consensus_timestamp >= $2 \
                     ORDER BY consensus_timestamp ASC LIMIT $3",
                )
                .bind(window.topic_id.id())
                .bind(window.start_time)
                .bind(window.page_size as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(TopicMessageRow::into_message).collect())
    }
}

fn entity_from_row(row: EntityRow) -> StoreResult<Entity> {
    let kind = EntityKind::from_str(&row.kind)
        .map_err(|err| StoreError::Internal(format!("entity {}: {err}", row.id)))?;
    Ok(Entity {
        id: EntityId::new(row.id),
        kind,
    })
}

fn fatal(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Internal(format!("{context}: {err}"))
}

// Connection-level failures are worth a retry; everything else (bad SQL,
// decode failures, protocol errors) indicates a bug or schema drift.
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        other => StoreError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_message_row_maps_to_domain() {
        let row = TopicMessageRow {
            topic_id: 100,
            sequence_number: 7,
            consensus_timestamp: 1_234,
            message: vec![0, 1, 2],
            running_hash: vec![3, 4, 5],
            running_hash_version: 2,
        };
        let message = row.into_message();
        assert_eq!(message.topic_id, EntityId::new(100));
        assert_eq!(message.sequence_number, 7);
        assert_eq!(message.consensus_timestamp, 1_234);
        assert_eq!(message.message.as_ref(), &[0, 1, 2]);
        assert_eq!(message.running_hash.as_ref(), &[3, 4, 5]);
        assert_eq!(message.running_hash_version, 2);
    }

    #[test]
    fn entity_row_rejects_unknown_kind() {
        let err = entity_from_row(EntityRow {
            id: 100,
            kind: "WIDGET".to_string(),
        })
        .expect_err("unknown kind");
        assert!(matches!(err, StoreError::Internal(_)));
    }

    #[test]
    fn entity_row_maps_topic_kind() {
        let entity = entity_from_row(EntityRow {
            id: 100,
            kind: "TOPIC".to_string(),
        })
        .expect("entity");
        assert_eq!(entity.kind, EntityKind::Topic);
    }

    #[test]
    fn connection_errors_map_to_unavailable() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Internal(_)));
    }
}
