// Storage ports for the subscription engine: entity lookups and ordered
// pages of committed topic messages. Backends implement these traits; the
// engine never sees SQL or connection handling.
use async_trait::async_trait;
use mirror_common::{Entity, EntityId, TopicMessage};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    // Transient; callers may retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    // Fatal; callers must give up.
    #[error("storage failure: {0}")]
    Internal(String),
}

/// One page request against the committed message log.
///
/// `start_time` is inclusive, `end_time` exclusive. Backends return rows in
/// ascending `consensus_timestamp` order, at most `page_size` of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub topic_id: EntityId,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub page_size: usize,
}

#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn find_entity(&self, id: EntityId) -> StoreResult<Option<Entity>>;
}

#[async_trait]
pub trait MessagePager: Send + Sync {
    async fn page_messages(&self, window: &PageWindow) -> StoreResult<Vec<TopicMessage>>;
}
