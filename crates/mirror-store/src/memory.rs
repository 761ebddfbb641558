//! In-memory store for tests, local development, and non-durable
//! deployments. State is held in maps guarded by `tokio::sync::RwLock`;
//! messages are kept per topic in a `BTreeMap` keyed by consensus timestamp
//! so page scans come back in order for free. Everything is lost on restart.
use super::{EntityLookup, MessagePager, PageWindow, StoreResult};
use async_trait::async_trait;
use mirror_common::{Entity, EntityId, TopicMessage};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entities: RwLock<HashMap<EntityId, Entity>>,
    // topic id -> consensus timestamp -> message
    messages: RwLock<HashMap<EntityId, BTreeMap<i64, TopicMessage>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_entity(&self, entity: Entity) {
        self.entities.write().await.insert(entity.id, entity);
    }

    /// Append a committed message. Consensus timestamps are unique per
    /// topic; a second insert at the same timestamp replaces the first.
    pub async fn insert_message(&self, message: TopicMessage) {
        self.messages
            .write()
            .await
            .entry(message.topic_id)
            .or_default()
            .insert(message.consensus_timestamp, message);
    }

}

#[async_trait]
impl EntityLookup for InMemoryStore {
    async fn find_entity(&self, id: EntityId) -> StoreResult<Option<Entity>> {
        Ok(self.entities.read().await.get(&id).copied())
    }
}

#[async_trait]
impl MessagePager for InMemoryStore {
    async fn page_messages(&self, window: &PageWindow) -> StoreResult<Vec<TopicMessage>> {
        let guard = self.messages.read().await;
        let Some(log) = guard.get(&window.topic_id) else {
            return Ok(Vec::new());
        };
        let range = match window.end_time {
            Some(end) => log.range(window.start_time..end),
            None => log.range(window.start_time..),
        };
        Ok(range
            .take(window.page_size)
            .map(|(_, message)| message.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mirror_common::EntityKind;

    const TOPIC: EntityId = EntityId::new(100);

    fn message(sequence_number: u64, consensus_timestamp: i64) -> TopicMessage {
        TopicMessage {
            topic_id: TOPIC,
            sequence_number,
            consensus_timestamp,
            message: Bytes::from_static(&[0, 1, 2]),
            running_hash: Bytes::from_static(&[3, 4, 5]),
            running_hash_version: 2,
        }
    }

    fn window(start_time: i64, end_time: Option<i64>, page_size: usize) -> PageWindow {
        PageWindow {
            topic_id: TOPIC,
            start_time,
            end_time,
            page_size,
        }
    }

    #[tokio::test]
    async fn entity_lookup_reflects_inserts() {
        let store = InMemoryStore::new();
        assert_eq!(store.find_entity(TOPIC).await.expect("find"), None);
        let entity = Entity {
            id: TOPIC,
            kind: EntityKind::Topic,
        };
        store.insert_entity(entity).await;
        assert_eq!(store.find_entity(TOPIC).await.expect("find"), Some(entity));
    }

    #[tokio::test]
    async fn pages_come_back_in_timestamp_order() {
        let store = InMemoryStore::new();
        store.insert_message(message(3, 30)).await;
        store.insert_message(message(1, 10)).await;
        store.insert_message(message(2, 20)).await;
        let page = store
            .page_messages(&window(0, None, 10))
            .await
            .expect("page");
        let sequences: Vec<u64> = page.iter().map(|m| m.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn end_time_is_exclusive() {
        let store = InMemoryStore::new();
        store.insert_message(message(1, 10)).await;
        store.insert_message(message(2, 20)).await;
        let page = store
            .page_messages(&window(0, Some(20), 10))
            .await
            .expect("page");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].sequence_number, 1);
    }

    #[tokio::test]
    async fn page_size_truncates_and_cursor_resumes() {
        let store = InMemoryStore::new();
        for sequence in 1..=4 {
            store.insert_message(message(sequence, sequence as i64)).await;
        }
        let first = store.page_messages(&window(0, None, 2)).await.expect("page");
        assert_eq!(first.len(), 2);
        let cursor = first[1].consensus_timestamp + 1;
        let second = store
            .page_messages(&window(cursor, None, 2))
            .await
            .expect("page");
        let sequences: Vec<u64> = second.iter().map(|m| m.sequence_number).collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[tokio::test]
    async fn unknown_topic_pages_empty() {
        let store = InMemoryStore::new();
        let page = store
            .page_messages(&PageWindow {
                topic_id: EntityId::new(999),
                start_time: 0,
                end_time: None,
                page_size: 10,
            })
            .await
            .expect("page");
        assert!(page.is_empty());
    }
}
