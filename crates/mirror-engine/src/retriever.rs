//! Paged retrieval of committed messages from durable storage.
//!
//! The retriever turns the pager port into a pull-driven sequence: a page is
//! fetched only when the consumer has drained the previous one, so a slow
//! subscriber never queues pages it cannot take. The throttled mode (the
//! primary historical drain) pauses between pages to leave storage headroom;
//! gap backfills run unthrottled.
use crate::config::RetrieverConfig;
use crate::error::SubscribeError;
use mirror_common::{EntityId, TopicMessage};
use mirror_store::{MessagePager, PageWindow, StoreError};
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounds for one retrieval: a topic, a half-open time range, and an
/// optional row limit (0 = unbounded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetrieveWindow {
    pub topic_id: EntityId,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub limit: u64,
}

pub(crate) struct HistoricalRetriever {
    pager: Arc<dyn MessagePager>,
    config: RetrieverConfig,
    window: RetrieveWindow,
    throttled: bool,
    // Next page starts here; advances to last.consensus_timestamp + 1.
    cursor: i64,
    // Rows still allowed when the window carries a limit.
    remaining: Option<u64>,
    buffer: VecDeque<TopicMessage>,
    exhausted: bool,
    fetched_once: bool,
}

impl HistoricalRetriever {
    pub(crate) fn new(
        pager: Arc<dyn MessagePager>,
        config: RetrieverConfig,
        window: RetrieveWindow,
        throttled: bool,
    ) -> Self {
        let cursor = window.start_time;
        let remaining = (window.limit > 0).then_some(window.limit);
        Self {
            pager,
            config,
            window,
            throttled,
            cursor,
            remaining,
            buffer: VecDeque::new(),
            exhausted: false,
            fetched_once: false,
        }
    }

    /// Next committed message in ascending consensus-timestamp order, or
    /// `None` once storage has no more rows inside the window.
    pub(crate) async fn next(&mut self) -> Result<Option<TopicMessage>, SubscribeError> {
        loop {
            if let Some(message) = self.buffer.pop_front() {
                return Ok(Some(message));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<(), SubscribeError> {
        let page_size = match self.remaining {
            Some(0) => {
                self.exhausted = true;
                return Ok(());
            }
            Some(remaining) => self.config.max_page_size.min(remaining as usize),
            None => self.config.max_page_size,
        };
        if self.throttled && self.fetched_once {
            tokio::time::sleep(self.config.throttle_interval()).await;
        }
        self.fetched_once = true;

        let window = PageWindow {
            topic_id: self.window.topic_id,
            start_time: self.cursor,
            end_time: self.window.end_time,
            page_size,
        };
        let page = self.page_with_retry(&window).await?;

        if let Some(last) = page.last() {
            self.cursor = last.consensus_timestamp + 1;
        }
        // A short page means storage has nothing further inside the window.
        if page.len() < page_size {
            self.exhausted = true;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(page.len() as u64);
            if *remaining == 0 {
                self.exhausted = true;
            }
        }
        self.buffer.extend(page);
        Ok(())
    }

    async fn page_with_retry(
        &self,
        window: &PageWindow,
    ) -> Result<Vec<TopicMessage>, SubscribeError> {
        let mut attempt = 0u32;
        loop {
            match self.pager.page_messages(window).await {
                Ok(page) => return Ok(page),
                Err(StoreError::Unavailable(reason)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        topic_id = %window.topic_id,
                        %reason,
                        "transient storage error while paging, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff() * attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
