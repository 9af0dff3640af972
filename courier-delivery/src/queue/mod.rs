//! Destination queue management

use std::{collections::VecDeque, sync::Arc};

use courier_common::ConnectorMessage;
use courier_store::{QueueDataSource, Result};
use tokio::sync::Mutex;
use tracing::trace;

#[derive(Debug, Default)]
struct Inner {
    /// The head of the persisted sequence, oldest first
    buffer: VecDeque<ConnectorMessage>,
    /// How many messages are in the persisted sequence
    size: usize,
    data_source: Option<Arc<dyn QueueDataSource>>,
}

/// The queue of messages waiting on one destination
///
/// The sequence itself lives in storage, behind a [`QueueDataSource`]; the
/// queue keeps a bounded window over its head in memory. Messages are
/// inspected with [`peek`](Self::peek) and only removed with
/// [`poll`](Self::poll), once their processing has been committed.
#[derive(Debug)]
pub struct ConnectorMessageQueue {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ConnectorMessageQueue {
    /// Create an empty queue holding at most `capacity` messages in memory
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Bind the queue to its persisted sequence
    pub async fn set_data_source(&self, data_source: Arc<dyn QueueDataSource>) {
        self.inner.lock().await.data_source = Some(data_source);
    }

    pub async fn has_data_source(&self) -> bool {
        self.inner.lock().await.data_source.is_some()
    }

    /// Re-read the size of the persisted sequence, dropping anything buffered
    ///
    /// # Errors
    /// If the data source can't be read
    pub async fn update_size(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.buffer.clear();

        let size = match &inner.data_source {
            Some(data_source) => data_source.size().await?,
            None => 0,
        };
        inner.size = size;

        trace!(size = inner.size, "Queue size updated");
        Ok(())
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.size
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// Append a message that has just been persisted as queued
    pub async fn add(&self, message: ConnectorMessage) {
        let mut inner = self.inner.lock().await;

        if inner.buffer.len() == inner.size && inner.buffer.len() < self.capacity {
            inner.buffer.push_back(message);
        }

        inner.size += 1;
    }

    /// The oldest message, left in place
    ///
    /// # Errors
    /// If the buffer needs refilling and the data source can't be read
    pub async fn peek(&self) -> Result<Option<ConnectorMessage>> {
        let mut inner = self.inner.lock().await;
        self.fill(&mut inner).await?;

        Ok(inner.buffer.front().cloned())
    }

    /// Remove and return the oldest message
    ///
    /// # Errors
    /// If the buffer needs refilling and the data source can't be read
    pub async fn poll(&self) -> Result<Option<ConnectorMessage>> {
        let mut inner = self.inner.lock().await;
        self.fill(&mut inner).await?;

        let message = inner.buffer.pop_front();
        if message.is_some() {
            inner.size = inner.size.saturating_sub(1);
        }

        Ok(message)
    }

    /// Replace the buffered head with `message`, if it is the same message
    ///
    /// Keeps the head in step with what was just persisted for it, such as
    /// its send attempts, without a round trip to storage.
    pub async fn refresh_head(&self, message: &ConnectorMessage) {
        let mut inner = self.inner.lock().await;

        if let Some(head) = inner.buffer.front_mut()
            && head.key() == message.key()
        {
            *head = message.clone();
        }
    }

    /// Drop everything held in memory; the persisted sequence is untouched
    pub async fn clear_buffer(&self) {
        self.inner.lock().await.buffer.clear();
    }

    /// [`clear_buffer`](Self::clear_buffer) without waiting; a buffer that
    /// is in use is left alone and dropped by the next
    /// [`update_size`](Self::update_size) instead
    pub fn discard_buffer(&self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.buffer.clear();
        }
    }

    async fn fill(&self, inner: &mut Inner) -> Result<()> {
        if !inner.buffer.is_empty() || inner.size == 0 {
            return Ok(());
        }

        if let Some(data_source) = &inner.data_source {
            let items = data_source.items(0, self.capacity).await?;
            trace!(count = items.len(), "Queue buffer refilled");
            inner.buffer.extend(items);
        }

        Ok(())
    }
}
