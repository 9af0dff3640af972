use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use async_trait::async_trait;
use courier_common::{ConnectorMessage, MessageContent, Status};

use crate::error::Result;

/// Hands out units of work against persistent storage
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Begin a new unit of work
    ///
    /// # Errors
    /// If the storage can't be reached
    async fn transaction(&self) -> Result<Box<dyn StoreTransaction>>;

    /// A view over the messages for one destination currently in `status`,
    /// oldest first, for a destination queue to read from
    fn queue_source(
        &self,
        channel_id: &str,
        meta_data_id: u32,
        status: Status,
    ) -> Arc<dyn QueueDataSource>;
}

/// One unit of work: nothing written through it is visible to anyone else
/// until [`commit`](StoreTransaction::commit)
#[async_trait]
pub trait StoreTransaction: Send {
    /// Record a new destination message, along with whatever content it carries
    ///
    /// # Errors
    /// If the write can't be staged
    async fn insert_connector_message(&mut self, message: &ConnectorMessage) -> Result<()>;

    /// # Errors
    /// If the write can't be staged
    async fn insert_content(&mut self, content: &MessageContent) -> Result<()>;

    /// Insert the content, or replace it if it already exists
    ///
    /// # Errors
    /// If the write can't be staged
    async fn store_content(&mut self, content: &MessageContent) -> Result<()>;

    /// Persist the message's status (and send attempts) as a transition from `previous`
    ///
    /// # Errors
    /// If the write can't be staged
    async fn update_status(&mut self, message: &ConnectorMessage, previous: Status) -> Result<()>;

    /// # Errors
    /// If the write can't be staged
    async fn update_errors(&mut self, message: &ConnectorMessage) -> Result<()>;

    /// # Errors
    /// If the write can't be staged
    async fn update_response_map(&mut self, message: &ConnectorMessage) -> Result<()>;

    /// Every destination's message for `message_id`, keyed by meta-data id
    ///
    /// # Errors
    /// If the messages can't be read
    async fn connector_messages(
        &mut self,
        channel_id: &str,
        message_id: u64,
    ) -> Result<HashMap<u32, ConnectorMessage>>;

    /// Remove every piece of content stored for `message_id`, across all destinations
    ///
    /// # Errors
    /// If the write can't be staged
    async fn delete_all_content(&mut self, channel_id: &str, message_id: u64) -> Result<()>;

    /// Make everything written so far visible. A `durable` commit survives a crash.
    ///
    /// # Errors
    /// If the writes can't be applied
    async fn commit(&mut self, durable: bool) -> Result<()>;

    /// Discard everything written since the last commit
    ///
    /// # Errors
    /// If the transaction is already closed
    async fn rollback(&mut self) -> Result<()>;

    /// Release the transaction. Uncommitted writes are discarded.
    fn close(&mut self);
}

/// Ordered, persisted backing for a destination queue
#[async_trait]
pub trait QueueDataSource: Send + Sync + std::fmt::Debug {
    /// How many messages are waiting
    ///
    /// # Errors
    /// If the storage can't be read
    async fn size(&self) -> Result<usize>;

    /// Up to `limit` waiting messages, starting `offset` from the oldest
    ///
    /// # Errors
    /// If the storage can't be read
    async fn items(&self, offset: usize, limit: usize) -> Result<Vec<ConnectorMessage>>;
}

/// Owns a transaction for the length of a scope, and closes it on the way out
///
/// Whatever path leaves the scope (success, error, cancellation), the
/// transaction is released exactly once.
pub struct TransactionGuard {
    transaction: Box<dyn StoreTransaction>,
}

impl TransactionGuard {
    #[must_use]
    pub fn new(transaction: Box<dyn StoreTransaction>) -> Self {
        Self { transaction }
    }

    /// Begin a transaction on `store`, already guarded
    ///
    /// # Errors
    /// If the store can't begin a transaction
    pub async fn begin(store: &dyn MessageStore) -> Result<Self> {
        Ok(Self::new(store.transaction().await?))
    }
}

impl Deref for TransactionGuard {
    type Target = dyn StoreTransaction;

    fn deref(&self) -> &Self::Target {
        self.transaction.as_ref()
    }
}

impl DerefMut for TransactionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.transaction.as_mut()
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        self.transaction.close();
    }
}

impl std::fmt::Debug for TransactionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionGuard").finish_non_exhaustive()
    }
}
