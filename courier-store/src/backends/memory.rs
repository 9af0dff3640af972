use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use courier_common::{ConnectorMessage, ContentType, MessageContent, MessageKey, Response, Status};
use parking_lot::Mutex;
use tracing::trace;

use crate::{
    error::{Result, StoreError},
    store::{MessageStore, QueueDataSource, StoreTransaction},
};

/// How many times transactions against a [`MemoryStore`] were finished, and how
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub durable: usize,
    pub best_effort: usize,
    pub rollbacks: usize,
}

#[derive(Debug, Default, Clone)]
struct State {
    /// Messages without their content, which lives in `content`
    messages: BTreeMap<MessageKey, ConnectorMessage>,
    content: BTreeMap<(MessageKey, ContentType), MessageContent>,
}

impl State {
    fn assemble(&self, key: &MessageKey) -> Option<ConnectorMessage> {
        let mut message = self.messages.get(key)?.clone();

        for ((_, _), content) in self
            .content
            .range((key.clone(), ContentType::Raw)..=(key.clone(), ContentType::ProcessedResponse))
        {
            message.set_content(content.clone());
        }

        Some(message)
    }

    fn message_mut(&mut self, key: &MessageKey) -> Result<&mut ConnectorMessage> {
        self.messages
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn apply(&mut self, op: Op) -> Result<()> {
        match op {
            Op::InsertMessage(mut message) => {
                let key = message.key();
                for content_type in [
                    ContentType::Encoded,
                    ContentType::Sent,
                    ContentType::Response,
                    ContentType::ProcessedResponse,
                ] {
                    if let Some(content) = message.content(content_type) {
                        self.content
                            .insert((key.clone(), content_type), content.clone());
                    }
                }
                message.encoded = None;
                message.sent = None;
                message.response = None;
                message.processed_response = None;

                self.messages.insert(key, message);
            }
            Op::InsertContent(content) => {
                let slot = (content.key(), content.content_type);
                if self.content.contains_key(&slot) {
                    return Err(StoreError::Internal(format!(
                        "{:?} content already exists for {}",
                        slot.1, slot.0
                    )));
                }
                self.content.insert(slot, content);
            }
            Op::StoreContent(content) => {
                self.content
                    .insert((content.key(), content.content_type), content);
            }
            Op::Status {
                key,
                status,
                send_attempts,
            } => {
                let message = self.message_mut(&key)?;
                message.status = status;
                message.send_attempts = send_attempts;
            }
            Op::Errors { key, errors } => self.message_mut(&key)?.errors = errors,
            Op::ResponseMap { key, response_map } => {
                self.message_mut(&key)?.response_map = response_map;
            }
            Op::DeleteAllContent {
                channel_id,
                message_id,
            } => {
                self.content.retain(|(key, _), _| {
                    key.channel_id != channel_id || key.message_id != message_id
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
enum Op {
    InsertMessage(ConnectorMessage),
    InsertContent(MessageContent),
    StoreContent(MessageContent),
    Status {
        key: MessageKey,
        status: Status,
        send_attempts: u32,
    },
    Errors {
        key: MessageKey,
        errors: Option<String>,
    },
    ResponseMap {
        key: MessageKey,
        response_map: HashMap<String, Response>,
    },
    DeleteAllContent {
        channel_id: String,
        message_id: u64,
    },
}

/// An in-memory, transactional [`MessageStore`]
///
/// Writes are staged per transaction and applied all-or-nothing on commit.
/// Nothing survives the process, so durable and best-effort commits behave
/// the same; they are only counted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    stats: Arc<Mutex<CommitStats>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed state of one destination message, content included
    pub fn connector_message(&self, key: &MessageKey) -> Option<ConnectorMessage> {
        self.state.lock().assemble(key)
    }

    /// Committed content of the given type for one destination message
    pub fn content(&self, key: &MessageKey, content_type: ContentType) -> Option<MessageContent> {
        self.state
            .lock()
            .content
            .get(&(key.clone(), content_type))
            .cloned()
    }

    /// How many pieces of content are stored for `message_id`, across destinations
    pub fn content_count(&self, channel_id: &str, message_id: u64) -> usize {
        self.state
            .lock()
            .content
            .keys()
            .filter(|(key, _)| key.channel_id == channel_id && key.message_id == message_id)
            .count()
    }

    pub fn commit_stats(&self) -> CommitStats {
        *self.stats.lock()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn transaction(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
            staged: Vec::new(),
            closed: false,
        }))
    }

    fn queue_source(
        &self,
        channel_id: &str,
        meta_data_id: u32,
        status: Status,
    ) -> Arc<dyn QueueDataSource> {
        Arc::new(MemoryQueueSource {
            state: Arc::clone(&self.state),
            channel_id: channel_id.to_string(),
            meta_data_id,
            status,
        })
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    stats: Arc<Mutex<CommitStats>>,
    staged: Vec<Op>,
    closed: bool,
}

impl MemoryTransaction {
    fn stage(&mut self, op: Op) -> Result<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }

        self.staged.push(op);
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_connector_message(&mut self, message: &ConnectorMessage) -> Result<()> {
        self.stage(Op::InsertMessage(message.clone()))
    }

    async fn insert_content(&mut self, content: &MessageContent) -> Result<()> {
        self.stage(Op::InsertContent(content.clone()))
    }

    async fn store_content(&mut self, content: &MessageContent) -> Result<()> {
        self.stage(Op::StoreContent(content.clone()))
    }

    async fn update_status(&mut self, message: &ConnectorMessage, previous: Status) -> Result<()> {
        trace!(
            key = %message.key(),
            from = %previous,
            to = %message.status,
            "Staging status update"
        );

        self.stage(Op::Status {
            key: message.key(),
            status: message.status,
            send_attempts: message.send_attempts,
        })
    }

    async fn update_errors(&mut self, message: &ConnectorMessage) -> Result<()> {
        self.stage(Op::Errors {
            key: message.key(),
            errors: message.errors.clone(),
        })
    }

    async fn update_response_map(&mut self, message: &ConnectorMessage) -> Result<()> {
        self.stage(Op::ResponseMap {
            key: message.key(),
            response_map: message.response_map.clone(),
        })
    }

    async fn connector_messages(
        &mut self,
        channel_id: &str,
        message_id: u64,
    ) -> Result<HashMap<u32, ConnectorMessage>> {
        if self.closed {
            return Err(StoreError::Closed);
        }

        let state = self.state.lock();
        Ok(state
            .messages
            .keys()
            .filter(|key| key.channel_id == channel_id && key.message_id == message_id)
            .filter_map(|key| state.assemble(key))
            .map(|message| (message.meta_data_id, message))
            .collect())
    }

    async fn delete_all_content(&mut self, channel_id: &str, message_id: u64) -> Result<()> {
        self.stage(Op::DeleteAllContent {
            channel_id: channel_id.to_string(),
            message_id,
        })
    }

    async fn commit(&mut self, durable: bool) -> Result<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }

        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();

        {
            let mut state = self.state.lock();
            let mut next = state.clone();
            for op in staged {
                next.apply(op)?;
            }
            *state = next;
        }

        let mut stats = self.stats.lock();
        if durable {
            stats.durable += 1;
        } else {
            stats.best_effort += 1;
        }

        trace!(writes = count, durable, "Committed transaction");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }

        self.staged.clear();
        self.stats.lock().rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) {
        if !self.staged.is_empty() {
            trace!(
                writes = self.staged.len(),
                "Discarding uncommitted writes on close"
            );
        }

        self.staged.clear();
        self.closed = true;
    }
}

#[derive(Debug)]
struct MemoryQueueSource {
    state: Arc<Mutex<State>>,
    channel_id: String,
    meta_data_id: u32,
    status: Status,
}

impl MemoryQueueSource {
    fn matches(&self, message: &ConnectorMessage) -> bool {
        message.channel_id == self.channel_id
            && message.meta_data_id == self.meta_data_id
            && message.status == self.status
    }
}

#[async_trait]
impl QueueDataSource for MemoryQueueSource {
    async fn size(&self) -> Result<usize> {
        Ok(self
            .state
            .lock()
            .messages
            .values()
            .filter(|message| self.matches(message))
            .count())
    }

    async fn items(&self, offset: usize, limit: usize) -> Result<Vec<ConnectorMessage>> {
        let state = self.state.lock();

        Ok(state
            .messages
            .iter()
            .filter(|(_, message)| self.matches(message))
            .skip(offset)
            .take(limit)
            .filter_map(|(key, _)| state.assemble(key))
            .collect())
    }
}
