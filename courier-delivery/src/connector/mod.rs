//! Destination connector orchestration
//!
//! A [`DestinationConnector`] delivers messages for one destination of a
//! channel. Messages reach it in one of two ways:
//! - [`process`](DestinationConnector::process), called by the channel for
//!   every message; it sends right away when the queue is disabled or
//!   `send_first` is set, and otherwise leaves the message `QUEUED`
//! - The queue consumer, a background task that runs while the connector is
//!   started with its queue enabled, retrying queued messages in order
//!
//! Both paths share the same send, retry and response handling.

mod cleanup;
mod consumer;
mod process;
mod response;

use std::{sync::Arc, time::Duration};

use courier_common::{
    ChannelState, ConnectorMessage, ContentType, MessageContent, Status, internal,
    tracing::{debug, info},
};
use courier_store::{BincodeCodec, Codec, MessageStore, StoreTransaction};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    completion::{CompletionOracle, TerminalStatusOracle},
    config::DestinationConfig,
    error::ConnectorError,
    policy::RetryPolicy,
    queue::ConnectorMessageQueue,
    sender::Sender,
    transformer::ResponseTransformer,
};

/// Cancellation for one run of the connector
///
/// `shutdown` only interrupts idle waits, so work already started finishes;
/// `cancel` also abandons in-flight sends and retries. Cancelling `cancel`
/// cancels `shutdown` too.
#[derive(Debug, Clone)]
struct Tokens {
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl Tokens {
    fn new() -> Self {
        let cancel = CancellationToken::new();
        let shutdown = cancel.child_token();

        Self { cancel, shutdown }
    }
}

/// Everything the synchronous path and the queue consumer share
struct Shared<S, C> {
    config: DestinationConfig,
    retry: RetryPolicy,
    sender: S,
    codec: C,
    store: Arc<dyn MessageStore>,
    queue: ConnectorMessageQueue,
    transformer: Option<Arc<dyn ResponseTransformer>>,
    oracle: Arc<dyn CompletionOracle>,
    state: RwLock<ChannelState>,
    tokens: Mutex<Tokens>,
}

impl<S: Sender, C: Codec> Shared<S, C> {
    fn state(&self) -> ChannelState {
        *self.state.read()
    }

    fn set_state(&self, state: ChannelState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        debug!(
            channel_id = %self.config.channel_id,
            destination = %self.config.name,
            "{previous} -> {state}"
        );
    }

    fn tokens(&self) -> Tokens {
        self.tokens.lock().clone()
    }

    const fn is_queue_enabled(&self) -> bool {
        self.config.queue.enabled
    }

    /// Attach `content` to `message`, persisting it when `store` is set
    ///
    /// Content the message didn't carry yet is inserted, otherwise it replaces
    /// what was stored before.
    async fn persist_content(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        content: MessageContent,
        store: bool,
        token: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        if store {
            checkpoint(token)?;

            if message.content(content.content_type).is_some() {
                tx.store_content(&content).await?;
            } else {
                tx.insert_content(&content).await?;
            }
        }

        message.set_content(content);
        Ok(())
    }

    /// Build fresh send parameters for `message` and record them as its `sent` content
    async fn regenerate_properties(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        token: &CancellationToken,
    ) -> Result<S::Properties, ConnectorError> {
        checkpoint(token)?;

        let properties = self.sender.replaced_properties(message);
        let content = MessageContent::for_message(
            message,
            ContentType::Sent,
            self.codec.serialize(&properties)?,
        );
        self.persist_content(tx, message, content, self.config.storage.store_sent, token)
            .await?;

        Ok(properties)
    }
}

/// Fail with [`ConnectorError::Cancelled`] once `token` has been cancelled
fn checkpoint(token: &CancellationToken) -> Result<(), ConnectorError> {
    if token.is_cancelled() {
        Err(ConnectorError::Cancelled)
    } else {
        Ok(())
    }
}

/// Sleep for `duration`, unless `token` is cancelled first
async fn sleep(token: &CancellationToken, duration: Duration) -> Result<(), ConnectorError> {
    tokio::select! {
        () = token.cancelled() => Err(ConnectorError::Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Assembles a [`DestinationConnector`]
pub struct DestinationConnectorBuilder<S, C = BincodeCodec> {
    config: DestinationConfig,
    sender: S,
    codec: C,
    store: Arc<dyn MessageStore>,
    transformer: Option<Arc<dyn ResponseTransformer>>,
    oracle: Arc<dyn CompletionOracle>,
}

impl<S: Sender, C: Codec> DestinationConnectorBuilder<S, C> {
    /// Encode send parameters and responses with `codec` instead
    #[must_use]
    pub fn codec<T: Codec>(self, codec: T) -> DestinationConnectorBuilder<S, T> {
        DestinationConnectorBuilder {
            config: self.config,
            sender: self.sender,
            codec,
            store: self.store,
            transformer: self.transformer,
            oracle: self.oracle,
        }
    }

    /// Run `transformer` over every response before its status is final
    #[must_use]
    pub fn transformer(mut self, transformer: impl ResponseTransformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Decide message completion with `oracle` rather than [`TerminalStatusOracle`]
    #[must_use]
    pub fn oracle(mut self, oracle: impl CompletionOracle + 'static) -> Self {
        self.oracle = Arc::new(oracle);
        self
    }

    #[must_use]
    pub fn build(self) -> DestinationConnector<S, C> {
        let capacity = self.config.queue.buffer_capacity;

        DestinationConnector {
            shared: Arc::new(Shared {
                retry: RetryPolicy::from(&self.config.queue),
                config: self.config,
                sender: self.sender,
                codec: self.codec,
                store: self.store,
                queue: ConnectorMessageQueue::new(capacity),
                transformer: self.transformer,
                oracle: self.oracle,
                state: RwLock::new(ChannelState::Stopped),
                tokens: Mutex::new(Tokens::new()),
            }),
            worker: Mutex::new(None),
        }
    }
}

/// Delivers messages to a single destination
pub struct DestinationConnector<S, C = BincodeCodec> {
    shared: Arc<Shared<S, C>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Sender> DestinationConnector<S> {
    #[must_use]
    pub fn builder(
        config: DestinationConfig,
        sender: S,
        store: Arc<dyn MessageStore>,
    ) -> DestinationConnectorBuilder<S> {
        DestinationConnectorBuilder {
            config,
            sender,
            codec: BincodeCodec,
            store,
            transformer: None,
            oracle: Arc::new(TerminalStatusOracle),
        }
    }

    /// A connector with the default codec, no response transformer, and
    /// completion decided by [`TerminalStatusOracle`]
    #[must_use]
    pub fn new(config: DestinationConfig, sender: S, store: Arc<dyn MessageStore>) -> Self {
        Self::builder(config, sender, store).build()
    }
}

impl<S: Sender, C: Codec> DestinationConnector<S, C> {
    #[must_use]
    pub fn config(&self) -> &DestinationConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.shared.config.channel_id
    }

    #[must_use]
    pub fn meta_data_id(&self) -> u32 {
        self.shared.config.meta_data_id
    }

    #[must_use]
    pub fn destination_name(&self) -> &str {
        &self.shared.config.name
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.config.enabled
    }

    #[must_use]
    pub fn is_queue_enabled(&self) -> bool {
        self.shared.is_queue_enabled()
    }

    #[must_use]
    pub fn current_state(&self) -> ChannelState {
        self.shared.state()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current_state().is_running()
    }

    #[must_use]
    pub fn queue(&self) -> &ConnectorMessageQueue {
        &self.shared.queue
    }

    #[must_use]
    pub fn sender(&self) -> &S {
        &self.shared.sender
    }

    /// Start the connector, and its queue consumer when queueing is enabled
    ///
    /// # Errors
    /// If the connector isn't stopped, the queue can't be read, or the
    /// sender fails to start. The connector is left stopped on failure.
    #[tracing::instrument(skip(self), fields(channel_id = %self.channel_id(), destination = %self.destination_name()))]
    pub async fn start(&self) -> Result<(), ConnectorError> {
        let state = self.current_state();
        if state != ChannelState::Stopped {
            return Err(ConnectorError::InvalidState {
                operation: "start",
                state,
            });
        }

        self.shared.set_state(ChannelState::Starting);

        let tokens = Tokens::new();
        *self.shared.tokens.lock() = tokens.clone();

        if self.is_queue_enabled()
            && let Err(error) = self.start_consumer(tokens.clone()).await
        {
            self.shared.set_state(ChannelState::Stopped);
            return Err(error);
        }

        if let Err(source) = self.shared.sender.on_start().await {
            tokens.cancel.cancel();
            if let Err(error) = self.join_worker().await {
                debug!("Queue consumer didn't exit cleanly after a failed start: {error}");
            }
            self.shared.set_state(ChannelState::Stopped);

            return Err(ConnectorError::Start {
                channel_id: self.channel_id().to_string(),
                source,
            });
        }

        self.shared.set_state(ChannelState::Started);
        info!("Destination {} started", self.destination_name());

        Ok(())
    }

    async fn start_consumer(&self, tokens: Tokens) -> Result<(), ConnectorError> {
        let queue = &self.shared.queue;

        if !queue.has_data_source().await {
            queue
                .set_data_source(self.shared.store.queue_source(
                    self.channel_id(),
                    self.meta_data_id(),
                    Status::Queued,
                ))
                .await;
        }

        queue.update_size().await?;
        internal!(
            level = DEBUG,
            "Starting queue consumer with {} queued messages",
            queue.size().await
        );

        let shared = Arc::clone(&self.shared);
        *self.worker.lock() = Some(tokio::spawn(shared.run_consumer(tokens)));

        Ok(())
    }

    /// Stop the connector, letting the queue consumer finish the message it is on
    ///
    /// # Errors
    /// If the queue consumer doesn't exit cleanly, or the sender fails to stop
    #[tracing::instrument(skip(self), fields(channel_id = %self.channel_id(), destination = %self.destination_name()))]
    pub async fn stop(&self) -> Result<(), ConnectorError> {
        self.shared.set_state(ChannelState::Stopping);
        self.shared.tokens().shutdown.cancel();

        self.finish_stop().await
    }

    /// Stop the connector, abandoning whatever the queue consumer is doing
    ///
    /// # Errors
    /// If the queue consumer doesn't exit cleanly, or the sender fails to stop
    #[tracing::instrument(skip(self), fields(channel_id = %self.channel_id(), destination = %self.destination_name()))]
    pub async fn halt(&self) -> Result<(), ConnectorError> {
        self.shared.set_state(ChannelState::Stopping);
        self.shared.tokens().cancel.cancel();

        self.finish_stop().await
    }

    /// Join the queue consumer and stop the sender. The connector ends up
    /// stopped either way; the first failure is returned.
    async fn finish_stop(&self) -> Result<(), ConnectorError> {
        let joined = self.join_worker().await;

        let stopped = self
            .shared
            .sender
            .on_stop()
            .await
            .map_err(|source| ConnectorError::Stop {
                channel_id: self.channel_id().to_string(),
                source,
            });

        self.shared.set_state(ChannelState::Stopped);
        info!("Destination {} stopped", self.destination_name());

        joined.and(stopped)
    }

    async fn join_worker(&self) -> Result<(), ConnectorError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        let mut joining = Joining {
            slot: &self.worker,
            handle: Some(worker),
        };
        let joined = match joining.handle.as_mut() {
            Some(handle) => handle.await,
            None => Ok(()),
        };
        joining.handle = None;

        joined.map_err(|error| ConnectorError::Stop {
            channel_id: self.channel_id().to_string(),
            source: error.into(),
        })
    }

    /// Process a message that has reached this destination
    ///
    /// Sends it straight away when queueing is disabled or `send_first` is
    /// set; otherwise marks it `QUEUED` for the queue consumer. Nothing is
    /// committed: that is up to the caller, who owns `tx`.
    ///
    /// # Errors
    /// If the connector is halted mid-way, the sender produces no response, or
    /// persisting fails
    #[tracing::instrument(skip_all, fields(key = %message.key(), destination = %self.destination_name()))]
    pub async fn process(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        previous: Status,
    ) -> Result<(), ConnectorError> {
        let token = self.shared.tokens().cancel;
        self.shared.process(tx, message, previous, &token).await
    }

    /// Resume a message left `PENDING` by an interrupted response transformer
    ///
    /// # Errors
    /// If the message has no stored response, it can't be decoded, or
    /// persisting fails
    #[tracing::instrument(skip_all, fields(key = %message.key(), destination = %self.destination_name()))]
    pub async fn process_pending(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
    ) -> Result<(), ConnectorError> {
        let token = self.shared.tokens().cancel;
        self.shared.process_pending(tx, message, &token).await
    }

    /// Hand a committed, `QUEUED` message to the queue consumer
    ///
    /// Returns whether the message was queued: messages in any other status,
    /// or for a destination without a queue, are left alone.
    pub async fn enqueue(&self, message: ConnectorMessage) -> bool {
        if !self.is_queue_enabled() || message.status != Status::Queued {
            return false;
        }

        self.shared.queue.add(message).await;
        true
    }
}

/// A queue consumer being waited on. Puts the handle back if the wait is
/// abandoned, so a later `halt` can still join it.
struct Joining<'a> {
    slot: &'a Mutex<Option<JoinHandle<()>>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Joining<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            *self.slot.lock() = Some(handle);
        }
    }
}

impl<S, C> Drop for DestinationConnector<S, C> {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            self.shared.tokens.lock().cancel.cancel();
        }
    }
}

impl<S, C> std::fmt::Debug for DestinationConnector<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationConnector")
            .field("channel_id", &self.shared.config.channel_id)
            .field("destination", &self.shared.config.name)
            .field("state", &*self.shared.state.read())
            .finish_non_exhaustive()
    }
}
