//! The background queue consumer

use std::sync::Arc;

use courier_common::{
    ChannelState, ConnectorMessage, ContentType, Status, internal,
    tracing::{error, warn},
};
use courier_store::{Codec, StoreTransaction, TransactionGuard};

use super::{Shared, Tokens, checkpoint, sleep};
use crate::{error::ConnectorError, sender::Sender};

/// What the consumer remembers between iterations
#[derive(Debug, Default)]
struct Cursor {
    /// The message the last iteration worked on
    message_id: Option<u64>,
    /// Sends made for that message since it reached the head of the queue
    send_attempts: u32,
    /// Consecutive iterations on that message that failed outright
    failures: u32,
}

/// Leaves the connector stopped however the consumer exits, including a
/// panic in the sender or the task being dropped
struct ConsumerExit<'a, S: Sender, C: Codec> {
    shared: &'a Shared<S, C>,
    finished: bool,
}

impl<S: Sender, C: Codec> Drop for ConsumerExit<'_, S, C> {
    fn drop(&mut self) {
        if !self.finished {
            error!(
                channel_id = %self.shared.config.channel_id,
                destination = %self.shared.config.name,
                "Queue consumer exited abnormally"
            );
            self.shared.queue.discard_buffer();
        }

        self.shared.set_state(ChannelState::Stopped);
    }
}

impl<S: Sender, C: Codec> Shared<S, C> {
    /// Work through the queue until the connector stops or is halted
    pub(super) async fn run_consumer(self: Arc<Self>, tokens: Tokens) {
        internal!(
            level = DEBUG,
            "Queue consumer running for {} ({})",
            self.config.name,
            self.config.channel_id
        );

        let mut exit = ConsumerExit {
            shared: &*self,
            finished: false,
        };
        let mut cursor = Cursor::default();

        while self.state().is_running() {
            match self.consume_head(&tokens, &mut cursor).await {
                Ok(()) => cursor.failures = 0,
                Err(error) if error.is_cancelled() => break,
                Err(error) => {
                    cursor.failures = cursor.failures.saturating_add(1);
                    let delay = self.retry.failure_delay(cursor.failures);

                    error!(
                        channel_id = %self.config.channel_id,
                        destination = %self.config.name,
                        message_id = ?cursor.message_id,
                        failures = cursor.failures,
                        ?delay,
                        "Error processing queued message: {error}"
                    );

                    if sleep(&tokens.shutdown, delay).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.queue.clear_buffer().await;
        exit.finished = true;

        internal!(
            level = DEBUG,
            "Queue consumer exited for {} ({})",
            self.config.name,
            self.config.channel_id
        );
    }

    /// Attempt the message at the head of the queue, if there is one
    async fn consume_head(
        &self,
        tokens: &Tokens,
        cursor: &mut Cursor,
    ) -> Result<(), ConnectorError> {
        let Some(mut message) = self.queue.peek().await? else {
            return sleep(&tokens.shutdown, self.retry.retry_interval).await;
        };

        let mut tx = TransactionGuard::begin(self.store.as_ref()).await?;

        match self
            .attempt_queued(&mut *tx, &mut message, tokens, cursor)
            .await
        {
            Ok(()) => {
                if message.status == Status::Queued {
                    self.queue.refresh_head(&message).await;
                } else {
                    self.queue.poll().await?;
                }

                Ok(())
            }
            Err(error) => {
                if !error.is_cancelled()
                    && let Err(rollback) = tx.rollback().await
                {
                    warn!(
                        key = %message.key(),
                        "Failed to roll back after an error: {rollback}"
                    );
                }

                Err(error)
            }
        }
    }

    async fn attempt_queued(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        tokens: &Tokens,
        cursor: &mut Cursor,
    ) -> Result<(), ConnectorError> {
        let previous = message.status;

        if cursor.message_id == Some(message.message_id) {
            // The same message is still at the head; give the destination a
            // moment, unless the failure backoff already did
            if cursor.failures == 0 {
                sleep(&tokens.shutdown, self.retry.retry_interval).await?;
            }
        } else {
            cursor.message_id = Some(message.message_id);
            cursor.send_attempts = u32::from(self.config.queue.send_first);
            cursor.failures = 0;
        }

        let properties = self.queued_properties(tx, message, tokens).await?;

        let response = self
            .send_with_retry(tx, &properties, message, cursor.send_attempts, &tokens.cancel)
            .await?;
        cursor.send_attempts = message.send_attempts;

        self.after_send(tx, message, response, previous, &tokens.cancel)
            .await?;

        if self.config.remove_content_on_completion {
            self.remove_completed_content(tx, message).await?;
        }

        checkpoint(&tokens.cancel)?;
        tx.commit(self.config.storage.durable).await?;

        Ok(())
    }

    /// The send parameters for a queued message: rebuilt, or exactly the ones
    /// stored by its first attempt
    async fn queued_properties(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        tokens: &Tokens,
    ) -> Result<S::Properties, ConnectorError> {
        if !self.config.queue.regenerate_template {
            if let Some(sent) = &message.sent {
                return Ok(self.codec.deserialize(&sent.content)?);
            }

            warn!(
                key = %message.key(),
                content_type = ?ContentType::Sent,
                "No stored send parameters, rebuilding them from the message"
            );
        }

        self.regenerate_properties(tx, message, &tokens.cancel)
            .await
    }
}
