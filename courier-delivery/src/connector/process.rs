//! The synchronous send path, and the send-retry loop both paths share

use courier_common::{
    ConnectorMessage, Response, Status,
    tracing::{debug, warn},
};
use courier_store::{Codec, StoreTransaction};
use tokio_util::sync::CancellationToken;

use super::{Shared, checkpoint, sleep};
use crate::{error::ConnectorError, policy::status::normalize_response, sender::Sender};

impl<S: Sender, C: Codec> Shared<S, C> {
    /// Send `message` now, or hand it to the queue
    ///
    /// A message left for the queue is set to `QUEUED` here, and that status
    /// is persisted as a transition from `previous`.
    pub(super) async fn process(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        previous: Status,
        token: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        let queue = &self.config.queue;
        let attempt_send = !queue.enabled || queue.send_first;

        // Without regeneration, the queue consumer resends whatever is stored here
        let properties = if attempt_send || !queue.regenerate_template {
            Some(self.regenerate_properties(tx, message, token).await?)
        } else {
            None
        };

        match properties {
            Some(properties) if attempt_send => {
                let response = self
                    .send_with_retry(tx, &properties, message, 0, token)
                    .await?;
                self.after_send(tx, message, response, previous, token).await
            }
            _ => {
                debug!(key = %message.key(), "Leaving message for the queue");

                message.status = Status::Queued;
                tx.update_status(message, previous).await?;
                Ok(())
            }
        }
    }

    /// Send `message`, retrying while it comes back `ERROR` or `QUEUED`
    ///
    /// `baseline` is how many sends the message has already had; together
    /// with the retry count it bounds how many are made here.
    pub(super) async fn send_with_retry(
        &self,
        tx: &mut dyn StoreTransaction,
        properties: &S::Properties,
        message: &mut ConnectorMessage,
        baseline: u32,
        token: &CancellationToken,
    ) -> Result<Response, ConnectorError> {
        let mut send_attempts = baseline;

        let response = loop {
            if send_attempts > baseline {
                sleep(token, self.retry.retry_interval).await?;
            } else {
                checkpoint(token)?;
            }

            let mut response = self.send(properties, message, token).await?;
            send_attempts += 1;
            message.send_attempts = send_attempts;
            normalize_response(&mut response, self.is_queue_enabled());

            if !self.retry.should_retry(response.status, send_attempts) {
                break response;
            }

            debug!(
                key = %message.key(),
                send_attempts,
                status = %response.status,
                "Send failed, retrying"
            );
        };

        if let Some(error) = response.error_text() {
            message.errors = Some(error.to_string());
            tx.update_errors(message).await?;
        }

        Ok(response)
    }

    /// A single delivery attempt, abandoned if `token` is cancelled
    async fn send(
        &self,
        properties: &S::Properties,
        message: &ConnectorMessage,
        token: &CancellationToken,
    ) -> Result<Response, ConnectorError> {
        let response = tokio::select! {
            () = token.cancelled() => return Err(ConnectorError::Cancelled),
            response = self.sender.send(properties, message) => response,
        };

        response.ok_or_else(|| {
            warn!(
                key = %message.key(),
                destination = %self.config.name,
                "Sender produced no response"
            );

            ConnectorError::NoResponse {
                destination: self.config.name.clone(),
            }
        })
    }
}
