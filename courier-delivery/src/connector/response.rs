//! Response handling: persisting the response, running the transformer and
//! deciding the message's final status

use courier_common::{
    ConnectorMessage, ContentType, MessageContent, Response, Status, tracing::error,
};
use courier_store::{Codec, StoreTransaction};
use tokio_util::sync::CancellationToken;

use super::{Shared, checkpoint};
use crate::{
    error::ConnectorError, policy::status::normalize_response, sender::Sender,
    transformer::ResponseTransformer,
};

impl<S: Sender, C: Codec> Shared<S, C> {
    pub(super) async fn after_send(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        mut response: Response,
        mut previous: Status,
        token: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        let content = MessageContent::for_message(
            message,
            ContentType::Response,
            self.codec.serialize(&response)?,
        );
        self.persist_content(
            tx,
            message,
            content,
            self.config.storage.store_response,
            token,
        )
        .await?;

        if let Some(transformer) = &self.transformer {
            checkpoint(token)?;

            // Anything that interrupts the transformer leaves the message PENDING to resume from
            message.status = Status::Pending;
            tx.update_status(message, previous).await?;
            tx.commit(self.config.storage.durable).await?;
            previous = Status::Pending;

            self.run_response_transformer(tx, transformer.as_ref(), message, &mut response, token)
                .await?;
        } else {
            normalize_response(&mut response, self.is_queue_enabled());
        }

        message
            .response_map
            .insert(self.config.name.clone(), response.clone());

        if self.config.storage.store_response_map {
            tx.update_response_map(message).await?;
        }

        checkpoint(token)?;
        self.after_response(tx, message, &response, previous).await
    }

    pub(super) async fn process_pending(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        token: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        let Some(content) = &message.response else {
            return Err(ConnectorError::MissingContent {
                key: message.key(),
                content_type: ContentType::Response,
            });
        };

        let mut response: Response = self.codec.deserialize(&content.content)?;
        let previous = message.status;

        if let Some(transformer) = &self.transformer {
            self.run_response_transformer(tx, transformer.as_ref(), message, &mut response, token)
                .await?;
        } else {
            normalize_response(&mut response, self.is_queue_enabled());
        }

        self.after_response(tx, message, &response, previous).await
    }

    async fn run_response_transformer(
        &self,
        tx: &mut dyn StoreTransaction,
        transformer: &dyn ResponseTransformer,
        message: &mut ConnectorMessage,
        response: &mut Response,
        token: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        checkpoint(token)?;

        if let Err(transform_error) = transformer.transform(response) {
            error!(
                key = %message.key(),
                destination = %self.config.name,
                error = %transform_error,
                "Error executing response transformer"
            );

            let formatted = transform_error.formatted();
            response.status = Status::Error;
            response.error = Some(formatted.clone());
            message.append_error(&formatted);
            tx.update_errors(message).await?;

            return Ok(());
        }

        normalize_response(response, self.is_queue_enabled());

        let content = MessageContent::for_message(
            message,
            ContentType::ProcessedResponse,
            self.codec.serialize(&*response)?,
        );
        self.persist_content(
            tx,
            message,
            content,
            self.config.storage.store_processed_response,
            token,
        )
        .await
    }

    /// The response's status becomes the message's
    async fn after_response(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &mut ConnectorMessage,
        response: &Response,
        previous: Status,
    ) -> Result<(), ConnectorError> {
        message.status = response.status;
        tx.update_status(message, previous).await?;

        Ok(())
    }
}
