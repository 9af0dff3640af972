//! Content removal once a message is complete across every destination

use courier_common::{ConnectorMessage, tracing::debug};
use courier_store::{Codec, StoreTransaction};

use super::Shared;
use crate::{error::ConnectorError, sender::Sender};

impl<S: Sender, C: Codec> Shared<S, C> {
    /// Delete all of the message's content if, with `message` as it is now,
    /// every destination is done with it
    ///
    /// Returns whether the content was deleted.
    pub(super) async fn remove_completed_content(
        &self,
        tx: &mut dyn StoreTransaction,
        message: &ConnectorMessage,
    ) -> Result<bool, ConnectorError> {
        let mut messages = tx
            .connector_messages(&message.channel_id, message.message_id)
            .await?;
        messages.insert(message.meta_data_id, message.clone());

        if !self.oracle.is_complete(&messages) {
            return Ok(false);
        }

        debug!(
            channel_id = %message.channel_id,
            message_id = message.message_id,
            destinations = messages.len(),
            "Message complete, removing its content"
        );
        tx.delete_all_content(&message.channel_id, message.message_id)
            .await?;

        Ok(true)
    }
}
