//! The transport-specific half of a destination

use async_trait::async_trait;
use courier_common::{ConnectorMessage, Response};
use serde::{Serialize, de::DeserializeOwned};

/// Delivers messages to one kind of destination (HTTP, file, TCP, ...)
///
/// The connector decides when to send, how often to retry and what to
/// persist; a `Sender` only turns a message into send parameters and
/// performs a single delivery attempt.
#[async_trait]
pub trait Sender: Send + Sync + 'static {
    /// Everything a single send needs, with the message's values already
    /// substituted in. Stored between attempts, so it must survive encoding.
    type Properties: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Build the send parameters for `message` from the destination's templates
    fn replaced_properties(&self, message: &ConnectorMessage) -> Self::Properties;

    /// Attempt delivery once
    ///
    /// Delivery failures are reported through the response's status and
    /// error. `None` means the sender produced no outcome at all, which the
    /// connector treats as a defect.
    async fn send(
        &self,
        properties: &Self::Properties,
        message: &ConnectorMessage,
    ) -> Option<Response>;

    /// Called once while the connector starts
    ///
    /// # Errors
    /// If the sender can't be made ready, which fails the start
    async fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once while the connector stops or halts
    ///
    /// # Errors
    /// If the sender can't release its resources, which fails the stop
    async fn on_stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
