use std::collections::HashMap;

use courier_common::{ConnectorMessage, Status};

/// Decides whether a message is finished across every destination of its channel
pub trait CompletionOracle: Send + Sync {
    /// `messages` holds each destination's message, keyed by meta-data id
    fn is_complete(&self, messages: &HashMap<u32, ConnectorMessage>) -> bool;
}

/// A message is complete once no destination will touch it again: every
/// destination is `SENT`, `FILTERED` or `ERROR`, and the source isn't still
/// waiting to be processed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalStatusOracle;

impl CompletionOracle for TerminalStatusOracle {
    fn is_complete(&self, messages: &HashMap<u32, ConnectorMessage>) -> bool {
        messages.values().all(|message| {
            if message.meta_data_id == 0 {
                message.status != Status::Received
            } else {
                message.status.is_completed()
            }
        })
    }
}
