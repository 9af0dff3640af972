use std::{collections::HashMap, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Response, Status};

/// The kind of payload a [`MessageContent`] holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    Raw,
    ProcessedRaw,
    Transformed,
    Encoded,
    Sent,
    Response,
    ProcessedResponse,
}

/// Identity of a message for one destination: `(channel, message, destination)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub channel_id: String,
    pub message_id: u64,
    pub meta_data_id: u32,
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.channel_id, self.message_id, self.meta_data_id
        )
    }
}

/// A typed, persisted blob belonging to one destination message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub channel_id: String,
    pub message_id: u64,
    pub meta_data_id: u32,
    pub content_type: ContentType,
    pub content: Arc<[u8]>,
    pub encrypted: bool,
}

impl MessageContent {
    #[must_use]
    pub fn new(
        channel_id: impl Into<String>,
        message_id: u64,
        meta_data_id: u32,
        content_type: ContentType,
        content: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id,
            meta_data_id,
            content_type,
            content: content.into(),
            encrypted: false,
        }
    }

    /// Build content of the given type for `message`
    #[must_use]
    pub fn for_message(
        message: &ConnectorMessage,
        content_type: ContentType,
        content: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self::new(
            message.channel_id.clone(),
            message.message_id,
            message.meta_data_id,
            content_type,
            content,
        )
    }

    #[must_use]
    pub fn key(&self) -> MessageKey {
        MessageKey {
            channel_id: self.channel_id.clone(),
            message_id: self.message_id,
            meta_data_id: self.meta_data_id,
        }
    }
}

/// The working state of one message for one destination
///
/// Owned by whoever drives the message through the channel, and mutated in
/// place as it moves through send, response handling and status updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorMessage {
    pub channel_id: String,
    pub message_id: u64,
    pub meta_data_id: u32,
    /// Name of the connector this message belongs to
    pub connector_name: String,
    pub status: Status,
    pub received_date: DateTime<Utc>,
    pub send_attempts: u32,
    /// Accumulated, human readable errors, separated by blank lines
    pub errors: Option<String>,
    /// The payload handed to the destination once transformed and encoded
    pub encoded: Option<MessageContent>,
    pub sent: Option<MessageContent>,
    pub response: Option<MessageContent>,
    pub processed_response: Option<MessageContent>,
    /// Responses keyed by destination name
    pub response_map: HashMap<String, Response>,
}

impl ConnectorMessage {
    #[must_use]
    pub fn new(
        channel_id: impl Into<String>,
        message_id: u64,
        meta_data_id: u32,
        connector_name: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id,
            meta_data_id,
            connector_name: connector_name.into(),
            status,
            received_date: Utc::now(),
            send_attempts: 0,
            errors: None,
            encoded: None,
            sent: None,
            response: None,
            processed_response: None,
            response_map: HashMap::new(),
        }
    }

    /// Attach the encoded payload this destination should deliver
    #[must_use]
    pub fn with_encoded(mut self, content: impl Into<Arc<[u8]>>) -> Self {
        self.encoded = Some(MessageContent::for_message(
            &self,
            ContentType::Encoded,
            content,
        ));
        self
    }

    #[must_use]
    pub fn key(&self) -> MessageKey {
        MessageKey {
            channel_id: self.channel_id.clone(),
            message_id: self.message_id,
            meta_data_id: self.meta_data_id,
        }
    }

    /// Append an error to the ones already recorded, separated by a blank line
    pub fn append_error(&mut self, error: &str) {
        self.errors = Some(match self.errors.take() {
            Some(existing) => format!("{existing}\n\n{error}"),
            None => error.to_string(),
        });
    }

    /// The content slot for `content_type`, if this message carries one
    #[must_use]
    pub const fn content(&self, content_type: ContentType) -> Option<&MessageContent> {
        match content_type {
            ContentType::Encoded => self.encoded.as_ref(),
            ContentType::Sent => self.sent.as_ref(),
            ContentType::Response => self.response.as_ref(),
            ContentType::ProcessedResponse => self.processed_response.as_ref(),
            ContentType::Raw | ContentType::ProcessedRaw | ContentType::Transformed => None,
        }
    }

    /// Put `content` into the matching slot; content types this model doesn't track are dropped
    pub fn set_content(&mut self, content: MessageContent) {
        match content.content_type {
            ContentType::Encoded => self.encoded = Some(content),
            ContentType::Sent => self.sent = Some(content),
            ContentType::Response => self.response = Some(content),
            ContentType::ProcessedResponse => self.processed_response = Some(content),
            ContentType::Raw | ContentType::ProcessedRaw | ContentType::Transformed => {}
        }
    }
}

impl fmt::Display for ConnectorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message {} ({}) for {} [{}]",
            self.message_id, self.meta_data_id, self.connector_name, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn errors_are_separated_by_blank_lines() {
        let mut message = ConnectorMessage::new("channel", 1, 1, "dest", Status::Queued);
        message.append_error("first");
        message.append_error("second");

        assert_eq!(message.errors.as_deref(), Some("first\n\nsecond"));
    }

    #[test]
    fn content_slots() {
        let mut message =
            ConnectorMessage::new("channel", 7, 2, "dest", Status::Queued).with_encoded(*b"hi");
        assert_eq!(
            message.content(ContentType::Encoded).map(|c| c.content.as_ref()),
            Some(b"hi".as_slice())
        );

        let sent = MessageContent::for_message(&message, ContentType::Sent, *b"params");
        message.set_content(sent.clone());

        assert_eq!(message.sent, Some(sent));
        assert_eq!(message.key().to_string(), "channel/7/2");
        assert!(message.content(ContentType::Raw).is_none());
    }
}
