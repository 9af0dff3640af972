use courier_common::{QueueConnectorProperties, StorageSettings};
use serde::{Deserialize, Serialize};

const fn default_meta_data_id() -> u32 {
    1
}

const fn default_enabled() -> bool {
    true
}

/// Configuration for a single destination of a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// The channel this destination belongs to
    pub channel_id: String,

    /// Identifies this destination within its channel (0 is the source)
    ///
    /// Default: 1
    #[serde(default = "default_meta_data_id")]
    pub meta_data_id: u32,

    /// Name responses are recorded under in the response map
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Queueing and retry policy
    #[serde(default)]
    pub queue: QueueConnectorProperties,

    /// What gets persisted while processing
    #[serde(default)]
    pub storage: StorageSettings,

    /// Delete all of a message's content once every destination is done with it
    #[serde(default)]
    pub remove_content_on_completion: bool,
}

impl DestinationConfig {
    #[must_use]
    pub fn new(channel_id: impl Into<String>, meta_data_id: u32, name: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            meta_data_id,
            name: name.into(),
            enabled: true,
            queue: QueueConnectorProperties::default(),
            storage: StorageSettings::default(),
            remove_content_on_completion: false,
        }
    }

    #[must_use]
    pub fn with_queue(mut self, queue: QueueConnectorProperties) -> Self {
        self.queue = queue;
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: StorageSettings) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub const fn with_remove_content_on_completion(mut self, remove: bool) -> Self {
        self.remove_content_on_completion = remove;
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_destination_from_config() -> Result<(), ron::error::SpannedError> {
        let config: DestinationConfig = ron::from_str(
            r#"(
                channel_id: "adt",
                name: "Archive",
                queue: (enabled: true, retry_count: 3),
                remove_content_on_completion: true,
            )"#,
        )?;

        assert_eq!(config.meta_data_id, 1);
        assert!(config.enabled);
        assert!(config.queue.enabled);
        assert_eq!(config.queue.retry_count, 3);
        assert_eq!(config.storage, StorageSettings::default());
        assert!(config.remove_content_on_completion);

        Ok(())
    }
}
