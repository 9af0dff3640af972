//! A destination that writes each message to a file

use std::path::PathBuf;

use async_trait::async_trait;
use courier_common::{ConnectorMessage, Response, Status, outgoing};
use courier_delivery::Sender;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// Where, and how, messages are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSenderConfig {
    /// Path of the file to write, with `${channelId}`, `${messageId}`,
    /// `${metaDataId}` and `${destination}` replaced per message
    pub path: String,

    /// Append to the file instead of replacing it
    #[serde(default)]
    pub append: bool,
}

/// Everything needed to write one message, already substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub append: bool,
}

#[derive(Debug)]
pub struct FileSender {
    config: FileSenderConfig,
}

impl FileSender {
    #[must_use]
    pub const fn new(config: FileSenderConfig) -> Self {
        Self { config }
    }

    fn substitute(&self, message: &ConnectorMessage) -> String {
        self.config
            .path
            .replace("${channelId}", &message.channel_id)
            .replace("${messageId}", &message.message_id.to_string())
            .replace("${metaDataId}", &message.meta_data_id.to_string())
            .replace("${destination}", &message.connector_name)
    }

    async fn write(properties: &FileProperties) -> std::io::Result<()> {
        if let Some(parent) = properties.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(properties.append)
            .truncate(!properties.append)
            .open(&properties.path)
            .await?;

        file.write_all(&properties.content).await?;
        file.flush().await
    }
}

#[async_trait]
impl Sender for FileSender {
    type Properties = FileProperties;

    fn replaced_properties(&self, message: &ConnectorMessage) -> Self::Properties {
        FileProperties {
            path: PathBuf::from(self.substitute(message)),
            content: message
                .encoded
                .as_ref()
                .map(|content| content.content.to_vec())
                .unwrap_or_default(),
            append: self.config.append,
        }
    }

    async fn send(
        &self,
        properties: &Self::Properties,
        message: &ConnectorMessage,
    ) -> Option<Response> {
        outgoing!(
            level = DEBUG,
            "Writing message {} to {}",
            message.message_id,
            properties.path.display()
        );

        // A failed write is left queued, so it is retried when the destination queues
        Some(match Self::write(properties).await {
            Ok(()) => Response::sent()
                .with_status_message(format!("Written to {}", properties.path.display())),
            Err(e) => Response {
                error: Some(format!(
                    "Failed to write {}: {e}",
                    properties.path.display()
                )),
                ..Response::new(Status::Queued)
            }
            .with_status_message("Write failed"),
        })
    }

    async fn on_start(&self) -> anyhow::Result<()> {
        if self.config.path.trim().is_empty() {
            anyhow::bail!("File destination has no path configured");
        }

        Ok(())
    }
}
