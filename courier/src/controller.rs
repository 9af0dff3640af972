use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use courier_common::{ConnectorMessage, Signal, Status, internal, logging, tracing};
use courier_delivery::{DestinationConfig, DestinationConnector};
use courier_store::{MemoryStore, MessageStore, TransactionGuard};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::file_sender::{FileSender, FileSenderConfig};

#[derive(Debug, Deserialize)]
pub struct Courier {
    destination: DestinationConfig,
    file: FileSenderConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Broadcast [`Signal::Shutdown`] on the first interrupt, and [`Signal::Halt`]
/// on the next
#[tracing::instrument(level = tracing::Level::TRACE)]
async fn listen_for_signals() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to abandon in-flight sends");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Halt)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

async fn wait_for(receiver: &mut broadcast::Receiver<Signal>, signal: Signal) {
    loop {
        match receiver.recv().await {
            Ok(s) if s == signal => break,
            Ok(s) => tracing::debug!("Received {s:?}"),
            Err(broadcast::error::RecvError::Closed) => break,
            Err(e) => tracing::debug!("Received: {e:?}"),
        }
    }
}

impl Courier {
    /// Deliver each of `payloads` through the configured destination, then
    /// keep the queue running until asked to shut down
    ///
    /// # Errors
    ///
    /// If the destination fails to start or stop
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn run(self, payloads: Vec<PathBuf>) -> anyhow::Result<()> {
        logging::init();

        let store = MemoryStore::new();
        let shared: Arc<dyn MessageStore> = Arc::new(store.clone());
        let connector =
            DestinationConnector::new(self.destination, FileSender::new(self.file), shared);

        let mut receiver = SHUTDOWN_BROADCAST.subscribe();
        let signals = tokio::spawn(listen_for_signals());

        connector.start().await?;

        internal!(level = INFO, "Delivering {} payload(s)", payloads.len());

        for (message_id, path) in (1..).zip(payloads) {
            if let Err(e) = dispatch(&connector, &store, message_id, &path).await {
                internal!(
                    level = ERROR,
                    "Unable to deliver {}: {e}",
                    path.display()
                );
            }
        }

        if connector.is_queue_enabled() {
            internal!(level = INFO, "Queue running, waiting for shutdown");

            wait_for(&mut receiver, Signal::Shutdown).await;

            internal!(level = INFO, "Shutting down...");

            tokio::select! {
                r = connector.stop() => r?,
                () = wait_for(&mut receiver, Signal::Halt) => {
                    internal!(level = WARN, "Halting, in-flight sends are abandoned");
                    connector.halt().await?;
                }
            }
        } else {
            connector.stop().await?;
        }

        signals.abort();

        Ok(())
    }
}

/// Persist the payload at `path` as a new message, process it, and queue it
/// if it wasn't delivered straight away
async fn dispatch(
    connector: &DestinationConnector<FileSender>,
    store: &MemoryStore,
    message_id: u64,
    path: &Path,
) -> anyhow::Result<()> {
    let payload = tokio::fs::read(path).await?;
    let mut message = ConnectorMessage::new(
        connector.channel_id(),
        message_id,
        connector.meta_data_id(),
        connector.destination_name(),
        Status::Received,
    )
    .with_encoded(payload);

    let mut tx = TransactionGuard::begin(store).await?;
    tx.insert_connector_message(&message).await?;
    connector
        .process(&mut *tx, &mut message, Status::Received)
        .await?;
    tx.commit(true).await?;
    drop(tx);

    internal!(
        level = DEBUG,
        "Message {message_id} from {} is {:?}",
        path.display(),
        message.status
    );

    connector.enqueue(message).await;

    Ok(())
}
