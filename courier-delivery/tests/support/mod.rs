//! Scripted collaborators for driving a destination connector in tests
#![allow(dead_code)] // Test utility module - not all helpers used in every test
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use courier_common::{
    ChannelState, ConnectorMessage, MessageKey, QueueConnectorProperties, Response, Status,
};
use courier_delivery::{
    CompletionOracle, DestinationConfig, DestinationConnector, Sender, TerminalStatusOracle,
};
use courier_store::{MemoryStore, MessageStore, TransactionGuard};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const CHANNEL: &str = "adt";

/// Send parameters as a [`ScriptedSender`] builds them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockProperties {
    pub message_id: u64,
    pub payload: Vec<u8>,
    /// Which call to `replaced_properties` built these, starting at 1
    pub generation: u64,
}

/// One call to [`ScriptedSender::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    pub message_id: u64,
    pub properties: MockProperties,
}

/// A sender that replies from a script, then with a fallback
pub struct ScriptedSender {
    script: Mutex<VecDeque<Option<Response>>>,
    fallback: Option<Response>,
    delay: Option<Duration>,
    fail_start: bool,
    fail_stop: bool,
    panic_on_send: bool,
    generation: AtomicU64,
    sends: Mutex<Vec<SendRecord>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ScriptedSender {
    /// Reply with `response` to every send
    pub fn always(response: Response) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response),
            delay: None,
            fail_start: false,
            fail_stop: false,
            panic_on_send: false,
            generation: AtomicU64::new(0),
            sends: Mutex::new(Vec::new()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Never produce a response
    pub fn silent() -> Self {
        Self {
            fallback: None,
            ..Self::always(Response::sent())
        }
    }

    /// Reply with `script` in order before falling back
    pub fn script(self, script: impl IntoIterator<Item = Option<Response>>) -> Self {
        self.script.lock().extend(script);
        self
    }

    /// Take `delay` over every send
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub const fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub const fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Panic inside every send, like a transport with a bug in it
    pub const fn panicking(mut self) -> Self {
        self.panic_on_send = true;
        self
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.sends.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sender for ScriptedSender {
    type Properties = MockProperties;

    fn replaced_properties(&self, message: &ConnectorMessage) -> Self::Properties {
        MockProperties {
            message_id: message.message_id,
            payload: message
                .encoded
                .as_ref()
                .map(|content| content.content.to_vec())
                .unwrap_or_default(),
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    async fn send(
        &self,
        properties: &Self::Properties,
        message: &ConnectorMessage,
    ) -> Option<Response> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.sends.lock().push(SendRecord {
            message_id: message.message_id,
            properties: properties.clone(),
        });

        assert!(!self.panic_on_send, "transport bug");

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    async fn on_start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);

        if self.fail_start {
            anyhow::bail!("endpoint unreachable");
        }

        Ok(())
    }

    async fn on_stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);

        if self.fail_stop {
            anyhow::bail!("endpoint refused to disconnect");
        }

        Ok(())
    }
}

/// [`TerminalStatusOracle`], counting how often it reports a message complete
#[derive(Debug, Clone, Default)]
pub struct CountingOracle {
    pub completions: Arc<AtomicUsize>,
}

impl CompletionOracle for CountingOracle {
    fn is_complete(
        &self,
        messages: &std::collections::HashMap<u32, ConnectorMessage>,
    ) -> bool {
        let complete = TerminalStatusOracle.is_complete(messages);
        if complete {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
        complete
    }
}

/// Queue policy with intervals short enough for tests
pub fn queue_properties(enabled: bool, send_first: bool, retry_count: u32) -> QueueConnectorProperties {
    QueueConnectorProperties {
        enabled,
        send_first,
        retry_count,
        retry_interval_millis: 10,
        failure_backoff_max_millis: 50,
        failure_backoff_jitter: 0.0,
        ..QueueConnectorProperties::default()
    }
}

pub fn destination(meta_data_id: u32, queue: QueueConnectorProperties) -> DestinationConfig {
    DestinationConfig::new(CHANNEL, meta_data_id, format!("Destination {meta_data_id}"))
        .with_queue(queue)
}

/// A freshly received message for `meta_data_id`
pub fn message(message_id: u64, meta_data_id: u32) -> ConnectorMessage {
    ConnectorMessage::new(
        CHANNEL,
        message_id,
        meta_data_id,
        format!("Destination {meta_data_id}"),
        Status::Received,
    )
    .with_encoded(format!("MSH|{message_id}").into_bytes())
}

pub fn key(message_id: u64, meta_data_id: u32) -> MessageKey {
    MessageKey {
        channel_id: CHANNEL.to_string(),
        message_id,
        meta_data_id,
    }
}

/// Persist `messages` as they are, in one committed transaction
pub async fn seed(store: &MemoryStore, messages: &[ConnectorMessage]) {
    let mut tx = TransactionGuard::begin(store).await.unwrap();
    for message in messages {
        tx.insert_connector_message(message).await.unwrap();
    }
    tx.commit(true).await.unwrap();
}

/// Do what a channel does with a new message: persist it, hand it to the
/// connector, commit, and enqueue it if it ended up queued
pub async fn dispatch(
    connector: &DestinationConnector<ScriptedSender>,
    store: &MemoryStore,
    mut message: ConnectorMessage,
) -> ConnectorMessage {
    let mut tx = TransactionGuard::begin(store).await.unwrap();
    tx.insert_connector_message(&message).await.unwrap();
    tx.commit(true).await.unwrap();

    connector
        .process(&mut *tx, &mut message, Status::Received)
        .await
        .unwrap();
    tx.commit(true).await.unwrap();
    drop(tx);

    connector.enqueue(message.clone()).await;
    message
}

/// Wait until the connector reaches `state` on its own
pub async fn wait_for_state(
    connector: &DestinationConnector<ScriptedSender>,
    state: ChannelState,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while connector.current_state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting on the connector state");
}

/// Wait until the committed status of `key` satisfies `done`
pub async fn wait_for(
    store: &MemoryStore,
    key: &MessageKey,
    done: impl Fn(&ConnectorMessage) -> bool,
) -> ConnectorMessage {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(message) = store.connector_message(key)
                && done(&message)
            {
                return message;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting on the queue consumer")
}

pub fn shared(store: &MemoryStore) -> Arc<dyn MessageStore> {
    Arc::new(store.clone())
}
