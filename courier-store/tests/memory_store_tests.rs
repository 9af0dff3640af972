//! Transaction semantics of the in-memory store
#![allow(clippy::expect_used, clippy::unwrap_used)]

use courier_common::{ConnectorMessage, ContentType, MessageContent, Status};
use courier_store::{CommitStats, MemoryStore, MessageStore, StoreError, TransactionGuard};
use pretty_assertions::assert_eq;

fn queued(message_id: u64, meta_data_id: u32) -> ConnectorMessage {
    ConnectorMessage::new("channel", message_id, meta_data_id, "dest", Status::Queued)
        .with_encoded(*b"payload")
}

async fn seed(store: &MemoryStore, messages: &[ConnectorMessage]) {
    let mut tx = TransactionGuard::begin(store).await.unwrap();
    for message in messages {
        tx.insert_connector_message(message).await.unwrap();
    }
    tx.commit(true).await.unwrap();
}

#[tokio::test]
async fn test_writes_invisible_until_commit() {
    let store = MemoryStore::new();
    let message = queued(1, 1);
    seed(&store, std::slice::from_ref(&message)).await;

    let mut updated = message.clone();
    updated.status = Status::Sent;
    updated.send_attempts = 1;

    let mut tx = TransactionGuard::begin(&store).await.unwrap();
    tx.update_status(&updated, Status::Queued).await.unwrap();

    assert_eq!(
        store.connector_message(&message.key()).unwrap().status,
        Status::Queued
    );

    tx.commit(false).await.unwrap();

    let stored = store.connector_message(&message.key()).unwrap();
    assert_eq!(stored.status, Status::Sent);
    assert_eq!(stored.send_attempts, 1);
    assert_eq!(
        store.commit_stats(),
        CommitStats {
            durable: 1,
            best_effort: 1,
            rollbacks: 0
        }
    );
}

#[tokio::test]
async fn test_rollback_discards_staged_writes() {
    let store = MemoryStore::new();
    let message = queued(1, 1);
    seed(&store, std::slice::from_ref(&message)).await;

    let mut tx = TransactionGuard::begin(&store).await.unwrap();
    let sent = MessageContent::for_message(&message, ContentType::Sent, *b"params");
    tx.insert_content(&sent).await.unwrap();
    tx.rollback().await.unwrap();
    tx.commit(true).await.unwrap();

    assert!(store.content(&message.key(), ContentType::Sent).is_none());
    assert_eq!(store.commit_stats().rollbacks, 1);
}

#[tokio::test]
async fn test_dropping_guard_discards_uncommitted_writes() {
    let store = MemoryStore::new();
    let message = queued(1, 1);
    seed(&store, std::slice::from_ref(&message)).await;

    {
        let mut tx = TransactionGuard::begin(&store).await.unwrap();
        let sent = MessageContent::for_message(&message, ContentType::Sent, *b"params");
        tx.store_content(&sent).await.unwrap();
    }

    assert!(store.content(&message.key(), ContentType::Sent).is_none());
}

#[tokio::test]
async fn test_duplicate_insert_fails_whole_commit() {
    let store = MemoryStore::new();
    let message = queued(1, 1);
    seed(&store, std::slice::from_ref(&message)).await;

    let mut tx = TransactionGuard::begin(&store).await.unwrap();
    let mut errored = message.clone();
    errored.status = Status::Error;
    tx.update_status(&errored, Status::Queued).await.unwrap();
    let encoded = MessageContent::for_message(&message, ContentType::Encoded, *b"again");
    tx.insert_content(&encoded).await.unwrap();

    assert!(matches!(
        tx.commit(true).await,
        Err(StoreError::Internal(_))
    ));
    assert_eq!(
        store.connector_message(&message.key()).unwrap().status,
        Status::Queued
    );
}

#[tokio::test]
async fn test_queue_source_orders_and_filters() {
    let store = MemoryStore::new();
    let mut sent = queued(2, 1);
    sent.status = Status::Sent;
    seed(
        &store,
        &[queued(5, 1), queued(3, 1), sent, queued(4, 2), queued(1, 1)],
    )
    .await;

    let source = store.queue_source("channel", 1, Status::Queued);

    assert_eq!(source.size().await.unwrap(), 3);

    let ids: Vec<u64> = source
        .items(0, 10)
        .await
        .unwrap()
        .iter()
        .map(|message| message.message_id)
        .collect();
    assert_eq!(ids, vec![1, 3, 5]);

    let page = source.items(1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].message_id, 3);
    assert_eq!(
        page[0].encoded.as_ref().map(|c| c.content.as_ref()),
        Some(b"payload".as_slice())
    );
}

#[tokio::test]
async fn test_delete_all_content_spans_destinations() {
    let store = MemoryStore::new();
    seed(&store, &[queued(1, 1), queued(1, 2), queued(2, 1)]).await;

    assert_eq!(store.content_count("channel", 1), 2);

    let mut tx = TransactionGuard::begin(&store).await.unwrap();
    let messages = tx.connector_messages("channel", 1).await.unwrap();
    assert_eq!(messages.len(), 2);
    tx.delete_all_content("channel", 1).await.unwrap();
    tx.commit(true).await.unwrap();

    assert_eq!(store.content_count("channel", 1), 0);
    assert_eq!(store.content_count("channel", 2), 1);
}

#[tokio::test]
async fn test_closed_transaction_rejects_work() {
    let store = MemoryStore::new();
    let mut tx = store.transaction().await.unwrap();
    tx.close();

    assert!(matches!(tx.commit(true).await, Err(StoreError::Closed)));
    assert!(matches!(
        tx.insert_connector_message(&queued(1, 1)).await,
        Err(StoreError::Closed)
    ));
}
