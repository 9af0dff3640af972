//! Destination connector core for courier
//!
//! Delivers the messages of one channel destination: sending them right away
//! or through a persisted queue, retrying failures, running an optional
//! response transformer, and cleaning up content once a message is complete.
//!
//! # Example
//!
//! ```ignore
//! let connector = DestinationConnector::builder(config, sender, store)
//!     .transformer(|response: &mut Response| {
//!         response.status = Status::Sent;
//!         Ok::<_, TransformError>(())
//!     })
//!     .build();
//!
//! connector.start().await?;
//!
//! let mut tx = TransactionGuard::begin(store.as_ref()).await?;
//! connector.process(&mut *tx, &mut message, Status::Received).await?;
//! tx.commit(true).await?;
//! connector.enqueue(message).await;
//! ```

pub mod completion;
pub mod config;
pub mod connector;
pub mod error;
pub mod policy;
pub mod queue;
pub mod sender;
pub mod transformer;

pub use completion::{CompletionOracle, TerminalStatusOracle};
pub use config::DestinationConfig;
pub use connector::{DestinationConnector, DestinationConnectorBuilder};
pub use error::{ConnectorError, TransformError};
pub use policy::{RetryPolicy, normalize_status};
pub use queue::ConnectorMessageQueue;
pub use sender::Sender;
pub use transformer::ResponseTransformer;
