//! Persistence for destination connectors
//!
//! A destination talks to storage through a [`MessageStore`], which hands out
//! one [`StoreTransaction`] per unit of work. Writes made through a
//! transaction only become visible once committed, and a transaction that is
//! dropped without committing is rolled back.

pub mod backends;
pub mod codec;
pub mod error;
pub mod store;

pub use backends::{CommitStats, MemoryStore};
pub use codec::{BincodeCodec, Codec};
pub use error::{CodecError, Result, StoreError};
pub use store::{MessageStore, QueueDataSource, StoreTransaction, TransactionGuard};
