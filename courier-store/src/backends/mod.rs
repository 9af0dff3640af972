mod memory;

pub use memory::{CommitStats, MemoryStore};
