//! Policy abstractions for delivery operations.
//!
//! - [`RetryPolicy`]: how often a send is retried, and how long to wait
//! - [`normalize_status`]: which statuses a destination may finish with

pub mod retry;
pub mod status;

pub use retry::RetryPolicy;
pub use status::normalize_status;
