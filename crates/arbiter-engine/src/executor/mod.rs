//! Bounded execution of producers: per-attempt deadlines, classified retries,
//! cooperative cancellation and a constant-time release envelope.

pub mod bounded;

pub use bounded::{BoundedExecutor, RetryPolicy, MAX_RETRIES_CAP};
