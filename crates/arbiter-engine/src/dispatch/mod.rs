//! Producer trait and registry.
//!
//! Producers are registered under a name so callers can arbitrate by name
//! instead of holding trait objects themselves.

pub mod registry;

pub use registry::{producer_fn, FnProducer, Producer, ProducerRegistry};
