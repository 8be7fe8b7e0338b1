//! Per-request context carried through an arbitration.

pub mod request;

pub use request::RequestCtx;
