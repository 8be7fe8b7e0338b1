//! Policy layer (normalization, prefilter, scoring, rule packs).
//!
//! Compiles declarative rules into immutable packs once, then evaluates text
//! against them deterministically for the arbitration layer to consume.

pub mod decode;
pub mod engine;
pub mod fuzzy;
pub mod loader;
pub mod normalize;
pub mod pack;
pub mod prefilter;

pub use engine::{Assessment, EvalSettings, PolicyEngine};
pub use loader::{load_pack_from_file, load_pack_from_str};
pub use normalize::normalize;
pub use pack::{PolicyPack, Rule};
