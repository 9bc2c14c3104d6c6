//! Transform dispatch.
//!
//! # Design Decisions
//! - Registry is an immutable value built at startup and shared via `Arc`
//! - Per-request format extension builds a local list
//! - Randomness is injected so selection is replayable in tests

pub mod random;
pub mod registry;

pub use random::{RandomSource, SequenceRandom, StdRandom};
pub use registry::{RegistryError, TransformRegistry};
