//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Image response eligible for transform:
//!     → limiter.rs (timed acquire of a transform slot)
//!     → granted: transform runs while the permit is held
//!     → timed out: response passes through untouched
//! ```
//!
//! # Design Decisions
//! - Degrade to pass-through under load rather than queue without bound
//! - Only the slot acquisition is time-bounded by default
//! - Nothing is retried

pub mod limiter;

pub use limiter::{ConcurrencyLimiter, TransformPermit};
