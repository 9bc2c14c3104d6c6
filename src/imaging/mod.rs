//! Image codec subsystem.
//!
//! # Data Flow
//! ```text
//! buffered body bytes
//!     → codec.rs (sniff format, support check)
//!     → operations.rs (registered op resolved to a concrete Distortion)
//!     → rust_backend.rs (decode, distort, re-encode)
//!     → new body bytes
//! ```
//!
//! # Design Decisions
//! - Codec sits behind a trait so the interceptor can be tested without pixels
//! - Output is always re-encoded in the sniffed input format
//! - Pure Rust decoders only; nothing links against a C image library

pub mod codec;
pub mod operations;
pub mod rust_backend;

pub use codec::{CodecError, ImageCodec, format_from_name};
pub use operations::{Angle, Distortion, OperationParams, Rotation, TransformOp};
pub use rust_backend::RustCodec;
