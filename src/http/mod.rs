//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (Axum setup, catch-all proxy handler)
//!     → request.rs (request id, URI rewrite onto the upstream, Host)
//!     → headers.rs (drop hop-by-hop headers)
//!     → upstream origin
//!     → interceptor.rs (gate, buffer, distort or pass through)
//!     → response.rs (content-type/length helpers, 502 responses)
//!     → Send to client
//! ```

pub mod headers;
pub mod interceptor;
pub mod request;
pub mod response;
pub mod server;

pub use interceptor::{
    ImageInterceptor, InterceptError, Intercepted, InterceptedResponse, Outcome, PassReason,
    ResponseInterceptor,
};
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
