//! Reverse proxy that randomly distorts images on their way back to the client.

pub mod config;
pub mod http;
pub mod imaging;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod transform;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
