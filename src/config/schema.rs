//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// The single upstream origin every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Image interception and transform settings.
    pub transform: TransformConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the origin (e.g., "http://127.0.0.1:3000/static").
    pub url: String,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080" or ":8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: ":8080".to_string(),
        }
    }
}

impl ListenerConfig {
    /// Bind address with a bare `:port` expanded to all interfaces.
    pub fn socket_address(&self) -> String {
        if self.bind_address.starts_with(':') {
            format!("0.0.0.0{}", self.bind_address)
        } else {
            self.bind_address.clone()
        }
    }
}

/// Timeout configuration for upstream traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// What to do with a response whose transform failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and return the original upstream bytes.
    #[default]
    Passthrough,
    /// Abort the response with 502 Bad Gateway.
    Fail,
}

/// Image interception and transform configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Maximum transforms running at once.
    pub max_concurrent: usize,

    /// How long a response waits for a transform slot before passing through.
    pub acquire_timeout_ms: u64,

    /// Optional deadline for a single transform. `None` waits indefinitely.
    pub operation_timeout_ms: Option<u64>,

    /// Largest body the interceptor will buffer.
    pub max_body_bytes: usize,

    /// MIME types eligible for interception.
    pub allowed_content_types: Vec<String>,

    /// Operations available for every supported format.
    pub operations: Vec<String>,

    /// Extra operations keyed by image format name (e.g., "jpeg").
    pub format_operations: BTreeMap<String, Vec<String>>,

    /// Gaussian blur sigma.
    pub blur_sigma: f32,

    /// JPEG quality used by the deep-fry re-encode (1-100).
    pub deep_fry_quality: u8,

    /// Behaviour when a transform fails.
    pub failure_policy: FailurePolicy,

    /// Header set to "1" on mutated responses. Empty disables the marker.
    pub marker_header: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        let mut format_operations = BTreeMap::new();
        format_operations.insert("jpeg".to_string(), vec!["deep-fry".to_string()]);

        Self {
            max_concurrent: 4,
            acquire_timeout_ms: 2000,
            operation_timeout_ms: None,
            max_body_bytes: 32 * 1024 * 1024,
            allowed_content_types: ["image/jpeg", "image/jpg", "image/png", "image/webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            operations: ["blur", "flop", "rotate-90", "rotate-180", "rotate-270"]
                .into_iter()
                .map(String::from)
                .collect(),
            format_operations,
            blur_sigma: 2.0,
            deep_fry_quality: 5,
            failure_policy: FailurePolicy::Passthrough,
            marker_header: "x-goofy".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) used when RUST_LOG is unset.
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
