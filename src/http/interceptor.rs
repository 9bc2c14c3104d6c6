//! Response interception.
//!
//! Every upstream response passes through a [`ResponseInterceptor`] before it
//! reaches the client. [`ImageInterceptor`] is the production implementation:
//!
//! ```text
//! Gating ──▶ Limiting ──▶ Buffering ──▶ Selecting ──▶ Committing
//!   │           │             │             │
//!   │           │             ▼             └──────▶ FallingBack
//!   │           │        hard failure (502)
//!   └───────────┴──────────────────────────────────▶ FallingBack
//! ```
//!
//! Before buffering, falling back hands the response on untouched. After
//! buffering, the original bytes are put back exactly as read.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::response::Parts;
use axum::http::{header, HeaderName, HeaderValue, Response, StatusCode, Uri};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use image::ImageFormat;
use thiserror::Error;

use crate::config::schema::{FailurePolicy, TransformConfig};
use crate::http::response::{content_length, content_type_essence};
use crate::imaging::codec::{CodecError, ImageCodec};
use crate::imaging::operations::Distortion;
use crate::observability::metrics;
use crate::resilience::limiter::{ConcurrencyLimiter, TransformPermit};
use crate::transform::random::{RandomSource, StdRandom};
use crate::transform::registry::TransformRegistry;

/// An upstream response in flight, with the context needed to log about it.
#[derive(Debug)]
pub struct InterceptedResponse {
    pub request_uri: Uri,
    pub request_id: String,
    pub response: Response<Body>,
}

/// Why a response was handed on without a new body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// Status other than 200 OK.
    Status,
    /// Content-Type not on the allowlist.
    ContentType,
    /// Declared Content-Length above the buffering limit.
    TooLarge,
    /// No transform slot freed up in time.
    LimiterTimeout,
    /// Body is not an image format the codec can process.
    UnsupportedFormat,
    /// The chosen operation failed and the policy is pass-through.
    TransformFailed,
}

/// What the interceptor did with one response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Transformed {
        distortion: Distortion,
        original_len: usize,
        new_len: usize,
    },
    Passthrough(PassReason),
}

impl Outcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Transformed { .. } => "transformed",
            Outcome::Passthrough(PassReason::Status) => "status",
            Outcome::Passthrough(PassReason::ContentType) => "content_type",
            Outcome::Passthrough(PassReason::TooLarge) => "too_large",
            Outcome::Passthrough(PassReason::LimiterTimeout) => "limiter_timeout",
            Outcome::Passthrough(PassReason::UnsupportedFormat) => "unsupported_format",
            Outcome::Passthrough(PassReason::TransformFailed) => "transform_failed",
        }
    }
}

/// The response to send on, and how it was produced.
#[derive(Debug)]
pub struct Intercepted {
    pub response: Response<Body>,
    pub outcome: Outcome,
}

impl Intercepted {
    fn passthrough(response: Response<Body>, reason: PassReason) -> Self {
        Self {
            response,
            outcome: Outcome::Passthrough(reason),
        }
    }
}

/// Why a transform produced no output.
#[derive(Debug, Error)]
pub enum TransformFailure {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("transform did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("transform task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

/// Failures that abort the response.
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("reading image body for {uri}: {source}")]
    BodyRead {
        uri: String,
        #[source]
        source: axum::Error,
    },
    #[error("transforming image for {uri}: {source}")]
    Transform {
        uri: String,
        #[source]
        source: TransformFailure,
    },
}

/// Hook on the proxy's response path.
pub trait ResponseInterceptor: Send + Sync {
    fn on_response(
        &self,
        response: InterceptedResponse,
    ) -> BoxFuture<'_, Result<Intercepted, InterceptError>>;
}

/// Settings the interceptor reads on every response.
#[derive(Debug, Clone)]
struct Settings {
    allowed_content_types: Vec<String>,
    acquire_timeout: Duration,
    operation_timeout: Option<Duration>,
    max_body_bytes: usize,
    failure_policy: FailurePolicy,
    marker_header: Option<HeaderName>,
}

impl Settings {
    fn from_config(config: &TransformConfig) -> Self {
        Self {
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|ct| ct.trim().to_ascii_lowercase())
                .collect(),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            operation_timeout: config.operation_timeout_ms.map(Duration::from_millis),
            max_body_bytes: config.max_body_bytes,
            failure_policy: config.failure_policy,
            marker_header: HeaderName::from_bytes(config.marker_header.as_bytes()).ok(),
        }
    }
}

/// Replaces image bodies with a randomly distorted copy.
pub struct ImageInterceptor {
    registry: TransformRegistry,
    codec: Arc<dyn ImageCodec>,
    limiter: ConcurrencyLimiter,
    rng: Mutex<Box<dyn RandomSource>>,
    settings: Settings,
}

impl ImageInterceptor {
    /// Create an interceptor with an entropy-seeded random source.
    pub fn new(
        config: &TransformConfig,
        registry: TransformRegistry,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        Self {
            registry,
            codec,
            limiter: ConcurrencyLimiter::new(config.max_concurrent),
            rng: Mutex::new(Box::new(StdRandom::from_entropy())),
            settings: Settings::from_config(config),
        }
    }

    /// Replace the random source.
    pub fn with_random(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    /// Share an existing limiter instead of the one built from config.
    pub fn with_limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    fn allows(&self, content_type: Option<&str>) -> bool {
        content_type.is_some_and(|ct| {
            self.settings
                .allowed_content_types
                .iter()
                .any(|allowed| allowed == ct)
        })
    }

    /// Run one response through the pipeline.
    pub async fn intercept(
        &self,
        intercepted: InterceptedResponse,
    ) -> Result<Intercepted, InterceptError> {
        let InterceptedResponse {
            request_uri,
            request_id,
            response,
        } = intercepted;
        let start = Instant::now();

        // Gating
        if response.status() != StatusCode::OK {
            return Ok(Intercepted::passthrough(response, PassReason::Status));
        }

        let content_type = content_type_essence(response.headers());
        if !self.allows(content_type.as_deref()) {
            tracing::debug!(
                request_id = %request_id,
                uri = %request_uri,
                content_type = content_type.as_deref().unwrap_or(""),
                "Ignoring response content type"
            );
            return Ok(Intercepted::passthrough(response, PassReason::ContentType));
        }

        let declared_len = content_length(response.headers());
        if declared_len.is_some_and(|len| len > self.settings.max_body_bytes) {
            tracing::info!(
                request_id = %request_id,
                uri = %request_uri,
                content_length = declared_len,
                limit = self.settings.max_body_bytes,
                "Image too large to buffer, returning unmodified"
            );
            return Ok(Intercepted::passthrough(response, PassReason::TooLarge));
        }

        // Limiting
        let Some(permit) = self.limiter.acquire(self.settings.acquire_timeout).await else {
            tracing::warn!(
                request_id = %request_id,
                uri = %request_uri,
                timeout = ?self.settings.acquire_timeout,
                "Timeout waiting for transform slot, returning unmodified"
            );
            return Ok(Intercepted::passthrough(response, PassReason::LimiterTimeout));
        };

        // Buffering
        let (mut parts, body) = response.into_parts();
        let buffered = buffer_body(body, self.settings.max_body_bytes)
            .await
            .map_err(|source| InterceptError::BodyRead {
                uri: request_uri.to_string(),
                source,
            })?;
        let original = match buffered {
            Buffered::Complete(bytes) => bytes,
            Buffered::Overflow(body) => {
                tracing::info!(
                    request_id = %request_id,
                    uri = %request_uri,
                    limit = self.settings.max_body_bytes,
                    "Image body exceeded buffering limit, returning unmodified"
                );
                drop(permit);
                return Ok(Intercepted::passthrough(
                    Response::from_parts(parts, body),
                    PassReason::TooLarge,
                ));
            }
        };

        let restore = |parts: Parts, bytes: Bytes, reason: PassReason| {
            Intercepted::passthrough(Response::from_parts(parts, Body::from(bytes)), reason)
        };

        // Selecting
        let format = match self.codec.sniff(&original) {
            Some(format) if self.codec.is_supported(format) => format,
            sniffed => {
                tracing::info!(
                    request_id = %request_id,
                    uri = %request_uri,
                    format = ?sniffed,
                    "Unsupported image format, returning unmodified"
                );
                return Ok(restore(parts, original, PassReason::UnsupportedFormat));
            }
        };

        let distortion = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let op = self.registry.select(format, &mut **rng);
            op.resolve(&mut **rng)
        };
        tracing::debug!(
            request_id = %request_id,
            uri = %request_uri,
            format = ?format,
            operation = %distortion,
            "Applying transform"
        );

        match self.run(permit, distortion, format, original.clone()).await {
            Ok(output) => {
                let new_len = output.len();
                parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(new_len));
                if let Some(marker) = &self.settings.marker_header {
                    parts.headers.insert(marker.clone(), HeaderValue::from_static("1"));
                }

                tracing::info!(
                    request_id = %request_id,
                    path = %request_uri.path(),
                    operation = %distortion,
                    original_len = original.len(),
                    new_len,
                    elapsed = ?start.elapsed(),
                    "Goofified image"
                );

                Ok(Intercepted {
                    response: Response::from_parts(parts, Body::from(output)),
                    outcome: Outcome::Transformed {
                        distortion,
                        original_len: original.len(),
                        new_len,
                    },
                })
            }
            Err(failure) => match self.settings.failure_policy {
                FailurePolicy::Passthrough => {
                    tracing::warn!(
                        request_id = %request_id,
                        uri = %request_uri,
                        operation = %distortion,
                        error = %failure,
                        "Transform failed, returning unmodified"
                    );
                    Ok(restore(parts, original, PassReason::TransformFailed))
                }
                FailurePolicy::Fail => Err(InterceptError::Transform {
                    uri: request_uri.to_string(),
                    source: failure,
                }),
            },
        }
    }

    /// Run the codec on the blocking pool.
    ///
    /// The permit moves into the blocking task, so the slot stays taken until
    /// the codec returns even if the caller stops waiting.
    async fn run(
        &self,
        permit: TransformPermit,
        distortion: Distortion,
        format: ImageFormat,
        input: Bytes,
    ) -> Result<Vec<u8>, TransformFailure> {
        let codec = self.codec.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _in_flight = metrics::InFlight::start();
            let start = Instant::now();
            let result = codec.apply(distortion, format, &input);
            metrics::record_transform(distortion.to_string(), start.elapsed());
            result
        });

        let joined = match self.settings.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| TransformFailure::TimedOut(limit))?,
            None => task.await,
        };
        Ok(joined??)
    }
}

/// A body read up to a size limit.
enum Buffered {
    Complete(Bytes),
    /// The limit was exceeded; replays the chunks already read, then the rest.
    Overflow(Body),
}

/// Read `body` into memory unless it grows past `limit`.
///
/// Only transport errors fail; an oversized body is handed back intact.
async fn buffer_body(body: Body, limit: usize) -> Result<Buffered, axum::Error> {
    let mut stream = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        total += chunk.len();
        chunks.push(chunk);

        if total > limit {
            let read = futures_util::stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            return Ok(Buffered::Overflow(Body::from_stream(read.chain(stream))));
        }
    }

    Ok(Buffered::Complete(match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => Bytes::from(chunks.concat()),
    }))
}

impl ResponseInterceptor for ImageInterceptor {
    fn on_response(
        &self,
        response: InterceptedResponse,
    ) -> BoxFuture<'_, Result<Intercepted, InterceptError>> {
        Box::pin(self.intercept(response))
    }
}
