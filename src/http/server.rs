//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing)
//! - Forward every request to the upstream origin, bounded by the request timeout
//! - Hand every upstream response to the registered interceptor

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::validation::{parse_upstream, ValidationError};
use crate::config::ProxyConfig;
use crate::http::headers::strip_hop_by_hop;
use crate::http::interceptor::{ImageInterceptor, InterceptedResponse, ResponseInterceptor};
use crate::http::request::{request_id, to_upstream};
use crate::http::response::bad_gateway;
use crate::imaging::RustCodec;
use crate::observability::metrics;
use crate::transform::registry::{RegistryError, TransformRegistry};

/// Errors building the server from configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Upstream(#[from] ValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<Url>,
    pub client: Client<HttpConnector, Body>,
    pub interceptor: Arc<dyn ResponseInterceptor>,
    /// Deadline for the upstream exchange up to response headers.
    pub upstream_timeout: Duration,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server with the image interceptor described by `config`.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let registry = TransformRegistry::from_config(&config.transform)?;
        let interceptor = ImageInterceptor::new(&config.transform, registry, Arc::new(RustCodec::new()));

        tracing::info!(
            operations = ?config.transform.operations,
            max_concurrent = config.transform.max_concurrent,
            failure_policy = ?config.transform.failure_policy,
            "Image interceptor ready"
        );

        Self::with_interceptor(config, Arc::new(interceptor))
    }

    /// Create a server with a caller-supplied interceptor.
    pub fn with_interceptor(
        config: ProxyConfig,
        interceptor: Arc<dyn ResponseInterceptor>,
    ) -> Result<Self, ServerError> {
        let upstream = Arc::new(parse_upstream(&config.upstream.url)?);

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            upstream,
            client,
            interceptor,
            upstream_timeout: Duration::from_secs(config.timeouts.request_secs),
        };

        let router = Self::build_router(state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// No router-wide timeout; the request deadline covers only the upstream exchange.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forward the request upstream and run the response through the interceptor.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id(&request);
    let request_uri = request.uri().clone();

    tracing::debug!(
        request_id = %request_id,
        method = %request.method(),
        uri = %request_uri,
        "Proxying request"
    );

    let upstream_request = match to_upstream(request, &state.upstream) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Could not build upstream request");
            metrics::record_upstream_error();
            return bad_gateway("Invalid upstream request");
        }
    };

    let exchange = tokio::time::timeout(state.upstream_timeout, state.client.request(upstream_request));
    let upstream_response: Response<Incoming> = match exchange.await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_upstream_error();
            return bad_gateway("Upstream request failed");
        }
        Err(_) => {
            tracing::error!(
                request_id = %request_id,
                timeout = ?state.upstream_timeout,
                "Upstream did not respond in time"
            );
            metrics::record_upstream_error();
            return bad_gateway("Upstream request timed out");
        }
    };

    let (mut parts, body) = upstream_response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    let response = Response::from_parts(parts, Body::new(body));

    let intercepted = InterceptedResponse {
        request_uri,
        request_id: request_id.clone(),
        response,
    };

    match state.interceptor.on_response(intercepted).await {
        Ok(done) => {
            metrics::record_outcome(done.outcome.label());
            done.response
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Response interception failed");
            metrics::record_outcome("failed");
            bad_gateway("Upstream response could not be processed")
        }
    }
}
