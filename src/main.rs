//! goofy-proxy
//!
//! A reverse proxy that forwards every request to one upstream origin and
//! replaces image responses with a randomly distorted copy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request       ┌──────────────────────────────────────────────┐
//!     ─────────────────────┼─▶ http server ──▶ request rewrite ──────────┼──▶ Upstream
//!                          │                                              │
//!     Client Response      │   ┌──────────────── interceptor ──────────┐  │
//!     ◀────────────────────┼───│ gate → limiter → buffer → sniff →     │◀─┼──── Upstream
//!                          │   │ registry pick → codec (blocking pool) │  │     Response
//!                          │   └───────────────────────────────────────┘  │
//!                          │                                              │
//!                          │   config · observability · lifecycle         │
//!                          └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use goofy_proxy::config::load_config;
use goofy_proxy::lifecycle::startup;
use goofy_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "goofy-proxy")]
#[command(about = "Reverse proxy that randomly distorts images", long_about = None)]
struct Cli {
    /// Optional TOML config file; UPSTREAM_URL and LISTEN_ADDR override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            tracing::error!(error = %e, "Configuration error");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %config.upstream.url,
        listen = %config.listener.socket_address(),
        "goofy-proxy starting"
    );

    if let Err(e) = startup::run(config).await {
        tracing::error!(error = %e, "Fatal error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
