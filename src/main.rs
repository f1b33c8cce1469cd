//! Code Quest · content backend
//!
//! - Axum HTTP API serving stories, coding challenges and answer feedback
//! - Generated by an LLM (CLI command or OpenAI), recovered from malformed
//!   output, normalized, validated, with fallback records when all else fails
//!
//! Important env variables:
//!   PORT                   : u16 (default 5000)
//!   CODEQUEST_CONFIG_PATH  : path to TOML config (prompts, pipeline tuning, fallbacks)
//!   GENERATOR_COMMAND      : generator command line (default "q chat --no-interactive")
//!   GENERATOR_TIMEOUT_SECS : wall-clock limit per generator call (default 30)
//!   OPENAI_API_KEY         : use OpenAI instead of the CLI generator if present
//!   OPENAI_BASE_URL        : default "https://api.openai.com/v1"
//!   OPENAI_MODEL           : default "gpt-4o-mini"
//!   OPENAI_TEMPERATURE     : default 0.7
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod scan;
mod extract;
mod repair;
mod postprocess;
mod validate;
mod prompts;
mod generator;
mod openai;
mod seeds;
mod pipeline;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared, read-only state: config, generator, pipeline, fallbacks.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  // Read port from env or default to 5000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "codequest_backend", %addr, generator = state.pipeline.generator_name(), "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "codequest_backend", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "codequest_backend", "Shutdown signal received");
}
