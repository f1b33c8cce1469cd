//! Log setup for the service.
//!
//! `LOG_LEVEL` takes `EnvFilter` directives and falls back to
//! [`DEFAULT_DIRECTIVES`]. `LOG_FORMAT=json` switches to one JSON object per
//! line; anything else gives human-readable output.
//!
//! Events carry their target: `pipeline` for recovery stages and retries,
//! `generator` for model calls, and `codequest_backend` for request handling.
//! Every pipeline run opens a `pipeline_run` span with its own request id,
//! nested under the HTTP span from the `TraceLayer`.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_DIRECTIVES: &str =
    "info,pipeline=debug,generator=debug,codequest_backend=debug,tower_http=info,axum=info";

fn json_requested(value: Option<&str>) -> bool {
    value.map_or(false, |v| v.trim().eq_ignore_ascii_case("json"))
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The two formats are different subscriber types, so each branch inits its own.
    if json_requested(std::env::var("LOG_FORMAT").ok().as_deref()) {
        builder.json().init();
    } else {
        builder.init();
    }
}
