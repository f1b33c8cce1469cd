//! Application state: loaded configuration and the content pipeline.
//!
//! This module owns:
//!   - the immutable `AppConfig` (from TOML or defaults)
//!   - the generator selection (OpenAI when configured, else the CLI command)
//!   - the `Pipeline` with its fallback table
//!
//! Nothing here is mutated after startup, so handlers share it behind `Arc`
//! without locks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::config::{load_config_from_env, AppConfig};
use crate::generator::{CliGenerator, Generator};
use crate::openai::OpenAiGenerator;
use crate::pipeline::Pipeline;
use crate::seeds::FallbackTable;

pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Pipeline,
}

impl AppState {
    /// Build state from env: load config, pick a generator, validate fallbacks.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env();

        let timeout = Duration::from_secs(config.generator.timeout_secs.max(1));
        let generator: Arc<dyn Generator> = match OpenAiGenerator::from_env(&config.prompts.system, timeout) {
            Some(oa) => {
                info!(target: "codequest_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI generator enabled.");
                Arc::new(oa)
            }
            None => {
                let cli = CliGenerator::from_settings(&config.generator);
                info!(target: "codequest_backend", command = %cli.command, args = ?cli.args, timeout = ?cli.timeout, "Using CLI generator (no OPENAI_API_KEY).");
                Arc::new(cli)
            }
        };

        Self::with_generator(config, generator)
    }

    /// State around an explicit generator. Used by `new` and by tests.
    pub fn with_generator(config: AppConfig, generator: Arc<dyn Generator>) -> Self {
        let fallbacks = FallbackTable::with_config(&config.fallbacks, &config.pipeline);
        let pipeline = Pipeline::new(
            generator,
            config.pipeline.clone(),
            config.prompts.clone(),
            fallbacks,
        );
        Self { config, pipeline }
    }
}
