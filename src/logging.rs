//! # Structured Logging Module
//!
//! Environment-aware structured logging for the engine and its collaborators.

use crate::config::EngineConfig;
use crate::constants::env;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific defaults.
pub fn init_structured_logging() {
    init_with_config(&EngineConfig {
        environment: get_environment(),
        ..EngineConfig::default()
    });
}

/// Initialize logging from loaded configuration. Only the first call has any effect.
pub fn init_with_config(config: &EngineConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = resolve_filter(config, std::env::var(env::LOG_FILTER).ok());

        let console = if config.json_logs {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %config.environment,
            filter = %filter,
            json = config.json_logs,
            "Structured logging initialized"
        );
    });
}

/// `RUST_LOG` wins, then the configured filter, then the environment default.
fn resolve_filter(config: &EngineConfig, from_env: Option<String>) -> String {
    from_env
        .or_else(|| config.log_filter.clone())
        .unwrap_or_else(|| get_log_level(&config.environment).to_string())
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(env::ENVIRONMENT)
        .or_else(|_| std::env::var(env::APP_ENVIRONMENT))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}
