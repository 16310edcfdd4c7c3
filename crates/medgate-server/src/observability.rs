//! Tracing setup.
//!
//! The subscriber is installed once at start-up with a default level, before
//! configuration is read. Once the config is loaded its `logging.level`
//! replaces the filter in place, unless `RUST_LOG` was given.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

const DEFAULT_LEVEL: &str = "info";

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

fn initial_filter(level: &str) -> EnvFilter {
    if rust_log_set() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    EnvFilter::new(level)
}

pub fn init_tracing() {
    init_tracing_with_level(DEFAULT_LEVEL);
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing_with_level(level: &str) {
    let (filter, handle) = reload::Layer::new(initial_filter(level));
    if FILTER.set(handle).is_err() {
        return;
    }

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
    if installed.is_err() {
        eprintln!("tracing subscriber already installed; keeping the existing one");
    }
}

pub fn apply_logging_level(level: &str) {
    if rust_log_set() {
        return;
    }
    let Some(handle) = FILTER.get() else {
        return;
    };
    if let Err(e) = handle.reload(EnvFilter::new(level)) {
        tracing::warn!(error = %e, level, "Failed to apply logging level");
    } else {
        tracing::debug!(level, "Logging level applied");
    }
}

pub fn apply_logging_config(cfg: &LoggingConfig) {
    apply_logging_level(&cfg.level);
}
