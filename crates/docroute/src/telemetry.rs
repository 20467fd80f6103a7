//! Logging setup for binaries and integration tests.

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Installs the global subscriber. `RUST_LOG` overrides `default_filter`.
///
/// Returns `false` when a subscriber was already installed; calling twice
/// is harmless.
pub fn init_logging(format: LogFormat, default_filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    let registry = Registry::default().with(filter);
    let installed = match format {
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
    }
    .is_ok();

    if installed {
        // Route `log` records from the pool and persistence layer into tracing.
        let _ = tracing_log::LogTracer::init();
    }

    installed
}
