//! Console logging for the demo and import binaries.
//!
//! `RUST_LOG` controls the filter (default `info`). The wgpu crates are capped at
//! `warn` unless `RUST_LOG` names them explicitly.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

pub fn init() {
    init_with_level(None);
}

/// `level` overrides `RUST_LOG` when provided (e.g. `"debug"`).
pub fn init_with_level(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
