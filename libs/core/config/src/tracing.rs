use crate::Environment;
use tracing::debug;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Default filter when `RUST_LOG` is unset.
const DEVELOPMENT_FILTER: &str = "info,grpc_bootstrap=debug,h2=warn,hyper=warn";
const PRODUCTION_FILTER: &str = "info,h2=warn,hyper=warn,rustls=warn";

/// Install color-eyre for host binaries.
///
/// Shows the location section and hides environment variables. Safe to call
/// more than once.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize the process-wide tracing subscriber.
///
/// - **Production**: flattened JSON events, no targets.
/// - **Development**: pretty output with targets, so `grpc_bootstrap` call logs
///   are easy to tell apart from transport noise.
///
/// Both install `tracing_error::ErrorLayer` so span traces are available to
/// error reports. `RUST_LOG` overrides the default filter.
///
/// Returns `false` when a subscriber was already installed (common in tests).
pub fn init_tracing(environment: &Environment) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if environment.is_production() {
            EnvFilter::new(PRODUCTION_FILTER)
        } else {
            EnvFilter::new(DEVELOPMENT_FILTER)
        }
    });

    let result = if environment.is_production() {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(()) => {
            debug!(environment = ?environment, "tracing initialized");
            true
        }
        Err(_) => false,
    }
}
