use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Crates that are chatty at debug level and drown out our own spans.
const QUIET_DEPENDENCIES: &str = "lance=warn,lancedb=warn,lance_index=warn,datafusion=warn,\
     hyper=warn,hyper_util=warn,h2=warn,tonic=warn,tower=warn,reqwest=warn,mongodb=warn,rustls=warn";

/// Install color-eyre with a project-standard configuration.
///
/// Call this early in main() before any fallible operations. Safe to call
/// multiple times.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Default filter directive for an environment when `RUST_LOG` is not set.
pub fn default_filter(environment: &Environment) -> String {
    if environment.is_production() {
        format!("info,{QUIET_DEPENDENCIES}")
    } else {
        format!("debug,{QUIET_DEPENDENCIES}")
    }
}

/// Initialize tracing with environment-aware configuration and error span capture.
///
/// - **Production** (`APP_ENV=production`): flattened JSON events for log
///   aggregation, no module targets.
/// - **Development** (default): pretty, human-readable events.
///
/// Both install `tracing_error::ErrorLayer` so `eyre` reports carry span
/// traces, and both write to stderr so command output on stdout stays clean.
/// `RUST_LOG` overrides the default filter.
///
/// Calling this more than once is a no-op after the first successful call.
pub fn init_tracing(environment: &Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(environment)));

    let result = if environment.is_production() {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
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
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => {
            info!(?environment, "Tracing initialized");
        }
        Err(_) => {
            debug!("Tracing already initialized, skipping re-initialization");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_storage_engines() {
        let dev = default_filter(&Environment::Development);
        let prod = default_filter(&Environment::Production);

        assert!(dev.starts_with("debug,"));
        assert!(prod.starts_with("info,"));
        assert!(dev.contains("lancedb=warn"));
        assert!(EnvFilter::try_new(&dev).is_ok());
        assert!(EnvFilter::try_new(&prod).is_ok());
    }

    #[test]
    fn test_init_tracing_multiple_calls() {
        let env = Environment::Development;
        init_tracing(&env);
        init_tracing(&env);
    }

    #[test]
    fn test_init_tracing_production_with_custom_log_level() {
        temp_env::with_var("RUST_LOG", Some("warn"), || {
            init_tracing(&Environment::Production);
        });
    }
}
