use crate::config::Environment;
use opentelemetry::global::{self, BoxedTracer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: `RUST_LOG` (or `default_level`) filtering,
/// pretty output in development and JSON in production.
///
/// Spans are also bridged to the global OpenTelemetry tracer, which is a no-op
/// until a [`crate::TelemetryGuard`] installs a real provider.
pub fn setup_logging(default_level: &str, environment: Environment) {
    install_subscriber(
        default_level,
        environment,
        global::tracer(env!("CARGO_PKG_NAME")),
    );
}

pub(crate) fn install_subscriber(default_level: &str, environment: Environment, tracer: BoxedTracer) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
