use common::TelemetryGuard;
use gateway::{
    AppState, config::get_configuration, logging::setup_logging, run_server,
};
use inference::loader::{default_model_path, load_detector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "gateway",
            endpoint,
            config.log_level.as_str(),
            config.environment,
        )?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    let detector = match default_model_path() {
        Ok(path) => load_detector(&path),
        Err(e) => {
            tracing::error!(error = ?e, "Cannot locate model weights");
            None
        }
    };

    let state = AppState::new(detector).with_class_names(config.class_names.clone());
    run_server(&config, state).await
}
