use crate::{annotate::annotate_upload, config::Config, error::ApiError, state::AppState};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartRejection,
    },
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub const STATUS_MESSAGE: &str = "YOLO Vein Detection Backend is running.";
const FILE_FIELD: &str = "file";
const CONFIDENCE_FIELD: &str = "conf";
const MIN_CONFIDENCE: f32 = 0.001;

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

struct Upload {
    bytes: Bytes,
    confidence: Option<f32>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn root() -> Json<StatusMessage> {
    Json(StatusMessage {
        message: STATUS_MESSAGE.to_string(),
    })
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let detector = state.detector.clone().ok_or(ApiError::ModelNotLoaded)?;

    let Upload { bytes, confidence } = read_upload(multipart?).await?;

    tracing::info!(bytes = bytes.len(), confidence = ?confidence, "Running prediction");

    let renderer = state.renderer.clone();
    let jpeg = tokio::task::spawn_blocking(move || {
        annotate_upload(detector.as_ref(), &renderer, &bytes, confidence)
    })
    .await??;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut bytes = None;
    let mut confidence = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(FILE_FIELD) => bytes = Some(field.bytes().await?),
            Some(CONFIDENCE_FIELD) => confidence = parse_confidence(&field.text().await?),
            _ => {}
        }
    }

    Ok(Upload {
        bytes: bytes.ok_or(ApiError::MissingFile)?,
        confidence,
    })
}

/// Optional per-request threshold; unparsable values fall back to the detector default.
fn parse_confidence(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(MIN_CONFIDENCE, 1.0))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
