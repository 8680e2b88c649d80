use crate::{
    backend::InferenceBackend,
    config::DetectorConfig,
    detector::{SharedDetector, YoloDetector},
};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MODEL_DIR: &str = "model";
pub const MODEL_FILE: &str = "best.onnx";

/// `<directory of the running executable>/model/best.onnx`
pub fn default_model_path() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot resolve the service executable path")?;
    let dir = exe
        .parent()
        .context("service executable has no parent directory")?;
    Ok(dir.join(MODEL_DIR).join(MODEL_FILE))
}

/// Load the detector once. Failure is logged and yields `None`; the caller keeps
/// running without a model.
pub fn load_detector_with<B>(path: &Path) -> Option<SharedDetector>
where
    B: InferenceBackend + Send + 'static,
{
    tracing::info!(model_path = %path.display(), "Loading detector");

    match B::load_model(path) {
        Ok(backend) => {
            tracing::info!("Detector loaded successfully");
            Some(Arc::new(YoloDetector::new(backend, DetectorConfig::default())))
        }
        Err(e) => {
            tracing::error!(
                error = ?e,
                model_path = %path.display(),
                "Model loading failed; inference requests will be rejected"
            );
            None
        }
    }
}

#[cfg(feature = "ort-backend")]
pub fn load_detector(path: &Path) -> Option<SharedDetector> {
    load_detector_with::<crate::backend::ort::OrtBackend>(path)
}
