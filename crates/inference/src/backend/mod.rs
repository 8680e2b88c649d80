use ndarray::{Array, IxDyn};
use std::path::Path;

#[cfg(feature = "ort-backend")]
pub mod ort;

pub trait InferenceBackend {
    fn load_model(path: &Path) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run inference on a letterboxed `[1, 3, H, W]` tensor
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;
}

pub struct InferenceOutput {
    pub predictions: ndarray::ArrayD<f32>, // [1, N, 5 + num_classes] cxcywh in input pixels, objectness, class probs
}
