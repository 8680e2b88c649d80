pub mod backend;
pub mod config;
pub mod detector;
pub mod loader;
pub mod processing;
pub mod render;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, InferenceOutput};
pub use config::{DetectorConfig, INPUT_SIZE};
pub use detector::{Detection, Detector, SharedDetector, YoloDetector};
pub use render::Renderer;
