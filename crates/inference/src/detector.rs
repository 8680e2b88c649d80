use crate::{
    backend::{InferenceBackend, InferenceOutput},
    config::DetectorConfig,
    processing::{
        post::{PostProcessor, TransformParams},
        pre::PreProcessor,
    },
};
use image::RgbImage;
use std::sync::{Arc, Mutex};

/// A detected box in original image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

/// Anything that turns an RGB image into detections.
///
/// Implementations must be shareable across request handlers; the handle is
/// built once at startup and never mutated afterwards.
pub trait Detector: Send + Sync {
    fn detect(
        &self,
        image: &RgbImage,
        confidence_threshold: Option<f32>,
    ) -> anyhow::Result<Vec<Detection>>;
}

pub type SharedDetector = Arc<dyn Detector>;

struct Pipeline<B> {
    backend: B,
    preprocessor: PreProcessor,
}

/// YOLOv5 detector: letterbox, run the backend, decode and suppress.
pub struct YoloDetector<B: InferenceBackend> {
    pipeline: Mutex<Pipeline<B>>,
    postprocessor: PostProcessor,
}

impl<B: InferenceBackend> YoloDetector<B> {
    pub fn new(backend: B, config: DetectorConfig) -> Self {
        let postprocessor = PostProcessor::new(&config);
        Self {
            pipeline: Mutex::new(Pipeline {
                backend,
                preprocessor: PreProcessor::default(),
            }),
            postprocessor,
        }
    }
}

impl<B: InferenceBackend + Send> Detector for YoloDetector<B> {
    fn detect(
        &self,
        image: &RgbImage,
        confidence_threshold: Option<f32>,
    ) -> anyhow::Result<Vec<Detection>> {
        let (width, height) = image.dimensions();

        let (InferenceOutput { predictions }, letterbox) = {
            let mut pipeline = self
                .pipeline
                .lock()
                .map_err(|_| anyhow::anyhow!("detector lock poisoned"))?;
            let Pipeline {
                backend,
                preprocessor,
            } = &mut *pipeline;

            let (input, letterbox) = preprocessor.preprocess(image)?;
            let output = {
                let _infer_span = tracing::info_span!("model_inference").entered();
                backend.infer(&input)?
            };
            (output, letterbox)
        };

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            letterbox,
        };

        self.postprocessor
            .parse_detections(&predictions.view(), &transform, confidence_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::{Array, IxDyn};
    use std::path::Path;

    /// Returns a fixed prediction tensor regardless of input.
    struct FixedBackend {
        rows: Vec<[f32; 6]>,
        calls: usize,
    }

    impl InferenceBackend for FixedBackend {
        fn load_model(_path: &Path) -> anyhow::Result<Self> {
            Ok(Self {
                rows: Vec::new(),
                calls: 0,
            })
        }

        fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
            assert_eq!(images.shape(), &[1, 3, 640, 640]);
            self.calls += 1;
            let data = self.rows.iter().flatten().copied().collect();
            Ok(InferenceOutput {
                predictions: Array::from_shape_vec(IxDyn(&[1, self.rows.len(), 6]), data)?,
            })
        }
    }

    #[test]
    fn test_detect_maps_boxes_to_original_image() {
        // 1280x960 letterboxes at scale 0.5 with 80px vertical padding
        let backend = FixedBackend {
            rows: vec![[320.0, 320.0, 100.0, 100.0, 0.9, 0.9]],
            calls: 0,
        };
        let detector = YoloDetector::new(backend, DetectorConfig::default());
        let image = RgbImage::from_pixel(1280, 960, Rgb([0, 0, 0]));

        let detections = detector.detect(&image, None).unwrap();

        assert_eq!(detections.len(), 1);
        let d = detections[0];
        assert!((d.x1 - 540.0).abs() < 1e-3, "x1 = {}", d.x1);
        assert!((d.y1 - 380.0).abs() < 1e-3, "y1 = {}", d.y1);
        assert!((d.x2 - 740.0).abs() < 1e-3, "x2 = {}", d.x2);
        assert!((d.y2 - 580.0).abs() < 1e-3, "y2 = {}", d.y2);
    }

    #[test]
    fn test_detect_with_no_predictions() {
        let backend = FixedBackend::load_model(Path::new("unused")).unwrap();
        let detector = YoloDetector::new(backend, DetectorConfig::default());
        let image = RgbImage::from_pixel(32, 32, Rgb([200, 10, 10]));

        assert!(detector.detect(&image, None).unwrap().is_empty());
    }

    #[test]
    fn test_detector_is_shareable() {
        let backend = FixedBackend::load_model(Path::new("unused")).unwrap();
        let shared: SharedDetector = Arc::new(YoloDetector::new(backend, DetectorConfig::default()));
        let image = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let detector = shared.clone();
                let image = image.clone();
                std::thread::spawn(move || detector.detect(&image, Some(0.5)).map(|d| d.len()))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 0);
        }
    }
}
