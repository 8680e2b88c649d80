/// Model input resolution. The exported detector is static-shaped, so this is not configurable.
pub const INPUT_SIZE: (u32, u32) = (640, 640);

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const MAX_DETECTIONS: usize = 1000;
/// Upper bound on candidates entering NMS.
pub const MAX_NMS_CANDIDATES: usize = 30_000;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: MAX_DETECTIONS,
        }
    }
}
