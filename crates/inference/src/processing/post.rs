use crate::config::{DetectorConfig, MAX_NMS_CANDIDATES};
use crate::detector::Detection;
use crate::processing::pre::Letterbox;

/// Everything needed to map a box from model input space back to the original image.
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub letterbox: Letterbox,
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

/// Candidate box in model input coordinates (xyxy).
#[derive(Debug, Clone, Copy)]
struct Candidate {
    bbox: [f32; 4],
    confidence: f32,
    class_id: u32,
}

impl PostProcessor {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }

    /// Decode YOLOv5 predictions, run class-aware NMS and map the survivors back
    /// to original image pixels.
    ///
    /// `predictions` is `[1, N, 5 + num_classes]`: cx, cy, w, h (input pixels),
    /// objectness, then per-class probabilities. `threshold` overrides the
    /// configured confidence threshold for this call.
    #[tracing::instrument(skip(self, predictions, transform))]
    pub fn parse_detections(
        &self,
        predictions: &ndarray::ArrayViewD<f32>,
        transform: &TransformParams,
        threshold: Option<f32>,
    ) -> anyhow::Result<Vec<Detection>> {
        let shape = predictions.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[2] < 6 {
            anyhow::bail!(
                "unexpected prediction shape {:?}, expected [1, N, 5 + num_classes]",
                shape
            );
        }

        let conf_threshold = threshold.unwrap_or(self.confidence_threshold);
        let num_rows = shape[1];
        let num_fields = shape[2];

        let mut candidates = Vec::new();

        for i in 0..num_rows {
            let objectness = predictions[[0, i, 4]];
            if !objectness.is_finite() || objectness <= conf_threshold {
                continue;
            }

            let mut best_prob = f32::NEG_INFINITY;
            let mut class_idx = 0usize;
            for c in 5..num_fields {
                let prob = predictions[[0, i, c]];
                if prob > best_prob {
                    best_prob = prob;
                    class_idx = c - 5;
                }
            }

            let confidence = objectness * best_prob;
            if !confidence.is_finite() || confidence <= conf_threshold {
                continue;
            }

            let cx = predictions[[0, i, 0]];
            let cy = predictions[[0, i, 1]];
            let w = predictions[[0, i, 2]];
            let h = predictions[[0, i, 3]];

            if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
                continue;
            }

            candidates.push(Candidate {
                bbox: cxcywh_to_xyxy(cx, cy, w, h),
                confidence,
                class_id: class_idx as u32,
            });
        }

        let before_nms = candidates.len();
        candidates.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));
        if candidates.len() > MAX_NMS_CANDIDATES {
            tracing::warn!(
                candidates = candidates.len(),
                limit = MAX_NMS_CANDIDATES,
                "NMS input truncated"
            );
            candidates.truncate(MAX_NMS_CANDIDATES);
        }

        let mut kept = nms(candidates, self.iou_threshold);
        kept.truncate(self.max_detections);

        tracing::debug!(before_nms, after_nms = kept.len(), "Decoded detections");

        Ok(kept
            .into_iter()
            .map(|c| to_original(&c, transform))
            .collect())
    }
}

/// Greedy per-class suppression over candidates sorted by confidence.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    let mut result = Vec::new();

    while !candidates.is_empty() {
        let best = candidates.remove(0);

        candidates.retain(|c| c.class_id != best.class_id || iou(&best.bbox, &c.bbox) <= iou_threshold);
        result.push(best);
    }

    result
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn to_original(candidate: &Candidate, transform: &TransformParams) -> Detection {
    let Letterbox {
        scale,
        offset_x,
        offset_y,
    } = transform.letterbox;
    let max_x = transform.orig_width as f32;
    let max_y = transform.orig_height as f32;

    Detection {
        x1: ((candidate.bbox[0] - offset_x) / scale).clamp(0.0, max_x),
        y1: ((candidate.bbox[1] - offset_y) / scale).clamp(0.0, max_y),
        x2: ((candidate.bbox[2] - offset_x) / scale).clamp(0.0, max_x),
        y2: ((candidate.bbox[3] - offset_y) / scale).clamp(0.0, max_y),
        confidence: candidate.confidence,
        class_id: candidate.class_id,
    }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}
