use crate::detector::Detection;
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};

/// Ultralytics class palette, indexed by `class_id % 20`.
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_PADDING: i32 = 2;
const MIN_FONT_SIZE: f32 = 12.0;
const MIN_LINE_WIDTH: u32 = 2;

/// Draws detection boxes, each with a `"<class> <confidence>"` label, onto the
/// image they were detected in.
#[derive(Debug, Default, Clone)]
pub struct Renderer {
    /// Fixed line width; scaled to the image size when unset.
    pub line_width: Option<u32>,
    /// Label text per class id. Classes without a name are labelled by id.
    pub class_names: Vec<String>,
}

struct LabelBox {
    x: i32,
    y: i32,
    color: Rgb<u8>,
    text: String,
}

impl Renderer {
    pub fn color_for(class_id: u32) -> Rgb<u8> {
        Rgb(PALETTE[class_id as usize % PALETTE.len()])
    }

    fn line_width_for(&self, image: &RgbImage) -> u32 {
        self.line_width.unwrap_or_else(|| {
            let (w, h) = image.dimensions();
            (((w + h) as f32 / 2.0 * 0.003).round() as u32).max(MIN_LINE_WIDTH)
        })
    }

    fn font_size_for(image: &RgbImage) -> f32 {
        let (w, h) = image.dimensions();
        ((w + h) as f32 / 2.0 * 0.035).round().max(MIN_FONT_SIZE)
    }

    pub fn label_for(&self, detection: &Detection) -> String {
        let class = match self.class_names.get(detection.class_id as usize) {
            Some(name) => name.clone(),
            None => detection.class_id.to_string(),
        };
        format!("{class} {:.2}", detection.confidence)
    }

    pub fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        let thickness = self.line_width_for(image) as i32;
        let mut labels = Vec::with_capacity(detections.len());

        for det in detections {
            let x_min = (det.x1.floor() as i32).clamp(0, w as i32 - 1);
            let y_min = (det.y1.floor() as i32).clamp(0, h as i32 - 1);
            let x_max = (det.x2.ceil() as i32).clamp(0, w as i32 - 1);
            let y_max = (det.y2.ceil() as i32).clamp(0, h as i32 - 1);

            if x_min >= x_max || y_min >= y_max {
                continue;
            }

            let color = Self::color_for(det.class_id);

            for t in 0..thickness {
                let (left, top) = (x_min + t, y_min + t);
                let (right, bottom) = (x_max - t, y_max - t);
                if left > right || top > bottom {
                    break;
                }
                let rect = Rect::at(left, top)
                    .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
                draw_hollow_rect_mut(image, rect, color);
            }

            labels.push(LabelBox {
                x: x_min,
                y: y_min,
                color,
                text: self.label_for(det),
            });
        }

        // Labels go on top of every box so a later box never hides an earlier label.
        if !labels.is_empty() {
            match FontRef::try_from_slice(FONT_DATA) {
                Ok(font) => {
                    let scale = PxScale::from(Self::font_size_for(image));
                    for label in &labels {
                        draw_label(image, &font, scale, label);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Embedded label font is invalid, drawing boxes only"),
            }
        }

        tracing::trace!(count = detections.len(), "Rendered detections");
    }
}

/// Filled band in the class colour with white text. The band sits above the
/// box, or inside its top edge when there is no room, and is clipped to the image.
fn draw_label(image: &mut RgbImage, font: &FontRef, scale: PxScale, label: &LabelBox) {
    let (w, h) = image.dimensions();
    let (text_w, text_h) = text_size(scale, font, &label.text);
    let band_w = text_w as i32 + 2 * LABEL_PADDING;
    let band_h = text_h as i32 + 2 * LABEL_PADDING;

    let y = if label.y - band_h >= 0 {
        label.y - band_h
    } else {
        label.y
    };
    let x = label.x.min(w as i32 - 1);

    let visible_w = band_w.min(w as i32 - x);
    let visible_h = band_h.min(h as i32 - y);
    if visible_w <= 0 || visible_h <= 0 {
        return;
    }

    draw_filled_rect_mut(
        image,
        Rect::at(x, y).of_size(visible_w as u32, visible_h as u32),
        label.color,
    );
    draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        x + LABEL_PADDING,
        y + LABEL_PADDING,
        scale,
        font,
        &label.text,
    );
}
