use crate::error::ApiError;
use image::{ImageFormat, RgbImage};
use inference::{Detector, Renderer};
use std::io::Cursor;

/// Decode an uploaded image, run the detector, draw its boxes and re-encode as JPEG.
pub fn annotate_upload(
    detector: &dyn Detector,
    renderer: &Renderer,
    bytes: &[u8],
    confidence_threshold: Option<f32>,
) -> Result<Vec<u8>, ApiError> {
    let mut image = image::load_from_memory(bytes)?.to_rgb8();

    let detections = detector
        .detect(&image, confidence_threshold)
        .map_err(ApiError::Inference)?;

    tracing::debug!(
        width = image.width(),
        height = image.height(),
        detections = detections.len(),
        "Image annotated"
    );

    renderer.draw(&mut image, &detections);

    encode_jpeg(&image).map_err(ApiError::Encode)
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut jpeg_bytes = Cursor::new(Vec::new());
    image.write_to(&mut jpeg_bytes, ImageFormat::Jpeg)?;

    Ok(jpeg_bytes.into_inner())
}
