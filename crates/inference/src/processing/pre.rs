use crate::config::INPUT_SIZE;
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbImage;
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;

/// Geometry of the letterbox applied to an image, needed to map boxes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

pub struct PreProcessor {
    pub input_size: (u32, u32),
    letterboxed_buffer: Vec<u8>,
}

impl PreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
        }
    }

    /// Letterbox an RGB image into the model input and return the NCHW tensor.
    pub fn preprocess(&mut self, image: &RgbImage) -> anyhow::Result<(Array<f32, IxDyn>, Letterbox)> {
        let _s = span!("preprocess_image");

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("cannot preprocess an empty image ({}x{})", width, height);
        }

        tracing::trace!(width, height, "Preprocessing image dimensions");

        let (letterbox, resized) = self.resize_and_letterbox(image.as_raw(), width, height)?;
        let input = Self::normalize(&resized)?;

        Ok((input, letterbox))
    }

    fn resize_and_letterbox(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<(Letterbox, Image<'_>)> {
        let _s = span!("resize_and_letterbox");

        let scale =
            (self.input_size.0 as f32 / width as f32).min(self.input_size.1 as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, self.input_size.0);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, self.input_size.1);

        let offset_x = (self.input_size.0 - new_width) / 2;
        let offset_y = (self.input_size.1 - new_height) / 2;

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;

        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = self.input_size.0 * 3;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + (new_width * 3) as usize]
                .copy_from_slice(&resized_data[src_row..src_row + (new_width * 3) as usize]);
        }

        let final_img = Image::from_slice_u8(
            self.input_size.0,
            self.input_size.1,
            &mut self.letterboxed_buffer,
            PixelType::U8x3,
        )?;

        let letterbox = Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        };

        Ok((letterbox, final_img))
    }

    fn normalize(image: &Image) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let width = image.width() as usize;
        let height = image.height() as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];
        let buf = image.buffer();

        for (i, px) in buf.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(
            IxDyn(&[1, 3, height, width]),
            output,
        )?)
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_output_shape_matches_input_size() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let mut preprocessor = PreProcessor::default();

        let (output, _) = preprocessor.preprocess(&img).unwrap();

        assert_eq!(output.shape(), &[1, 3, 640, 640]);
    }

    /// 800x600 scales by 0.8 to 640x480, padded 80px top and bottom
    #[test]
    fn test_letterboxing_preserves_aspect_ratio() {
        let img = RgbImage::from_pixel(800, 600, Rgb([128, 128, 128]));
        let mut preprocessor = PreProcessor::default();

        let (output, letterbox) = preprocessor.preprocess(&img).unwrap();

        assert!((letterbox.scale - 0.8).abs() < 1e-6, "scale was {}", letterbox.scale);
        assert_eq!(letterbox.offset_x, 0.0, "X offset should be 0 for wide image");
        assert_eq!(letterbox.offset_y, 80.0, "Y offset should center vertically");

        let pad = output[[0, 0, 10, 320]];
        assert!(
            (pad - 114.0 / 255.0).abs() < 1e-6,
            "padding rows should hold the letterbox color (got {})",
            pad
        );
        let content = output[[0, 0, 320, 320]];
        assert!((content - 128.0 / 255.0).abs() < 1e-2);
    }

    #[test]
    fn test_channels_are_rgb_planes() {
        let img = RgbImage::from_pixel(640, 640, Rgb([255, 0, 51]));
        let mut preprocessor = PreProcessor::default();

        let (output, letterbox) = preprocessor.preprocess(&img).unwrap();

        assert_eq!(letterbox.scale, 1.0);
        assert!((output[[0, 0, 100, 100]] - 1.0).abs() < 1e-6);
        assert!(output[[0, 1, 100, 100]].abs() < 1e-6);
        assert!((output[[0, 2, 100, 100]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_extreme_aspect_ratio_does_not_collapse() {
        let img = RgbImage::from_pixel(4000, 2, Rgb([10, 10, 10]));
        let mut preprocessor = PreProcessor::default();

        let (output, letterbox) = preprocessor.preprocess(&img).unwrap();

        assert_eq!(output.shape(), &[1, 3, 640, 640]);
        assert!(letterbox.offset_y > 300.0);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let img = RgbImage::new(0, 0);
        let mut preprocessor = PreProcessor::default();

        assert!(preprocessor.preprocess(&img).is_err());
    }
}
