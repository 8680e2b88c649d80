use common::span;
use image::{DynamicImage, GrayImage, Luma, RgbImage};

const HIST_SIZE: usize = 256;

pub const DEFAULT_CLIP_LIMIT: f32 = 2.0;
pub const DEFAULT_TILE_GRID: (u32, u32) = (8, 8);

/// Contrast Limited Adaptive Histogram Equalization on 8-bit grayscale.
///
/// Follows OpenCV's `createCLAHE(...).apply` for `CV_8UC1`:
/// the image is padded (reflect-101, right and bottom) to a multiple of the
/// tile grid, every tile gets a clipped histogram turned into a lookup table,
/// and each output pixel is a bilinear blend of the four nearest tile tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clahe {
    pub clip_limit: f32,
    pub tile_grid: (u32, u32),
}

impl Default for Clahe {
    fn default() -> Self {
        Self {
            clip_limit: DEFAULT_CLIP_LIMIT,
            tile_grid: DEFAULT_TILE_GRID,
        }
    }
}

struct TileLayout {
    tiles_x: usize,
    tiles_y: usize,
    tile_w: usize,
    tile_h: usize,
}

impl TileLayout {
    fn new(width: usize, height: usize, grid: (u32, u32)) -> Self {
        let tiles_x = grid.0.max(1) as usize;
        let tiles_y = grid.1.max(1) as usize;
        let padded_w = round_up(width, tiles_x);
        let padded_h = round_up(height, tiles_y);
        Self {
            tiles_x,
            tiles_y,
            tile_w: padded_w / tiles_x,
            tile_h: padded_h / tiles_y,
        }
    }

    fn area(&self) -> usize {
        self.tile_w * self.tile_h
    }
}

impl Clahe {
    pub fn new(clip_limit: f32, tile_grid: (u32, u32)) -> Self {
        Self {
            clip_limit,
            tile_grid,
        }
    }

    pub fn apply(&self, src: &GrayImage) -> GrayImage {
        let _s = span!("clahe_apply");

        let (width, height) = src.dimensions();
        if width == 0 || height == 0 {
            return src.clone();
        }

        let layout = TileLayout::new(width as usize, height as usize, self.tile_grid);
        let luts = self.tile_luts(src, &layout);

        interpolate(src, &layout, &luts)
    }

    /// Absolute per-bin clip, as OpenCV computes it. Zero disables clipping.
    fn bin_clip(&self, tile_area: usize) -> usize {
        if self.clip_limit > 0.0 {
            ((self.clip_limit * tile_area as f32 / HIST_SIZE as f32) as usize).max(1)
        } else {
            0
        }
    }

    fn tile_luts(&self, src: &GrayImage, layout: &TileLayout) -> Vec<[u8; HIST_SIZE]> {
        let (width, height) = (src.width() as usize, src.height() as usize);
        let area = layout.area();
        let clip = self.bin_clip(area);
        let lut_scale = (HIST_SIZE - 1) as f32 / area as f32;

        let mut luts = Vec::with_capacity(layout.tiles_x * layout.tiles_y);
        for ty in 0..layout.tiles_y {
            for tx in 0..layout.tiles_x {
                let mut hist = [0usize; HIST_SIZE];
                for y in ty * layout.tile_h..(ty + 1) * layout.tile_h {
                    let sy = reflect_101(y, height) as u32;
                    for x in tx * layout.tile_w..(tx + 1) * layout.tile_w {
                        let sx = reflect_101(x, width) as u32;
                        hist[src.get_pixel(sx, sy)[0] as usize] += 1;
                    }
                }

                if clip > 0 {
                    clip_histogram(&mut hist, clip);
                }

                let mut lut = [0u8; HIST_SIZE];
                let mut sum = 0usize;
                for (bin, count) in hist.iter().enumerate() {
                    sum += count;
                    lut[bin] = saturate_u8(sum as f32 * lut_scale);
                }
                luts.push(lut);
            }
        }
        luts
    }
}

fn clip_histogram(hist: &mut [usize; HIST_SIZE], clip: usize) {
    let mut clipped = 0;
    for count in hist.iter_mut() {
        if *count > clip {
            clipped += *count - clip;
            *count = clip;
        }
    }

    let batch = clipped / HIST_SIZE;
    let mut residual = clipped - batch * HIST_SIZE;
    for count in hist.iter_mut() {
        *count += batch;
    }

    if residual != 0 {
        let step = (HIST_SIZE / residual).max(1);
        let mut bin = 0;
        while bin < HIST_SIZE && residual > 0 {
            hist[bin] += 1;
            bin += step;
            residual -= 1;
        }
    }
}

fn interpolate(src: &GrayImage, layout: &TileLayout, luts: &[[u8; HIST_SIZE]]) -> GrayImage {
    let (width, height) = src.dimensions();
    let inv_tw = 1.0 / layout.tile_w as f32;
    let inv_th = 1.0 / layout.tile_h as f32;

    // Column weights depend only on x, so compute them once per image.
    let columns: Vec<(usize, usize, f32)> = (0..width)
        .map(|x| neighbours(x as f32 * inv_tw - 0.5, layout.tiles_x))
        .collect();

    let mut dst = GrayImage::new(width, height);
    for y in 0..height {
        let (ty1, ty2, ya) = neighbours(y as f32 * inv_th - 0.5, layout.tiles_y);
        let row1 = &luts[ty1 * layout.tiles_x..(ty1 + 1) * layout.tiles_x];
        let row2 = &luts[ty2 * layout.tiles_x..(ty2 + 1) * layout.tiles_x];

        for (x, &(tx1, tx2, xa)) in columns.iter().enumerate() {
            let v = src.get_pixel(x as u32, y)[0] as usize;
            let top = row1[tx1][v] as f32 * (1.0 - xa) + row1[tx2][v] as f32 * xa;
            let bottom = row2[tx1][v] as f32 * (1.0 - xa) + row2[tx2][v] as f32 * xa;
            dst.put_pixel(x as u32, y, Luma([saturate_u8(top * (1.0 - ya) + bottom * ya)]));
        }
    }
    dst
}

/// Lower and upper tile index around a fractional tile position, plus the
/// weight of the upper one. Indices are clamped to the grid.
fn neighbours(pos: f32, tiles: usize) -> (usize, usize, f32) {
    let lower = pos.floor();
    let weight = pos - lower;
    let t1 = lower.max(0.0) as usize;
    let t2 = ((lower as i64 + 1).max(0) as usize).min(tiles - 1);
    (t1.min(tiles - 1), t2, weight)
}

/// `gfedcb|abcdefgh|gfedcba`
fn reflect_101(i: usize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let i = i % period;
    if i < len { i } else { period - i }
}

fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

fn saturate_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// ITU-R BT.601 luma in the 14-bit fixed point OpenCV uses for `BGR2GRAY`.
pub fn to_gray_bt601(image: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const SHIFT: u32 = 14;

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let luma = (r as u32 * R + g as u32 * G + b as u32 * B + (1 << (SHIFT - 1))) >> SHIFT;
        Luma([luma as u8])
    })
}

/// Grayscale, equalize, then replicate back into three channels so the
/// result stays a drop-in input for an RGB detector.
pub fn enhance(image: &DynamicImage, clahe: &Clahe) -> RgbImage {
    let gray = to_gray_bt601(&image.to_rgb8());
    let equalized = clahe.apply(&gray);
    DynamicImage::ImageLuma8(equalized).to_rgb8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn low_contrast_gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([100 + ((x + y) % 32) as u8]))
    }

    fn range(image: &GrayImage) -> (u8, u8) {
        image.pixels().fold((u8::MAX, u8::MIN), |(lo, hi), p| {
            (lo.min(p[0]), hi.max(p[0]))
        })
    }

    #[test]
    fn test_uniform_image_stays_uniform() {
        let src = GrayImage::from_pixel(64, 48, Luma([90]));
        let out = Clahe::default().apply(&src);

        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_preserves_dimensions_when_grid_does_not_divide() {
        let src = low_contrast_gradient(37, 23);
        let out = Clahe::default().apply(&src);
        assert_eq!(out.dimensions(), (37, 23));
    }

    #[test]
    fn test_image_smaller_than_grid() {
        let src = low_contrast_gradient(3, 5);
        let out = Clahe::default().apply(&src);
        assert_eq!(out.dimensions(), (3, 5));
    }

    #[test]
    fn test_single_pixel_image() {
        let src = GrayImage::from_pixel(1, 1, Luma([42]));
        let out = Clahe::default().apply(&src);
        assert_eq!(out.dimensions(), (1, 1));
    }

    #[test]
    fn test_empty_image_is_returned_unchanged() {
        let src = GrayImage::new(0, 0);
        assert_eq!(Clahe::default().apply(&src).dimensions(), (0, 0));
    }

    #[test]
    fn test_stretches_low_contrast() {
        let src = low_contrast_gradient(128, 128);
        let (in_lo, in_hi) = range(&src);
        let (out_lo, out_hi) = range(&Clahe::default().apply(&src));

        assert!(
            out_hi - out_lo > in_hi - in_lo,
            "expected wider range, got {out_lo}..{out_hi} from {in_lo}..{in_hi}"
        );
    }

    #[test]
    fn test_single_tile_is_monotonic() {
        let src = GrayImage::from_fn(256, 4, |x, _| Luma([x as u8]));
        let out = Clahe::new(DEFAULT_CLIP_LIMIT, (1, 1)).apply(&src);

        for x in 1..256 {
            assert!(out.get_pixel(x, 0)[0] >= out.get_pixel(x - 1, 0)[0]);
        }
        assert_eq!(out.get_pixel(255, 0)[0], 255);
    }

    #[test]
    fn test_clip_histogram_conserves_mass() {
        let mut hist = [0usize; HIST_SIZE];
        hist[10] = 500;
        hist[200] = 37;
        let before: usize = hist.iter().sum();

        clip_histogram(&mut hist, 8);

        assert_eq!(hist.iter().sum::<usize>(), before);
        assert!(hist.iter().all(|&c| c <= 8 + 3));
    }

    #[test]
    fn test_bin_clip() {
        let clahe = Clahe::default();
        assert_eq!(clahe.bin_clip(64 * 64), 32);
        assert_eq!(clahe.bin_clip(4), 1);
        assert_eq!(Clahe::new(0.0, DEFAULT_TILE_GRID).bin_clip(4096), 0);
    }

    #[test]
    fn test_reflect_101() {
        let idx: Vec<usize> = (0..8).map(|i| reflect_101(i, 5)).collect();
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 3, 2, 1]);
        assert_eq!(reflect_101(7, 1), 0);
    }

    #[test]
    fn test_neighbours_clamp_to_grid() {
        assert_eq!(neighbours(-0.5, 8), (0, 0, 0.5));
        assert_eq!(neighbours(7.5, 8), (7, 7, 0.5));
        let (t1, t2, w) = neighbours(2.25, 8);
        assert_eq!((t1, t2), (2, 3));
        assert!((w - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_gray_bt601_weights() {
        let image = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            2 => Rgb([0, 0, 255]),
            _ => Rgb([255, 255, 255]),
        });
        let gray = to_gray_bt601(&image);

        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
        assert_eq!(gray.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn test_enhance_replicates_channels() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(40, 30, |x, y| {
            Rgb([(x * 6) as u8, (y * 8) as u8, 60])
        }));
        let out = enhance(&image, &Clahe::default());

        assert_eq!(out.dimensions(), (40, 30));
        assert!(out.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    }
}
