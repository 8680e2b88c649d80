use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use preprocess::{Clahe, enhance, to_gray_bt601};

/// Gradient with some texture so tiles get non-trivial histograms
fn test_gray(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(((x * 3 + y * 7) % 64) + (x * 128 / width)) as u8])
    })
}

fn test_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn benchmark_clahe(c: &mut Criterion) {
    let mut group = c.benchmark_group("clahe");
    let clahe = Clahe::default();

    let sizes = [(640, 480, "VGA"), (1280, 720, "HD"), (1920, 1080, "Full HD")];

    for (width, height, label) in sizes {
        let gray = test_gray(width, height);
        group.throughput(Throughput::Elements((width * height) as u64));

        group.bench_with_input(BenchmarkId::new("apply", label), &gray, |b, gray| {
            b.iter(|| clahe.apply(black_box(gray)));
        });
    }

    // Coarser grid and looser clip, as a tuning reference against the defaults
    let coarse = Clahe::new(4.0, (4, 4));
    let gray = test_gray(1280, 720);
    group.bench_function("apply_coarse_grid_hd", |b| {
        b.iter(|| coarse.apply(black_box(&gray)));
    });

    group.finish();
}

fn benchmark_enhance(c: &mut Criterion) {
    let mut group = c.benchmark_group("enhance");
    let clahe = Clahe::default();

    let rgb = test_rgb(1280, 720);
    group.bench_function("gray_bt601_hd", |b| {
        b.iter(|| to_gray_bt601(black_box(&rgb)));
    });

    let image = DynamicImage::ImageRgb8(rgb);
    group.bench_function("enhance_hd", |b| {
        b.iter(|| enhance(black_box(&image), &clahe));
    });

    group.finish();
}

criterion_group!(benches, benchmark_clahe, benchmark_enhance);
criterion_main!(benches);
