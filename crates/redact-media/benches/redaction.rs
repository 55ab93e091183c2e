//! Redaction and tracking benchmarks.
//!
//! # Running Benchmarks
//! ```bash
//! cargo bench --package redact-media --bench redaction
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use redact_media::{RedactionEngine, RedactionRegion, RedactionSettings, Tracker, TrackerConfig};
use redact_models::{BoundingBox, Detection, DetectorId, RedactionMode};
use std::time::Duration;

/// Synthetic frame with some texture so blur and pixelate do real work.
fn create_test_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 11) % 256) as u8,
            ((x * 13 + y * 17) % 256) as u8,
            ((x * 19 + y * 23) % 256) as u8,
        ])
    })
}

fn regions(count: usize, mode: RedactionMode) -> Vec<RedactionRegion> {
    (0..count)
        .map(|i| {
            let x = 60.0 + (i as f64) * 170.0;
            RedactionRegion::new(BoundingBox::new(x, 200.0, 150.0, 180.0), mode)
        })
        .collect()
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    let frame = create_test_frame(1280, 720);
    let engine = RedactionEngine::for_video(&RedactionSettings::default());

    for mode in RedactionMode::ALL {
        for count in [1usize, 5] {
            let regions = regions(count, *mode);
            group.throughput(Throughput::Elements(1));
            group.bench_with_input(
                BenchmarkId::new(mode.as_str(), format!("{count}_regions")),
                &regions,
                |b, regions| {
                    b.iter(|| {
                        let out = engine.render(black_box(&frame), black_box(regions));
                        black_box(out)
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_tracker_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_step");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    let source = DetectorId::new("bench");
    for num_objects in [1usize, 5, 20] {
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("objects", num_objects), |b| {
            let mut tracker = Tracker::new(TrackerConfig::default());
            let mut frame = 0u64;
            b.iter(|| {
                let detections: Vec<Detection> = (0..num_objects)
                    .map(|i| {
                        let x = 50.0 + (i as f64) * 60.0 + (frame % 40) as f64;
                        let bbox = BoundingBox::new(x, 100.0, 50.0, 60.0);
                        Detection::new("face", 0.9, bbox, frame, source.clone())
                    })
                    .collect();
                let step = tracker.step(frame, &detections);
                frame += 1;
                black_box(step)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_render, bench_tracker_step);
criterion_main!(benches);
