//! Benchmarks for routing compilation and frame processing
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::Luma;
use magctl_rs::routing::RoutingCompiler;
use magctl_rs::vision::{apply_plan, detect_objects, DetectorParams, Frame};

const ROUTING: &str = "\
# typical marker tracking chain
gain 1.5 -10
lowpass 3
threshold 160
erode
dilate 2
";

fn synthetic_frame(width: u32, height: u32) -> Frame {
    let (cx, cy, r) = (width as i64 / 3, height as i64 / 2, 10i64);
    Frame::from_fn(width, height, |x, y| {
        let dx = x as i64 - cx;
        let dy = y as i64 - cy;
        if dx * dx + dy * dy <= r * r {
            Luma([230])
        } else {
            Luma([((x * 7 + y * 13) % 40) as u8])
        }
    })
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    group.bench_function("marker_chain", |b| {
        b.iter(|| RoutingCompiler::compile_text(black_box(ROUTING)))
    });

    let long: Vec<String> = (0..64)
        .map(|i| match i % 4 {
            0 => "lowpass 5".to_string(),
            1 => format!("threshold {}", i * 3),
            2 => "invert".to_string(),
            _ => "dilate 1".to_string(),
        })
        .collect();
    group.bench_function("max_stages", |b| {
        b.iter(|| RoutingCompiler::compile(black_box(&long)))
    });

    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_plan");
    let plan = RoutingCompiler::compile_text(ROUTING).unwrap();

    for (w, h) in [(160u32, 120u32), (320, 240), (640, 480)] {
        let frame = synthetic_frame(w, h);
        group.throughput(Throughput::Elements((w * h) as u64));
        group.bench_with_input(BenchmarkId::new("marker_chain", format!("{}x{}", w, h)), &frame, |b, frame| {
            b.iter(|| apply_plan(black_box(frame.clone()), &plan))
        });
    }

    group.finish();
}

fn bench_detect(c: &mut Criterion) {
    let params = DetectorParams {
        threshold: 128,
        min_area: 4,
        max_detections: 16,
    };
    let frame = synthetic_frame(320, 240);

    c.bench_function("detect_objects_320x240", |b| {
        b.iter(|| detect_objects(black_box(&frame), &params))
    });
}

criterion_group!(benches, bench_compile, bench_apply, bench_detect);
criterion_main!(benches);
