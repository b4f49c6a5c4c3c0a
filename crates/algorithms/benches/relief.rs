//! Benchmarks for the relief index, slope/aspect and distance transform

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rengis_algorithms::distance::{euclidean_distance, DistanceParams};
use rengis_algorithms::terrain::{aspect, slope, tpi, AspectParams, SlopeParams, TpiParams};
use rengis_core::{GeoTransform, Raster, WindowSize};

fn create_dem(size: usize) -> Raster<f64> {
    let mut dem = Raster::new(size, size);
    dem.set_transform(GeoTransform::new(0.0, size as f64 * 10.0, 10.0, -10.0));

    // Rolling surface with a noise-like pattern
    for row in 0..size {
        for col in 0..size {
            let base = ((row as f64) * 0.05).sin() * 40.0 + ((col as f64) * 0.03).cos() * 25.0;
            let variation = ((row * 7 + col * 13) % 100) as f64 / 10.0;
            dem.set(row, col, 300.0 + base + variation).unwrap();
        }
    }
    dem
}

fn create_features(size: usize) -> Raster<f64> {
    let mut r = Raster::filled(size, size, f64::NAN);
    r.set_transform(GeoTransform::new(0.0, size as f64 * 10.0, 10.0, -10.0));
    for i in (0..size).step_by(97) {
        r.set(i, (i * 31) % size, 1.0).unwrap();
    }
    r
}

fn bench_tpi(c: &mut Criterion) {
    let mut group = c.benchmark_group("tpi");
    let dem = create_dem(512);

    for size in [3, 31, 51] {
        let params = TpiParams::new(WindowSize::new(size).unwrap());
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| tpi(black_box(&dem), &params).unwrap())
        });
    }

    group.finish();
}

fn bench_slope_aspect(c: &mut Criterion) {
    let mut group = c.benchmark_group("derivatives");
    let dem = create_dem(1024);

    group.bench_function("slope", |b| {
        b.iter(|| slope(black_box(&dem), &SlopeParams::default()).unwrap())
    });
    group.bench_function("aspect", |b| {
        b.iter(|| aspect(black_box(&dem), &AspectParams::default()).unwrap())
    });

    group.finish();
}

fn bench_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("distance");

    for size in [256, 512, 1024] {
        let features = create_features(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| euclidean_distance(black_box(&features), &DistanceParams::default()).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tpi, bench_slope_aspect, bench_distance);
criterion_main!(benches);
