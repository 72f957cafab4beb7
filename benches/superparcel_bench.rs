use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use geo_superparcel::distance::DistanceMatrix;
use geo_superparcel::{build_superparcels, Parcel, SuperParcelConfig};
use geo_types::{LineString, Polygon};

fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (x, y),
            (x + size, y),
            (x + size, y + size),
            (x, y + size),
            (x, y),
        ]),
        vec![],
    )
}

// n x n grid of 10-unit parcels with 4-unit gaps, owners in 3x3 blocks
fn generate_grid(n: usize) -> Vec<Parcel> {
    let mut parcels = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let owner = format!("OWNER {}-{}", i / 3, j / 3);
            let poly = square(i as f64 * 14.0, j as f64 * 14.0, 10.0);
            if let Ok(p) = Parcel::new((i * n + j) as u64, owner, "06001", poly) {
                parcels.push(p);
            }
        }
    }
    parcels
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_superparcels");
    group.sample_size(10);

    for size in [9, 18, 30].iter() {
        group.bench_with_input(BenchmarkId::new("grid", size), size, |b, &size| {
            let parcels = generate_grid(size);
            let config = SuperParcelConfig::default().with_fixed_threshold(6.0);
            b.iter(|| build_superparcels(&parcels, "06001", &config))
        });
    }
    group.finish();
}

fn bench_distance_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("distance_matrix");
    for size in [10, 20].iter() {
        group.bench_with_input(BenchmarkId::new("grid", size), size, |b, &size| {
            let polygons: Vec<Polygon<f64>> = generate_grid(size)
                .iter()
                .map(|p| p.geometry().clone())
                .collect();
            b.iter(|| DistanceMatrix::from_polygons(&polygons))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_distance_matrix);
criterion_main!(benches);
