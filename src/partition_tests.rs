use super::*;

fn line_blobs(sizes: &[usize]) -> Vec<Coord<f64>> {
    // Blobs along the x axis, 1000 units apart, points 0.1 apart within a blob.
    sizes
        .iter()
        .enumerate()
        .flat_map(|(b, &n)| (0..n).map(move |i| Coord { x: b as f64 * 1000.0 + i as f64 * 0.1, y: 0.0 }))
        .collect()
}

fn tiling(max_per_tile: usize, min_tile_size: usize) -> TilingConfig {
    TilingConfig {
        enabled: true,
        max_parcels_per_tile: max_per_tile,
        min_tile_size,
        max_iterations: 100,
    }
}

#[test]
fn test_tile_count_formula() {
    let p = RegionPartitioner::new(tiling(500, 50));
    assert_eq!(p.tile_count_for(0), 1);
    assert_eq!(p.tile_count_for(499), 1);
    assert_eq!(p.tile_count_for(1000), 2);
    assert_eq!(p.tile_count_for(1499), 2);
}

#[test]
fn test_small_input_is_single_tile() {
    let points = line_blobs(&[30]);
    let assignment = RegionPartitioner::new(tiling(500, 50)).partition(&points);
    assert_eq!(assignment.tile_count(), 1);
    assert!(assignment.labels.iter().all(|&l| l == 0));
}

#[test]
fn test_disabled_tiling_is_single_tile() {
    let points = line_blobs(&[100, 100, 100]);
    let mut config = tiling(100, 10);
    config.enabled = false;
    let assignment = RegionPartitioner::new(config).partition(&points);
    assert_eq!(assignment.tile_count(), 1);
}

#[test]
fn test_separated_blobs_get_their_own_tiles() {
    let points = line_blobs(&[100, 100, 100, 100]);
    let assignment = RegionPartitioner::new(tiling(100, 10)).partition(&points);

    assert_eq!(assignment.tile_count(), 4);
    for (i, &label) in assignment.labels.iter().enumerate() {
        assert_eq!(label, i / 100, "point {} in wrong tile", i);
    }
    let tiles = assignment.tiles();
    assert!(tiles.iter().all(|t| t.len() == 100));
    assert!((assignment.centroids[2].x - (2000.0 + 4.95)).abs() < 1e-6);
}

#[test]
fn test_partition_is_deterministic() {
    let points = line_blobs(&[80, 120, 60, 140]);
    let p = RegionPartitioner::new(tiling(100, 10));
    assert_eq!(p.partition(&points), p.partition(&points));
}

#[test]
fn test_merge_small_tiles_into_nearest() {
    let centroids = vec![
        Coord { x: 0.0, y: 0.0 },
        Coord { x: 10.0, y: 0.0 },
        Coord { x: 100.0, y: 0.0 },
    ];
    // Tile 1 is undersized and closer to tile 0 than to tile 2.
    let mut labels = vec![0, 0, 0, 1, 2, 2, 2];
    merge_small_tiles(&mut labels, &centroids, 2);
    assert_eq!(labels, vec![0, 0, 0, 0, 2, 2, 2]);
}

#[test]
fn test_merge_never_targets_emptied_tiles() {
    let centroids = vec![
        Coord { x: 0.0, y: 0.0 },
        Coord { x: 1.0, y: 0.0 },
        Coord { x: 50.0, y: 0.0 },
    ];
    // Tiles 0 and 1 are both small; 0 merges into 1, then 1 (now large enough) stays.
    let mut labels = vec![0, 1, 2, 2, 2];
    merge_small_tiles(&mut labels, &centroids, 2);
    assert_eq!(labels, vec![1, 1, 2, 2, 2]);
}
