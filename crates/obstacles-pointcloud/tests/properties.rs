//! Property tests for ground removal and radius clustering.

use std::collections::BTreeSet;

use obstacles_pointcloud::perception::{
    cluster_points, estimate_ground_plane, ClusterParams, ObstacleDetector,
};
use obstacles_pointcloud::{CallContext, Point3D, PointCloud};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies and helpers
// ---------------------------------------------------------------------------

fn arb_points(max: usize) -> impl Strategy<Value = Vec<Point3D>> {
    prop::collection::vec(
        (-300.0f32..300.0, -300.0f32..300.0, 200.0f32..800.0),
        0..max,
    )
    .prop_map(|v| v.into_iter().map(|(x, y, z)| Point3D::new(x, y, z)).collect())
}

/// Coordinates that are usually in range but sometimes non-finite or far
/// out, as raw sensor returns can be.
fn arb_coord(lo: f32, hi: f32) -> impl Strategy<Value = f32> {
    prop_oneof![
        12 => lo..hi,
        1 => Just(f32::INFINITY),
        1 => Just(f32::NEG_INFINITY),
        1 => Just(f32::NAN),
        1 => Just(1.0e30f32),
        1 => Just(-1.0e30f32),
    ]
}

fn arb_raw_points(max: usize) -> impl Strategy<Value = Vec<Point3D>> {
    prop::collection::vec(
        (
            arb_coord(-300.0, 300.0),
            arb_coord(-300.0, 300.0),
            arb_coord(200.0, 800.0),
        ),
        0..max,
    )
    .prop_map(|v| v.into_iter().map(|(x, y, z)| Point3D::new(x, y, z)).collect())
}

fn canonical(groups: &[Vec<usize>]) -> BTreeSet<Vec<usize>> {
    groups
        .iter()
        .map(|g| {
            let mut g = g.clone();
            g.sort_unstable();
            g
        })
        .collect()
}

/// Every member of `group` reachable from the first through hops of at most
/// `radius`, staying inside the group.
fn is_chain_connected(points: &[Point3D], group: &[usize], radius: f64) -> bool {
    let r2 = radius * radius;
    let mut seen = vec![false; group.len()];
    let mut stack = vec![0usize];
    seen[0] = true;
    while let Some(a) = stack.pop() {
        for (b, &idx) in group.iter().enumerate() {
            if !seen[b] && points[group[a]].distance_sq(&points[idx]) <= r2 {
                seen[b] = true;
                stack.push(b);
            }
        }
    }
    seen.into_iter().all(|s| s)
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn clusters_partition_the_input(
        points in arb_raw_points(150),
        radius in 0.01f64..80.0,
        min_size in 1usize..6,
    ) {
        let set = cluster_points(&points, radius, min_size).unwrap();
        let mut seen: Vec<usize> = set
            .clusters()
            .iter()
            .flatten()
            .chain(set.discarded())
            .copied()
            .collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..points.len()).collect::<Vec<_>>());
        prop_assert!(set.clusters().iter().all(|c| c.len() >= min_size));
        for &i in set.clusters().iter().flatten() {
            prop_assert!(points[i].is_finite());
        }
    }

    #[test]
    fn clusters_are_maximal_chains(
        points in arb_points(120),
        radius in 1.0f64..80.0,
    ) {
        let set = cluster_points(&points, radius, 1).unwrap();
        prop_assert!(set.discarded().is_empty());
        for group in set.clusters() {
            prop_assert!(is_chain_connected(&points, group, radius));
        }
        // No link crosses between clusters.
        let mut label = vec![usize::MAX; points.len()];
        for (c, group) in set.clusters().iter().enumerate() {
            for &i in group {
                label[i] = c;
            }
        }
        let r2 = radius * radius;
        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                if label[i] != label[j] {
                    prop_assert!(points[i].distance_sq(&points[j]) > r2);
                }
            }
        }
    }

    #[test]
    fn partition_ignores_input_order(
        (points, perm) in arb_points(100).prop_flat_map(|pts| {
            let n = pts.len();
            (Just(pts), Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
        }),
        radius in 1.0f64..80.0,
        min_size in 1usize..4,
    ) {
        let shuffled: Vec<Point3D> = perm.iter().map(|&i| points[i]).collect();
        let a = cluster_points(&points, radius, min_size).unwrap();
        let b = cluster_points(&shuffled, radius, min_size).unwrap();
        let b_back: Vec<Vec<usize>> = b
            .clusters()
            .iter()
            .map(|g| g.iter().map(|&i| perm[i]).collect())
            .collect();
        prop_assert_eq!(canonical(a.clusters()), canonical(&b_back));
    }

    #[test]
    fn min_size_boundary(len in 1usize..30, spacing in 1.0f32..9.0) {
        let points: Vec<Point3D> = (0..len)
            .map(|i| Point3D::new(i as f32 * spacing, 0.0, 1000.0))
            .collect();
        let kept = cluster_points(&points, 10.0, len).unwrap();
        prop_assert_eq!(kept.len(), 1);
        let dropped = cluster_points(&points, 10.0, len + 1).unwrap();
        prop_assert!(dropped.is_empty());
        prop_assert_eq!(dropped.discarded().len(), len);
    }
}

// ---------------------------------------------------------------------------
// Ground plane and full segmentation
// ---------------------------------------------------------------------------

fn floor_with_clutter(clutter: &[Point3D]) -> PointCloud {
    let mut points = Vec::new();
    for i in 0..15 {
        for k in 0..15 {
            points.push(Point3D::new(i as f32 * 40.0 - 300.0, 400.0, 500.0 + k as f32 * 40.0));
        }
    }
    points.extend_from_slice(clutter);
    PointCloud::new(points, 0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn segmentation_accounts_for_every_point(
        clutter in arb_raw_points(60),
        min_segment in 1i64..8,
        radius in 5i64..60,
        seed in any::<u64>(),
    ) {
        let cloud = floor_with_clutter(&clutter);
        let config = ClusterParams {
            min_points_in_plane: 100,
            min_points_in_segment: min_segment,
            clustering_radius_mm: radius,
            max_dist_from_plane_mm: 5.0,
            ransac_iterations: 200,
            ransac_seed: seed,
            ..ClusterParams::default()
        }
        .validate()
        .unwrap();
        let detector = ObstacleDetector::new(config);
        let seg = detector.segment(&cloud, &CallContext::default()).unwrap();

        let mut seen: Vec<usize> = seg
            .ground
            .inliers()
            .iter()
            .chain(seg.clusters.clusters().iter().flatten())
            .chain(seg.clusters.discarded())
            .copied()
            .collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..cloud.len()).collect::<Vec<_>>());
        prop_assert_eq!(seg.accounted_points(), cloud.len());

        // Frozen cloud and config give the same answer twice.
        let again = detector.segment(&cloud, &CallContext::default()).unwrap();
        prop_assert_eq!(seg, again);
    }

    #[test]
    fn steep_plane_is_never_ground(
        tolerance in 5.0f64..40.0,
        extra in 10.0f64..40.0,
    ) {
        let tilt = (tolerance + extra).to_radians();
        let (s, c) = (tilt.sin(), tilt.cos());
        // 15x15 grid on a plane tilted about the x axis away from the floor.
        let mut points = Vec::new();
        for i in 0..15 {
            for k in 0..15 {
                let u = i as f64 * 50.0 - 350.0;
                let w = k as f64 * 50.0;
                points.push(Point3D::new(u as f32, (400.0 - w * s) as f32, (600.0 + w * c) as f32));
            }
        }
        let cloud = PointCloud::new(points, 0);
        let config = ClusterParams {
            min_points_in_plane: 100,
            max_dist_from_plane_mm: 5.0,
            angle_tolerance_degs: tolerance,
            ransac_iterations: 300,
            ..ClusterParams::default()
        }
        .validate()
        .unwrap();
        let seg = estimate_ground_plane(&cloud, &config);
        prop_assert!(!seg.found());
        prop_assert!(seg.inliers().is_empty());
        prop_assert_eq!(seg.residual().len(), cloud.len());
    }
}
