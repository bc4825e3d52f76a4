//! Example: obstacle detection from a synthetic warehouse frame.
//!
//! Demonstrates:
//! - Building a `PointCloud` with a floor and a few objects on it
//! - Splitting ground from clutter with the `ObstacleDetector`
//! - Running the same frame through a depth camera without intrinsics

use std::sync::Arc;

use obstacles_pointcloud::bridge::{DepthMap, Point3D, PointCloud};
use obstacles_pointcloud::perception::{ClusterParams, Geometry, ObstacleDetector};
use obstacles_pointcloud::{
    CallContext, Dependencies, DetectOptions, ObstacleService, PipelineVariant, ServiceConfig,
    StaticCamera,
};

fn main() {
    println!("=== Obstacle Detection Demo ===\n");

    let mut points = Vec::new();

    // Floor, 1.2 m below the camera.
    for i in 0..40 {
        for k in 0..40 {
            points.push(Point3D::new(i as f32 * 50.0 - 1000.0, 1200.0, 500.0 + k as f32 * 50.0));
        }
    }

    // Pallet (wide, low)
    for dx in 0..12 {
        for dz in 0..8 {
            points.push(Point3D::new(
                -400.0 + dx as f32 * 20.0,
                1100.0,
                1500.0 + dz as f32 * 20.0,
            ));
        }
    }

    // Post (tall, thin)
    for dy in 0..30 {
        points.push(Point3D::new(300.0, 1150.0 - dy as f32 * 20.0, 1800.0));
        points.push(Point3D::new(315.0, 1150.0 - dy as f32 * 20.0, 1800.0));
    }

    // Stray returns, too small to keep
    points.push(Point3D::new(800.0, 900.0, 2200.0));
    points.push(Point3D::new(810.0, 900.0, 2200.0));

    let cloud = PointCloud::new(points, 1_000_000);
    println!("Point cloud: {} points\n", cloud.len());

    let config = ClusterParams {
        min_points_in_plane: 500,
        min_points_in_segment: 10,
        max_dist_from_plane_mm: 30.0,
        clustering_radius_mm: 30,
        clustering_strictness: 1.0,
        ..ClusterParams::default()
    }
    .validate()
    .expect("valid parameters");
    let detector = ObstacleDetector::new(config);

    let ctx = CallContext::default();
    let seg = detector.segment(&cloud, &ctx).expect("segmentation");
    println!(
        "Ground: {} points, clusters: {}, discarded: {}",
        seg.ground.inliers().len(),
        seg.clusters.len(),
        seg.clusters.discarded().len()
    );
    if let Some(plane) = seg.ground.plane() {
        println!("Ground normal: {:?}\n", plane.normal());
    }

    let obstacles = detector.detect(&cloud, false, &ctx).expect("detection");
    println!("Detected {} obstacles:\n", obstacles.len());
    for (i, obs) in obstacles.iter().enumerate() {
        let c = obs.geometry.center();
        let d = obs.geometry.dimensions();
        println!(
            "  Obstacle {i}: center=[{:.0}, {:.0}, {:.0}] mm, size=[{:.0}, {:.0}, {:.0}] mm",
            c[0], c[1], c[2], d[0], d[1], d[2],
        );
        println!("    points: {}", obs.point_count);
    }

    // Uncalibrated depth camera: only a range estimate is possible.
    let samples = vec![0, 1800, 1900, 2100, 0, 2000, 2500, 0];
    let depth = DepthMap::new(4, 2, samples).expect("depth map");
    let camera = StaticCamera::new("front-depth").with_depth_map(depth);
    let service = ObstacleService::new(
        "obstacles",
        &ServiceConfig::with_camera("front-depth"),
        PipelineVariant::Depth,
        Dependencies::new().with_camera(Arc::new(camera)),
    )
    .expect("service");
    let estimate = service
        .detect_obstacles("", &DetectOptions::default(), &ctx)
        .expect("range estimate");
    println!("\nUncalibrated depth camera:");
    for obs in &estimate {
        if let Geometry::Point { center } = obs.geometry {
            println!("  something at {:.0} mm straight ahead", center[2]);
        }
    }
}
