//! Obstacle detection from point clouds.
//!
//! Removes the ground plane, clusters what is left with the radius engine,
//! and turns each surviving cluster into an [`Obstacle`].

use crate::bridge::PointCloud;
use crate::context::{CallContext, Stage};
use crate::perception::clustering::{self, ClusterSet};
use crate::perception::config::ClusterConfig;
use crate::perception::ground_plane::{self, GroundSegmentation};
use crate::perception::{obstacles_from_clusters, Obstacle, PerceptionError, Result};

use tracing::debug;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Full partition of one cloud: ground inliers, kept clusters, and points
/// dropped with undersized clusters. All indices refer to the input cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub ground: GroundSegmentation,
    pub clusters: ClusterSet,
}

impl Segmentation {
    /// Number of input points accounted for across ground, clusters and
    /// discards. Equals the cloud length.
    pub fn accounted_points(&self) -> usize {
        self.ground.inliers().len()
            + self.clusters.clustered_count()
            + self.clusters.discarded().len()
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Ground removal followed by radius clustering, under one validated config.
///
/// Holds no per-frame state; share it freely across threads.
#[derive(Debug, Clone, Default)]
pub struct ObstacleDetector {
    config: ClusterConfig,
}

impl ObstacleDetector {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Fit the ground plane of `cloud`.
    pub fn fit_ground(&self, cloud: &PointCloud) -> GroundSegmentation {
        ground_plane::estimate_ground_plane(cloud, &self.config)
    }

    /// Cluster the residual of `ground`, returning indices into `cloud`.
    pub fn cluster_residual(
        &self,
        cloud: &PointCloud,
        ground: &GroundSegmentation,
    ) -> Result<ClusterSet> {
        let residual = ground.residual_cloud(cloud);
        let local = clustering::cluster_with_config(&residual.points, &self.config)?;
        Ok(local.remap(ground.residual()))
    }

    /// Partition `cloud` into ground, clusters and discards.
    ///
    /// `ctx` is consulted once, between the plane fit and clustering.
    pub fn segment(&self, cloud: &PointCloud, ctx: &CallContext) -> Result<Segmentation> {
        let ground = self.fit_ground(cloud);
        ctx.checkpoint(Stage::Clustering)?;
        let clusters = self.cluster_residual(cloud, &ground)?;
        Ok(Segmentation { ground, clusters })
    }

    /// Detect obstacles in `cloud`.
    ///
    /// An empty cloud is [`PerceptionError::EmptyInput`]; a cloud that is all
    /// ground, or whose clusters are all undersized, gives `Ok(vec![])`.
    pub fn detect(
        &self,
        cloud: &PointCloud,
        keep_points: bool,
        ctx: &CallContext,
    ) -> Result<Vec<Obstacle>> {
        if cloud.is_empty() {
            return Err(PerceptionError::EmptyInput("point cloud has no points".into()));
        }
        let seg = self.segment(cloud, ctx)?;
        let obstacles = obstacles_from_clusters(cloud, &seg.clusters, keep_points);
        debug!(
            points = cloud.len(),
            ground = seg.ground.inliers().len(),
            obstacles = obstacles.len(),
            "detection done"
        );
        Ok(obstacles)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Point3D;
    use crate::perception::config::ClusterParams;
    use crate::perception::Geometry;

    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn make_cloud(raw: &[[f32; 3]]) -> PointCloud {
        let points: Vec<Point3D> = raw.iter().map(|p| Point3D::new(p[0], p[1], p[2])).collect();
        PointCloud::new(points, 0)
    }

    fn detector(min_plane: i64, min_segment: i64, radius: i64) -> ObstacleDetector {
        let cfg = ClusterParams {
            min_points_in_plane: min_plane,
            min_points_in_segment: min_segment,
            clustering_radius_mm: radius,
            clustering_strictness: 0.0,
            max_dist_from_plane_mm: 10.0,
            angle_tolerance_degs: 10.0,
            ransac_iterations: 300,
            ..ClusterParams::default()
        }
        .validate()
        .unwrap();
        ObstacleDetector::new(cfg)
    }

    /// Floor at y = 500 plus two 3x3x3 blocks of 10 mm pitch.
    fn scene() -> Vec<[f32; 3]> {
        let mut pts = Vec::new();
        for i in 0..20 {
            for k in 0..20 {
                pts.push([i as f32 * 50.0 - 500.0, 500.0, 1000.0 + k as f32 * 50.0]);
            }
        }
        for origin in [[-200.0, 300.0, 1500.0], [200.0, 300.0, 1800.0]] {
            for a in 0..3 {
                for b in 0..3 {
                    for c in 0..3 {
                        pts.push([
                            origin[0] + a as f32 * 10.0,
                            origin[1] + b as f32 * 10.0,
                            origin[2] + c as f32 * 10.0,
                        ]);
                    }
                }
            }
        }
        pts
    }

    #[test]
    fn test_detect_empty_cloud() {
        let det = ObstacleDetector::default();
        let err = det
            .detect(&PointCloud::default(), false, &CallContext::default())
            .unwrap_err();
        assert!(matches!(err, PerceptionError::EmptyInput(_)));
    }

    #[test]
    fn test_detect_two_blocks_on_floor() {
        let det = detector(100, 5, 15);
        let cloud = make_cloud(&scene());
        let obstacles = det.detect(&cloud, false, &CallContext::default()).unwrap();
        assert_eq!(obstacles.len(), 2);
        for o in &obstacles {
            assert_eq!(o.point_count, 27);
            assert!(matches!(o.geometry, Geometry::Box { .. }));
            let dims = o.geometry.dimensions();
            assert!(dims.iter().all(|d| (d - 20.0).abs() < 1e-3));
        }
        // Ordered by smallest member index: the first block was pushed first.
        assert!(obstacles[0].centroid[0] < obstacles[1].centroid[0]);
    }

    #[test]
    fn test_segmentation_accounts_for_every_point() {
        let det = detector(100, 30, 15);
        let cloud = make_cloud(&scene());
        let seg = det.segment(&cloud, &CallContext::default()).unwrap();
        assert_eq!(seg.ground.inliers().len(), 400);
        assert!(seg.clusters.is_empty());
        assert_eq!(seg.clusters.discarded().len(), 54);
        assert_eq!(seg.accounted_points(), cloud.len());
    }

    #[test]
    fn test_only_floor_yields_no_obstacles() {
        let det = detector(100, 5, 15);
        let cloud = make_cloud(&scene()[..400]);
        assert!(det.detect(&cloud, false, &CallContext::default()).unwrap().is_empty());
    }

    #[test]
    fn test_keep_points_attaches_members() {
        let det = detector(100, 5, 15);
        let cloud = make_cloud(&scene());
        let obstacles = det.detect(&cloud, true, &CallContext::default()).unwrap();
        let members = obstacles[0].points.as_ref().unwrap();
        assert_eq!(members.len(), 27);
        assert!(members.points.iter().all(|p| obstacles[0].contains(p)));
    }

    #[test]
    fn test_cancelled_between_stages() {
        let det = detector(100, 5, 15);
        let cloud = make_cloud(&scene());
        let ctx = CallContext::new().with_cancel_flag(Arc::new(AtomicBool::new(true)));
        let err = det.detect(&cloud, false, &ctx).unwrap_err();
        assert!(matches!(
            err,
            PerceptionError::Cancelled {
                stage: Stage::Clustering
            }
        ));
    }

    #[test]
    fn test_obstacle_detector_debug() {
        let det = ObstacleDetector::default();
        let dbg = format!("{:?}", det);
        assert!(dbg.contains("ObstacleDetector"));
    }
}
