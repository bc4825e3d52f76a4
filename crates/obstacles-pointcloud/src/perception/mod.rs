//! Perception subsystem: ground removal, radius clustering, depth projection,
//! and the no-intrinsics range estimate.
//!
//! Every stage here is a pure function of its inputs and an immutable
//! [`ClusterConfig`]; nothing is retained between frames.

pub mod clustering;
pub mod config;
pub mod fallback;
pub mod ground_plane;
pub mod obstacle_detector;
pub mod projection;

pub use clustering::{cluster_points, ClusterSet};
pub use config::{ClusterConfig, ClusterParams};
pub use fallback::{estimate_without_intrinsics, median_depth};
pub use ground_plane::{estimate_ground_plane, GroundSegmentation, PlaneModel};
pub use obstacle_detector::{ObstacleDetector, Segmentation};
pub use projection::depth_to_point_cloud;

use crate::bridge::{Point3D, PointCloud};
use crate::camera::CameraError;
use crate::context::Stage;
use crate::service::Capability;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors emitted by pipeline construction and detection calls.
#[derive(Debug, thiserror::Error)]
pub enum PerceptionError {
    /// A tunable is missing or out of range. Raised before any frame is
    /// processed.
    #[error("invalid configuration: {field}: {reason}")]
    Configuration { field: &'static str, reason: String },

    /// A named camera is not among the supplied dependencies.
    #[error("could not find camera {name:?}")]
    DependencyNotFound { name: String },

    /// The camera failed to deliver a usable frame for this call.
    #[error("failed to acquire frame from camera {camera:?}")]
    Acquisition {
        camera: String,
        #[source]
        source: CameraError,
    },

    /// The frame held zero usable samples.
    #[error("no usable samples: {0}")]
    EmptyInput(String),

    /// The requested capability is not provided by this pipeline.
    #[error("{0} is not supported by this service")]
    Unsupported(Capability),

    /// The caller's deadline passed or its cancel flag was raised.
    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl PerceptionError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn acquisition(camera: &str, source: impl Into<CameraError>) -> Self {
        Self::Acquisition {
            camera: camera.to_string(),
            source: source.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PerceptionError>;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Geometric representation of a detected obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    /// A single location with no extent.
    Point { center: [f64; 3] },
    /// Axis-aligned bounding box of the member points.
    Box {
        center: [f64; 3],
        min: [f64; 3],
        max: [f64; 3],
    },
}

impl Geometry {
    pub fn center(&self) -> [f64; 3] {
        match self {
            Self::Point { center } | Self::Box { center, .. } => *center,
        }
    }

    /// Full side lengths; zero for a point.
    pub fn dimensions(&self) -> [f64; 3] {
        match self {
            Self::Point { .. } => [0.0; 3],
            Self::Box { min, max, .. } => [max[0] - min[0], max[1] - min[1], max[2] - min[2]],
        }
    }
}

/// One detected obstacle. Created fresh per call; carries no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub geometry: Geometry,
    /// Mean of the member points.
    pub centroid: [f64; 3],
    pub point_count: usize,
    /// Member points, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<PointCloud>,
}

impl Obstacle {
    /// Build a box obstacle from a cluster's member cloud.
    ///
    /// Returns `None` for an empty cloud.
    pub fn from_cluster(members: PointCloud, keep_points: bool) -> Option<Self> {
        let centroid = members.centroid()?;
        let (min, max) = members.bounds()?;
        let center = [
            (min[0] + max[0]) / 2.0,
            (min[1] + max[1]) / 2.0,
            (min[2] + max[2]) / 2.0,
        ];
        Some(Self {
            geometry: Geometry::Box { center, min, max },
            centroid,
            point_count: members.len(),
            points: keep_points.then_some(members),
        })
    }

    /// A point obstacle straight ahead of the camera at `depth_mm`.
    pub fn at_depth(depth_mm: f64) -> Self {
        let center = [0.0, 0.0, depth_mm];
        Self {
            geometry: Geometry::Point { center },
            centroid: center,
            point_count: 1,
            points: None,
        }
    }

    /// Whether `p` lies inside (or on) this obstacle's geometry.
    pub fn contains(&self, p: &Point3D) -> bool {
        match &self.geometry {
            Geometry::Point { center } => p.as_f64_array() == *center,
            Geometry::Box { min, max, .. } => {
                let a = p.as_f64_array();
                (0..3).all(|k| a[k] >= min[k] && a[k] <= max[k])
            }
        }
    }
}

/// Build obstacles for each cluster in `clusters`, in cluster order.
pub(crate) fn obstacles_from_clusters(
    cloud: &PointCloud,
    clusters: &ClusterSet,
    keep_points: bool,
) -> Vec<Obstacle> {
    clusters
        .clusters()
        .iter()
        .filter_map(|members| Obstacle::from_cluster(cloud.subset(members), keep_points))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
