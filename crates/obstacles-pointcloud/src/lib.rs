//! # obstacles-pointcloud
//!
//! Obstacle detection for depth and point-cloud cameras: ground-plane removal,
//! Euclidean radius clustering, depth projection and a range-only fallback
//! for uncalibrated cameras.
//!
//! ## Modules
//!
//! - [`bridge`]: Core geometry types, sensor decoding, and spatial indexing
//! - [`perception`]: Ground plane, clustering, projection, fallback, obstacle detector
//! - [`camera`]: The camera collaborator trait and an in-memory camera
//! - [`context`]: Per-call deadline and cancellation
//! - [`service`]: Configuration, dependencies and the orchestrating service
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use obstacles_pointcloud::{
//!     CallContext, DepthMap, Dependencies, DetectOptions, ObstacleService, PipelineVariant,
//!     ServiceConfig, StaticCamera,
//! };
//!
//! // An uncalibrated depth camera.
//! let depth = DepthMap::new(5, 1, vec![1, 2, 3, 4, 5]).unwrap();
//! let camera = StaticCamera::new("front").with_depth_map(depth);
//! let deps = Dependencies::new().with_camera(Arc::new(camera));
//!
//! let service = ObstacleService::new(
//!     "obstacles",
//!     &ServiceConfig::with_camera("front"),
//!     PipelineVariant::Depth,
//!     deps,
//! )
//! .unwrap();
//!
//! let obstacles = service
//!     .detect_obstacles("", &DetectOptions::default(), &CallContext::default())
//!     .unwrap();
//! assert_eq!(obstacles.len(), 1);
//! assert_eq!(obstacles[0].centroid, [0.0, 0.0, 3.0]);
//! ```

pub mod bridge;
pub mod camera;
pub mod context;
pub mod perception;
pub mod service;

// Convenience re-exports of the most commonly used types.
pub use bridge::{
    BrownConrady, CameraIntrinsics, DepthMap, Image, Point3D, PointCloud, VoxelGrid,
};
pub use camera::{Camera, CameraError, StaticCamera};
pub use context::{CallContext, Stage};
pub use perception::{
    ClusterConfig, ClusterParams, Geometry, Obstacle, ObstacleDetector, PerceptionError,
};
pub use service::{
    Capability, CaptureOptions, Dependencies, DetectOptions, ObstacleService, PipelineVariant,
    Properties, ServiceConfig, VisCapture,
};
