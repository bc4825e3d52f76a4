//! Service boundary: the pipeline orchestrator and its capability surface.
//!
//! [`ObstacleService`] is built once from a validated [`ServiceConfig`] and an
//! explicit [`Dependencies`] map. Construction fails fast on a bad config or a
//! missing camera; after that every call is independent and may run
//! concurrently with others.

pub mod config;

pub use config::{NormalVec, ServiceConfig};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bridge::{DepthMap, Image};
use crate::camera::Camera;
use crate::context::{CallContext, Stage};
use crate::perception::config::ClusterConfig;
use crate::perception::{
    depth_to_point_cloud, estimate_without_intrinsics, Obstacle, ObstacleDetector,
    PerceptionError, Result,
};

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Operations a vision service may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ObjectPointClouds,
    Detections,
    Classifications,
    ClientFromConnection,
    DoCommand,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ObjectPointClouds => "object point clouds",
            Self::Detections => "detections",
            Self::Classifications => "classifications",
            Self::ClientFromConnection => "client from connection",
            Self::DoCommand => "do_command",
        };
        f.write_str(s)
    }
}

/// What this service reports it can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    pub object_point_clouds_supported: bool,
    pub detection_supported: bool,
    pub classification_supported: bool,
}

/// A labelled 2D box. Never produced by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
    pub score: f64,
    pub label: String,
}

/// An image-level label. Never produced by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Call options and results
// ---------------------------------------------------------------------------

/// Which pipeline the orchestrator runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVariant {
    /// The camera produces point clouds directly.
    #[default]
    PointCloud,
    /// The camera produces depth images; project them when calibrated,
    /// otherwise fall back to the median-range estimate.
    Depth,
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PointCloud => f.write_str("pointcloud"),
            Self::Depth => f.write_str("depth"),
        }
    }
}

impl FromStr for PipelineVariant {
    type Err = PerceptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pointcloud" | "point_cloud" => Ok(Self::PointCloud),
            "depth" => Ok(Self::Depth),
            other => Err(PerceptionError::config(
                "variant",
                format!("unknown pipeline variant {other:?}"),
            )),
        }
    }
}

/// Per-call overrides for [`ObstacleService::detect_obstacles`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectOptions {
    /// Attach member points; `None` uses the service's `include_points`.
    #[serde(default)]
    pub include_points: Option<bool>,
}

/// What [`ObstacleService::capture`] should fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    #[serde(default)]
    pub return_image: bool,
    #[serde(default)]
    pub return_objects: bool,
    #[serde(default)]
    pub detect: DetectOptions,
}

/// Bundle returned by [`ObstacleService::capture`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisCapture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    pub objects: Vec<Obstacle>,
    pub detections: Vec<Detection>,
    pub classifications: Vec<Classification>,
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Cameras available to a service, keyed by name.
#[derive(Clone, Default)]
pub struct Dependencies {
    cameras: BTreeMap<String, Arc<dyn Camera>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `camera` under its own name, replacing any previous entry.
    pub fn insert(&mut self, camera: Arc<dyn Camera>) {
        self.cameras.insert(camera.name().to_string(), camera);
    }

    pub fn with_camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.insert(camera);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Camera>> {
        self.cameras.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cameras.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Obstacle detection behind a vision-service style API.
#[derive(Debug)]
pub struct ObstacleService {
    name: String,
    default_camera: String,
    variant: PipelineVariant,
    include_points: bool,
    detector: ObstacleDetector,
    deps: Dependencies,
}

impl ObstacleService {
    /// Validate `config` and resolve its camera among `deps`.
    pub fn new(
        name: impl Into<String>,
        config: &ServiceConfig,
        variant: PipelineVariant,
        deps: Dependencies,
    ) -> Result<Self> {
        let name = name.into();
        let required = config.validate()?;
        for dep in &required {
            if deps.get(dep).is_none() {
                return Err(PerceptionError::DependencyNotFound { name: dep.clone() });
            }
        }
        let cluster_config = config.cluster_config()?;
        info!(
            service = %name,
            camera = %config.camera_name,
            %variant,
            radius_mm = cluster_config.effective_radius_mm(),
            "obstacle service ready"
        );
        Ok(Self {
            name,
            default_camera: config.camera_name.clone(),
            variant,
            include_points: config.include_points,
            detector: ObstacleDetector::new(cluster_config),
            deps,
        })
    }

    /// Always fails: this service is only constructed from a config.
    pub fn client_from_connection(_address: &str) -> Result<Self> {
        Err(PerceptionError::Unsupported(Capability::ClientFromConnection))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_camera(&self) -> &str {
        &self.default_camera
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    pub fn cluster_config(&self) -> &ClusterConfig {
        self.detector.config()
    }

    pub fn properties(&self) -> Properties {
        Properties {
            object_point_clouds_supported: true,
            detection_supported: false,
            classification_supported: false,
        }
    }

    /// Detect obstacles in the current frame of `camera_name`, or of the
    /// default camera when `camera_name` is empty.
    pub fn detect_obstacles(
        &self,
        camera_name: &str,
        options: &DetectOptions,
        ctx: &CallContext,
    ) -> Result<Vec<Obstacle>> {
        let camera = self.resolve(camera_name)?;
        let keep_points = options.include_points.unwrap_or(self.include_points);
        match self.variant {
            PipelineVariant::PointCloud => {
                let cloud = camera
                    .next_point_cloud()
                    .map_err(|e| PerceptionError::acquisition(camera.name(), e))?;
                ctx.checkpoint(Stage::Acquisition)?;
                debug!(camera = camera.name(), points = cloud.len(), "point cloud acquired");
                self.detector.detect(&cloud, keep_points, ctx)
            }
            PipelineVariant::Depth => self.detect_from_depth(camera.as_ref(), keep_points, ctx),
        }
    }

    fn detect_from_depth(
        &self,
        camera: &dyn Camera,
        keep_points: bool,
        ctx: &CallContext,
    ) -> Result<Vec<Obstacle>> {
        let intrinsics = match camera.intrinsics() {
            Ok(Some(k)) => Some(k),
            Ok(None) => {
                warn!(
                    camera = camera.name(),
                    "camera has no intrinsic parameters; using median depth"
                );
                None
            }
            Err(error) => {
                warn!(
                    camera = camera.name(),
                    %error,
                    "could not read camera intrinsics; using median depth"
                );
                None
            }
        };

        let depth = self.acquire_depth(camera)?;
        ctx.checkpoint(Stage::Acquisition)?;

        let Some(intrinsics) = intrinsics else {
            return Ok(vec![estimate_without_intrinsics(&depth)?]);
        };
        let cloud = depth_to_point_cloud(&depth, &intrinsics)
            .map_err(|e| PerceptionError::acquisition(camera.name(), e))?;
        debug!(
            camera = camera.name(),
            valid = depth.valid_count(),
            points = cloud.len(),
            "depth map projected"
        );
        self.detector.detect(&cloud, keep_points, ctx)
    }

    fn acquire_depth(&self, camera: &dyn Camera) -> Result<DepthMap> {
        camera
            .depth_map()
            .map_err(|e| PerceptionError::acquisition(camera.name(), e))
    }

    /// Fetch the current image and/or the detected obstacles in one call.
    pub fn capture(
        &self,
        camera_name: &str,
        options: &CaptureOptions,
        ctx: &CallContext,
    ) -> Result<VisCapture> {
        let mut out = VisCapture::default();
        if options.return_image {
            let camera = self.resolve(camera_name)?;
            let image = camera
                .image()
                .map_err(|e| PerceptionError::acquisition(camera.name(), e))?;
            out.image = Some(image);
        }
        if options.return_objects {
            out.objects = self.detect_obstacles(camera_name, &options.detect, ctx)?;
        }
        Ok(out)
    }

    pub fn detections(&self, _camera_name: &str) -> Result<Vec<Detection>> {
        Err(PerceptionError::Unsupported(Capability::Detections))
    }

    pub fn detections_from_image(&self, _image: &Image) -> Result<Vec<Detection>> {
        Err(PerceptionError::Unsupported(Capability::Detections))
    }

    pub fn classifications(&self, _camera_name: &str, _n: usize) -> Result<Vec<Classification>> {
        Err(PerceptionError::Unsupported(Capability::Classifications))
    }

    pub fn classifications_from_image(
        &self,
        _image: &Image,
        _n: usize,
    ) -> Result<Vec<Classification>> {
        Err(PerceptionError::Unsupported(Capability::Classifications))
    }

    pub fn do_command(&self, _command: &serde_json::Value) -> Result<serde_json::Value> {
        Err(PerceptionError::Unsupported(Capability::DoCommand))
    }

    fn resolve(&self, camera_name: &str) -> Result<Arc<dyn Camera>> {
        let name = if camera_name.is_empty() {
            self.default_camera.as_str()
        } else {
            camera_name
        };
        self.deps
            .get(name)
            .ok_or_else(|| PerceptionError::DependencyNotFound {
                name: name.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CameraIntrinsics, Point3D, PointCloud};
    use crate::camera::StaticCamera;
    use crate::perception::Geometry;

    fn deps_with(camera: StaticCamera) -> Dependencies {
        Dependencies::new().with_camera(Arc::new(camera))
    }

    fn small_config(camera: &str) -> ServiceConfig {
        ServiceConfig {
            min_points_in_plane: 3,
            min_points_in_segment: 2,
            clustering_radius: 20,
            clustering_strictness: 0.0,
            max_dist_from_plane_mm: 5.0,
            ..ServiceConfig::with_camera(camera)
        }
    }

    #[test]
    fn test_missing_dependency() {
        let err = ObstacleService::new(
            "svc",
            &ServiceConfig::with_camera("ghost"),
            PipelineVariant::PointCloud,
            Dependencies::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PerceptionError::DependencyNotFound { ref name } if name == "ghost"));
    }

    #[test]
    fn test_properties() {
        let svc = ObstacleService::new(
            "svc",
            &ServiceConfig::with_camera("cam"),
            PipelineVariant::PointCloud,
            deps_with(StaticCamera::new("cam")),
        )
        .unwrap();
        let props = svc.properties();
        assert!(props.object_point_clouds_supported);
        assert!(!props.detection_supported);
        assert!(!props.classification_supported);
        assert_eq!(svc.default_camera(), "cam");
    }

    #[test]
    fn test_unsupported_capabilities() {
        let svc = ObstacleService::new(
            "svc",
            &ServiceConfig::with_camera("cam"),
            PipelineVariant::PointCloud,
            deps_with(StaticCamera::new("cam")),
        )
        .unwrap();
        assert!(matches!(
            svc.detections("cam"),
            Err(PerceptionError::Unsupported(Capability::Detections))
        ));
        assert!(matches!(
            svc.classifications("cam", 3),
            Err(PerceptionError::Unsupported(Capability::Classifications))
        ));
        assert!(svc.do_command(&serde_json::json!({"cmd": "x"})).is_err());
        assert!(ObstacleService::client_from_connection("localhost:8080").is_err());
    }

    #[test]
    fn test_point_cloud_variant_clusters() {
        let points = vec![
            Point3D::new(0.0, 0.0, 1000.0),
            Point3D::new(5.0, 0.0, 1000.0),
            Point3D::new(500.0, 0.0, 1000.0),
            Point3D::new(505.0, 0.0, 1000.0),
        ];
        let cam = StaticCamera::new("cam").with_point_cloud(PointCloud::new(points, 0));
        // Collinear points never form a plane, so all four are residual.
        let svc = ObstacleService::new(
            "svc",
            &small_config("cam"),
            PipelineVariant::PointCloud,
            deps_with(cam),
        )
        .unwrap();
        let obstacles = svc
            .detect_obstacles("", &DetectOptions::default(), &CallContext::default())
            .unwrap();
        assert_eq!(obstacles.len(), 2);
        assert!(obstacles.iter().all(|o| o.points.is_none()));
    }

    #[test]
    fn test_depth_variant_without_intrinsics_uses_median() {
        let depth = DepthMap::new(5, 1, vec![1, 2, 3, 4, 5]).unwrap();
        let cam = StaticCamera::new("cam").with_depth_map(depth);
        let svc = ObstacleService::new(
            "svc",
            &ServiceConfig::with_camera("cam"),
            PipelineVariant::Depth,
            deps_with(cam),
        )
        .unwrap();
        let obstacles = svc
            .detect_obstacles("cam", &DetectOptions::default(), &CallContext::default())
            .unwrap();
        assert_eq!(obstacles.len(), 1);
        assert_eq!(obstacles[0].geometry, Geometry::Point { center: [0.0, 0.0, 3.0] });
    }

    #[test]
    fn test_depth_variant_dimension_mismatch_is_acquisition_error() {
        let depth = DepthMap::new(2, 1, vec![100, 100]).unwrap();
        let cam = StaticCamera::new("cam")
            .with_depth_map(depth)
            .with_intrinsics(CameraIntrinsics::new(4, 4, 1.0, 1.0, 0.0, 0.0));
        let svc = ObstacleService::new(
            "svc",
            &ServiceConfig::with_camera("cam"),
            PipelineVariant::Depth,
            deps_with(cam),
        )
        .unwrap();
        let err = svc
            .detect_obstacles("cam", &DetectOptions::default(), &CallContext::default())
            .unwrap_err();
        assert!(matches!(err, PerceptionError::Acquisition { .. }));
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("depth".parse::<PipelineVariant>().unwrap(), PipelineVariant::Depth);
        assert_eq!(
            "PointCloud".parse::<PipelineVariant>().unwrap(),
            PipelineVariant::PointCloud
        );
        assert!("lidar".parse::<PipelineVariant>().is_err());
        assert_eq!(PipelineVariant::Depth.to_string(), "depth");
    }

    #[test]
    fn test_dependencies_debug_lists_names() {
        let deps = deps_with(StaticCamera::new("a")).with_camera(Arc::new(StaticCamera::new("b")));
        assert_eq!(format!("{deps:?}"), r#"{"a", "b"}"#);
        assert_eq!(deps.len(), 2);
    }
}
