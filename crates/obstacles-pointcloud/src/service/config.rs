//! Service configuration as supplied by the registry, in JSON.
//!
//! Keys that are absent take the documented defaults. Keys that are present
//! are never replaced: an out-of-range value is a configuration error naming
//! the JSON key.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::perception::config::{
    ClusterConfig, ClusterParams, DEFAULT_ANGLE_TOLERANCE_DEGS, DEFAULT_CLUSTERING_RADIUS_MM,
    DEFAULT_CLUSTERING_STRICTNESS, DEFAULT_MAX_DIST_FROM_PLANE_MM, DEFAULT_MIN_POINTS_IN_PLANE,
    DEFAULT_MIN_POINTS_IN_SEGMENT, DEFAULT_RANSAC_ITERATIONS,
};
use crate::perception::{PerceptionError, Result};

/// `{x, y, z}` vector as written in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalVec {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl NormalVec {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Obstacle service attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Default camera dependency. Required.
    #[serde(default)]
    pub camera_name: String,
    #[serde(default = "default_min_points_in_plane")]
    pub min_points_in_plane: i64,
    #[serde(default = "default_min_points_in_segment")]
    pub min_points_in_segment: i64,
    #[serde(default = "default_max_dist_from_plane_mm")]
    pub max_dist_from_plane_mm: f64,
    /// Linkage radius in millimetres.
    #[serde(default = "default_clustering_radius")]
    pub clustering_radius: i64,
    #[serde(default = "default_clustering_strictness")]
    pub clustering_strictness: f64,
    #[serde(default = "default_ground_angle_tolerance_degs")]
    pub ground_angle_tolerance_degs: f64,
    /// Expected floor normal; absent or all-zero selects `(0, -1, 0)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_plane_normal_vec: Option<NormalVec>,
    #[serde(default = "default_ransac_iterations")]
    pub ransac_iterations: i64,
    #[serde(default)]
    pub ransac_seed: u64,
    /// Attach member points to every obstacle.
    #[serde(default)]
    pub include_points: bool,
}

fn default_min_points_in_plane() -> i64 {
    DEFAULT_MIN_POINTS_IN_PLANE
}

fn default_min_points_in_segment() -> i64 {
    DEFAULT_MIN_POINTS_IN_SEGMENT
}

fn default_max_dist_from_plane_mm() -> f64 {
    DEFAULT_MAX_DIST_FROM_PLANE_MM
}

fn default_clustering_radius() -> i64 {
    DEFAULT_CLUSTERING_RADIUS_MM
}

fn default_clustering_strictness() -> f64 {
    DEFAULT_CLUSTERING_STRICTNESS
}

fn default_ground_angle_tolerance_degs() -> f64 {
    DEFAULT_ANGLE_TOLERANCE_DEGS
}

fn default_ransac_iterations() -> i64 {
    DEFAULT_RANSAC_ITERATIONS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            camera_name: String::new(),
            min_points_in_plane: DEFAULT_MIN_POINTS_IN_PLANE,
            min_points_in_segment: DEFAULT_MIN_POINTS_IN_SEGMENT,
            max_dist_from_plane_mm: DEFAULT_MAX_DIST_FROM_PLANE_MM,
            clustering_radius: DEFAULT_CLUSTERING_RADIUS_MM,
            clustering_strictness: DEFAULT_CLUSTERING_STRICTNESS,
            ground_angle_tolerance_degs: DEFAULT_ANGLE_TOLERANCE_DEGS,
            ground_plane_normal_vec: None,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
            ransac_seed: 0,
            include_points: false,
        }
    }
}

impl ServiceConfig {
    /// Defaults with the given camera.
    pub fn with_camera(camera_name: impl Into<String>) -> Self {
        Self {
            camera_name: camera_name.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PerceptionError::config("config", e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PerceptionError::config("config", format!("{}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Check every attribute and return the names of required dependencies.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.camera_name.trim().is_empty() {
            return Err(PerceptionError::config(
                "camera_name",
                "expected a camera name for obstacle detection",
            ));
        }
        self.cluster_config()?;
        Ok(vec![self.camera_name.clone()])
    }

    /// The clustering attributes in unvalidated form.
    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            min_points_in_plane: self.min_points_in_plane,
            min_points_in_segment: self.min_points_in_segment,
            max_dist_from_plane_mm: self.max_dist_from_plane_mm,
            ground_normal: self
                .ground_plane_normal_vec
                .map(NormalVec::to_array)
                .unwrap_or([0.0; 3]),
            angle_tolerance_degs: self.ground_angle_tolerance_degs,
            clustering_radius_mm: self.clustering_radius,
            clustering_strictness: self.clustering_strictness,
            ransac_iterations: self.ransac_iterations,
            ransac_seed: self.ransac_seed,
        }
    }

    /// Validated, immutable clustering configuration.
    pub fn cluster_config(&self) -> Result<ClusterConfig> {
        self.cluster_params().validate()
    }
}
