//! Tunable parameters for ground removal and radius clustering.
//!
//! [`ClusterParams`] is the raw, serialisable form a caller fills in.
//! [`ClusterParams::validate`] is the only way to obtain a [`ClusterConfig`],
//! whose fields are private and therefore immutable once checked.
//!
//! Validation policy:
//!
//! | field | rule |
//! |---|---|
//! | `min_points_in_plane` | > 0 |
//! | `min_points_in_segment` | > 0 |
//! | `clustering_radius` | > 0 |
//! | `max_dist_from_plane_mm` | >= 0 |
//! | `clustering_strictness` | >= 0 |
//! | `ground_angle_tolerance_degs` | 0 ..= 180 |
//! | `ground_plane_normal_vec` | finite; all-zero selects [`DEFAULT_GROUND_NORMAL`] |
//! | `ransac_iterations` | > 0 |

use crate::perception::{PerceptionError, Result};

use serde::{Deserialize, Serialize};

/// Ground normal in camera space when none is configured: the camera's
/// y axis points down, so the floor faces -y.
pub const DEFAULT_GROUND_NORMAL: [f64; 3] = [0.0, -1.0, 0.0];

pub const DEFAULT_MIN_POINTS_IN_PLANE: i64 = 500;
pub const DEFAULT_MIN_POINTS_IN_SEGMENT: i64 = 10;
pub const DEFAULT_MAX_DIST_FROM_PLANE_MM: f64 = 100.0;
pub const DEFAULT_ANGLE_TOLERANCE_DEGS: f64 = 30.0;
pub const DEFAULT_CLUSTERING_RADIUS_MM: i64 = 1;
pub const DEFAULT_CLUSTERING_STRICTNESS: f64 = 5.0;
pub const DEFAULT_RANSAC_ITERATIONS: i64 = 2000;

/// Radius shrink per unit of strictness.
pub const STRICTNESS_SHRINK: f64 = 0.1;

// ---------------------------------------------------------------------------
// Unvalidated parameters
// ---------------------------------------------------------------------------

/// Raw clustering parameters, as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub min_points_in_plane: i64,
    pub min_points_in_segment: i64,
    pub max_dist_from_plane_mm: f64,
    pub ground_normal: [f64; 3],
    pub angle_tolerance_degs: f64,
    pub clustering_radius_mm: i64,
    pub clustering_strictness: f64,
    pub ransac_iterations: i64,
    pub ransac_seed: u64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_points_in_plane: DEFAULT_MIN_POINTS_IN_PLANE,
            min_points_in_segment: DEFAULT_MIN_POINTS_IN_SEGMENT,
            max_dist_from_plane_mm: DEFAULT_MAX_DIST_FROM_PLANE_MM,
            ground_normal: DEFAULT_GROUND_NORMAL,
            angle_tolerance_degs: DEFAULT_ANGLE_TOLERANCE_DEGS,
            clustering_radius_mm: DEFAULT_CLUSTERING_RADIUS_MM,
            clustering_strictness: DEFAULT_CLUSTERING_STRICTNESS,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
            ransac_seed: 0,
        }
    }
}

impl ClusterParams {
    /// Check every field and produce an immutable [`ClusterConfig`].
    ///
    /// Returns [`PerceptionError::Configuration`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<ClusterConfig> {
        let min_points_in_plane = positive_count("min_points_in_plane", self.min_points_in_plane)?;
        let min_points_in_segment =
            positive_count("min_points_in_segment", self.min_points_in_segment)?;
        let clustering_radius_mm =
            positive_count("clustering_radius", self.clustering_radius_mm)? as f64;
        let ransac_iterations = positive_count("ransac_iterations", self.ransac_iterations)?;

        non_negative("max_dist_from_plane_mm", self.max_dist_from_plane_mm)?;
        non_negative("clustering_strictness", self.clustering_strictness)?;
        non_negative("ground_angle_tolerance_degs", self.angle_tolerance_degs)?;
        if self.angle_tolerance_degs > 180.0 {
            return Err(PerceptionError::config(
                "ground_angle_tolerance_degs",
                format!("must be at most 180, got {}", self.angle_tolerance_degs),
            ));
        }

        let ground_normal = unit_normal(self.ground_normal)?;

        Ok(ClusterConfig {
            min_points_in_plane,
            min_points_in_segment,
            max_dist_from_plane_mm: self.max_dist_from_plane_mm,
            ground_normal,
            angle_tolerance_degs: self.angle_tolerance_degs,
            clustering_radius_mm,
            clustering_strictness: self.clustering_strictness,
            ransac_iterations,
            ransac_seed: self.ransac_seed,
        })
    }
}

fn positive_count(field: &'static str, value: i64) -> Result<usize> {
    if value <= 0 {
        return Err(PerceptionError::config(
            field,
            format!("must be positive, got {value}"),
        ));
    }
    usize::try_from(value)
        .map_err(|_| PerceptionError::config(field, format!("{value} is out of range")))
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(PerceptionError::config(
            field,
            format!("must be finite, got {value}"),
        ));
    }
    if value < 0.0 {
        return Err(PerceptionError::config(
            field,
            format!("must be non-negative, got {value}"),
        ));
    }
    Ok(())
}

fn unit_normal(v: [f64; 3]) -> Result<[f64; 3]> {
    if v.iter().any(|c| !c.is_finite()) {
        return Err(PerceptionError::config(
            "ground_plane_normal_vec",
            format!("components must be finite, got {v:?}"),
        ));
    }
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm == 0.0 {
        return Ok(DEFAULT_GROUND_NORMAL);
    }
    Ok([v[0] / norm, v[1] / norm, v[2] / norm])
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// Validated clustering configuration. Construct through
/// [`ClusterParams::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterConfig {
    min_points_in_plane: usize,
    min_points_in_segment: usize,
    max_dist_from_plane_mm: f64,
    ground_normal: [f64; 3],
    angle_tolerance_degs: f64,
    clustering_radius_mm: f64,
    clustering_strictness: f64,
    ransac_iterations: usize,
    ransac_seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_points_in_plane: DEFAULT_MIN_POINTS_IN_PLANE as usize,
            min_points_in_segment: DEFAULT_MIN_POINTS_IN_SEGMENT as usize,
            max_dist_from_plane_mm: DEFAULT_MAX_DIST_FROM_PLANE_MM,
            ground_normal: DEFAULT_GROUND_NORMAL,
            angle_tolerance_degs: DEFAULT_ANGLE_TOLERANCE_DEGS,
            clustering_radius_mm: DEFAULT_CLUSTERING_RADIUS_MM as f64,
            clustering_strictness: DEFAULT_CLUSTERING_STRICTNESS,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS as usize,
            ransac_seed: 0,
        }
    }
}

impl ClusterConfig {
    pub fn min_points_in_plane(&self) -> usize {
        self.min_points_in_plane
    }

    pub fn min_points_in_segment(&self) -> usize {
        self.min_points_in_segment
    }

    pub fn max_dist_from_plane_mm(&self) -> f64 {
        self.max_dist_from_plane_mm
    }

    /// Unit-length expected ground normal.
    pub fn ground_normal(&self) -> [f64; 3] {
        self.ground_normal
    }

    pub fn angle_tolerance_degs(&self) -> f64 {
        self.angle_tolerance_degs
    }

    pub fn clustering_radius_mm(&self) -> f64 {
        self.clustering_radius_mm
    }

    pub fn clustering_strictness(&self) -> f64 {
        self.clustering_strictness
    }

    pub fn ransac_iterations(&self) -> usize {
        self.ransac_iterations
    }

    pub fn ransac_seed(&self) -> u64 {
        self.ransac_seed
    }

    /// Linkage distance actually used by the clustering engine.
    ///
    /// `clustering_radius / (1 + STRICTNESS_SHRINK * strictness)`: zero
    /// strictness links at the full radius, larger values demand closer
    /// neighbours before two points merge.
    pub fn effective_radius_mm(&self) -> f64 {
        effective_radius(self.clustering_radius_mm, self.clustering_strictness)
    }

    /// Back to the raw, serialisable form.
    pub fn to_params(&self) -> ClusterParams {
        ClusterParams {
            min_points_in_plane: self.min_points_in_plane as i64,
            min_points_in_segment: self.min_points_in_segment as i64,
            max_dist_from_plane_mm: self.max_dist_from_plane_mm,
            ground_normal: self.ground_normal,
            angle_tolerance_degs: self.angle_tolerance_degs,
            clustering_radius_mm: self.clustering_radius_mm as i64,
            clustering_strictness: self.clustering_strictness,
            ransac_iterations: self.ransac_iterations as i64,
            ransac_seed: self.ransac_seed,
        }
    }
}

/// See [`ClusterConfig::effective_radius_mm`].
pub fn effective_radius(radius: f64, strictness: f64) -> f64 {
    radius / (1.0 + STRICTNESS_SHRINK * strictness.max(0.0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: PerceptionError) -> &'static str {
        match err {
            PerceptionError::Configuration { field, .. } => field,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_validate() {
        let cfg = ClusterParams::default().validate().unwrap();
        assert_eq!(cfg, ClusterConfig::default());
        assert_eq!(cfg.min_points_in_plane(), 500);
        assert_eq!(cfg.min_points_in_segment(), 10);
        assert_eq!(cfg.ground_normal(), DEFAULT_GROUND_NORMAL);
    }

    #[test]
    fn test_negative_radius_rejected() {
        let params = ClusterParams {
            clustering_radius_mm: -1,
            ..ClusterParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("clustering_radius"));
        assert_eq!(field_of(err), "clustering_radius");
    }

    #[test]
    fn test_zero_radius_rejected() {
        let params = ClusterParams {
            clustering_radius_mm: 0,
            ..ClusterParams::default()
        };
        assert_eq!(field_of(params.validate().unwrap_err()), "clustering_radius");
    }

    #[test]
    fn test_zero_counts_rejected() {
        let params = ClusterParams {
            min_points_in_plane: 0,
            ..ClusterParams::default()
        };
        assert_eq!(field_of(params.validate().unwrap_err()), "min_points_in_plane");

        let params = ClusterParams {
            min_points_in_segment: 0,
            ..ClusterParams::default()
        };
        assert_eq!(field_of(params.validate().unwrap_err()), "min_points_in_segment");
    }

    #[test]
    fn test_negative_tolerances_rejected() {
        let params = ClusterParams {
            max_dist_from_plane_mm: -0.5,
            ..ClusterParams::default()
        };
        assert_eq!(field_of(params.validate().unwrap_err()), "max_dist_from_plane_mm");

        let params = ClusterParams {
            clustering_strictness: -1.0,
            ..ClusterParams::default()
        };
        assert_eq!(field_of(params.validate().unwrap_err()), "clustering_strictness");

        let params = ClusterParams {
            angle_tolerance_degs: 181.0,
            ..ClusterParams::default()
        };
        assert_eq!(
            field_of(params.validate().unwrap_err()),
            "ground_angle_tolerance_degs"
        );
    }

    #[test]
    fn test_nan_rejected() {
        let params = ClusterParams {
            max_dist_from_plane_mm: f64::NAN,
            ..ClusterParams::default()
        };
        assert!(params.validate().is_err());

        let params = ClusterParams {
            ground_normal: [0.0, f64::INFINITY, 0.0],
            ..ClusterParams::default()
        };
        assert_eq!(field_of(params.validate().unwrap_err()), "ground_plane_normal_vec");
    }

    #[test]
    fn test_zero_tolerances_allowed() {
        let params = ClusterParams {
            max_dist_from_plane_mm: 0.0,
            clustering_strictness: 0.0,
            angle_tolerance_degs: 0.0,
            ..ClusterParams::default()
        };
        let cfg = params.validate().unwrap();
        assert_eq!(cfg.effective_radius_mm(), cfg.clustering_radius_mm());
    }

    #[test]
    fn test_normal_is_normalised() {
        let params = ClusterParams {
            ground_normal: [0.0, 0.0, 5.0],
            ..ClusterParams::default()
        };
        assert_eq!(params.validate().unwrap().ground_normal(), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_zero_normal_uses_default() {
        let params = ClusterParams {
            ground_normal: [0.0; 3],
            ..ClusterParams::default()
        };
        assert_eq!(params.validate().unwrap().ground_normal(), DEFAULT_GROUND_NORMAL);
    }

    #[test]
    fn test_effective_radius_shrinks_with_strictness() {
        assert!((effective_radius(10.0, 0.0) - 10.0).abs() < 1e-12);
        assert!((effective_radius(10.0, 10.0) - 5.0).abs() < 1e-12);
        assert!(effective_radius(10.0, 3.0) < effective_radius(10.0, 1.0));
    }

    #[test]
    fn test_params_serde_roundtrip() {
        let params = ClusterParams {
            clustering_radius_mm: 25,
            ransac_seed: 42,
            ..ClusterParams::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let restored: ClusterParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, restored);
        assert_eq!(restored.validate().unwrap().to_params(), params);
    }
}
