//! Ground-plane estimation by constrained RANSAC.
//!
//! Candidate planes are drawn from random 3-point samples. A candidate is only
//! scored when its normal lies within the configured angular tolerance of the
//! expected ground normal, so walls and other steep flat surfaces are never
//! mistaken for the floor. The best candidate (most inliers, then lowest total
//! inlier distance) is accepted if it has at least `min_points_in_plane`
//! inliers.
//!
//! Sampling uses a `StdRng` seeded from the configuration, so the same cloud
//! and config always produce the same split. `ransac_iterations` is an upper
//! bound: once the best candidate's inlier ratio makes an all-inlier sample
//! near certain to have been drawn ([`RANSAC_CONFIDENCE`]), the search stops.

use crate::bridge::{Point3D, PointCloud};
use crate::perception::config::ClusterConfig;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Probability of having drawn at least one all-inlier sample before the
/// search stops early.
pub const RANSAC_CONFIDENCE: f64 = 0.999;

// ---------------------------------------------------------------------------
// Plane model
// ---------------------------------------------------------------------------

/// A plane `normal . p + offset = 0` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneModel {
    normal: [f64; 3],
    offset: f64,
}

impl PlaneModel {
    /// Build from a normal (any length) and a point on the plane.
    ///
    /// Returns `None` for a zero or non-finite normal.
    pub fn from_point_normal(point: [f64; 3], normal: [f64; 3]) -> Option<Self> {
        let n = normalize(normal)?;
        Some(Self {
            normal: n,
            offset: -dot(n, point),
        })
    }

    /// Plane through three points, or `None` if they are collinear.
    pub fn from_points(a: &Point3D, b: &Point3D, c: &Point3D) -> Option<Self> {
        let a = a.as_f64_array();
        let b = b.as_f64_array();
        let c = c.as_f64_array();
        let u = sub(b, a);
        let v = sub(c, a);
        Self::from_point_normal(a, cross(u, v))
    }

    pub fn normal(&self) -> [f64; 3] {
        self.normal
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn signed_distance(&self, p: &Point3D) -> f64 {
        dot(self.normal, p.as_f64_array()) + self.offset
    }

    pub fn distance(&self, p: &Point3D) -> f64 {
        self.signed_distance(p).abs()
    }

    /// The same plane with its normal flipped, if needed, to point into the
    /// half-space of `reference`.
    pub fn oriented_towards(self, reference: [f64; 3]) -> Self {
        if dot(self.normal, reference) < 0.0 {
            Self {
                normal: [-self.normal[0], -self.normal[1], -self.normal[2]],
                offset: -self.offset,
            }
        } else {
            self
        }
    }

    /// Angle in degrees between this plane's normal and `direction`.
    pub fn angle_to_degs(&self, direction: [f64; 3]) -> f64 {
        match normalize(direction) {
            Some(d) => dot(self.normal, d).clamp(-1.0, 1.0).acos().to_degrees(),
            None => 90.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Segmentation result
// ---------------------------------------------------------------------------

/// Split of a cloud into ground inliers and residual (candidate obstacle)
/// points. Index lists are ascending and together cover every input index
/// exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundSegmentation {
    plane: Option<PlaneModel>,
    inliers: Vec<usize>,
    residual: Vec<usize>,
}

impl GroundSegmentation {
    /// The outcome when no acceptable plane exists: every point is residual.
    pub fn no_plane(len: usize) -> Self {
        Self {
            plane: None,
            inliers: Vec::new(),
            residual: (0..len).collect(),
        }
    }

    pub fn plane(&self) -> Option<&PlaneModel> {
        self.plane.as_ref()
    }

    pub fn found(&self) -> bool {
        self.plane.is_some()
    }

    pub fn inliers(&self) -> &[usize] {
        &self.inliers
    }

    pub fn residual(&self) -> &[usize] {
        &self.residual
    }

    pub fn ground_cloud(&self, cloud: &PointCloud) -> PointCloud {
        cloud.subset(&self.inliers)
    }

    pub fn residual_cloud(&self, cloud: &PointCloud) -> PointCloud {
        cloud.subset(&self.residual)
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Fit the dominant ground plane of `cloud` under `config`.
///
/// Never fails: an empty cloud, a cloud smaller than `min_points_in_plane`,
/// or one with no acceptable plane yields [`GroundSegmentation::no_plane`].
pub fn estimate_ground_plane(cloud: &PointCloud, config: &ClusterConfig) -> GroundSegmentation {
    let points = &cloud.points;
    let n = points.len();
    if n < 3 || n < config.min_points_in_plane() {
        debug!(points = n, "too few points for a ground plane");
        return GroundSegmentation::no_plane(n);
    }

    let ground = config.ground_normal();
    let tolerance = config.angle_tolerance_degs();
    let threshold = config.max_dist_from_plane_mm();
    let mut rng = StdRng::seed_from_u64(config.ransac_seed());

    let max_iterations = config.ransac_iterations();
    let mut needed = max_iterations;
    let mut drawn = 0;
    let mut best: Option<(PlaneModel, usize, f64)> = None;
    while drawn < needed {
        drawn += 1;
        let sample = index::sample(&mut rng, n, 3);
        let (a, b, c) = (sample.index(0), sample.index(1), sample.index(2));
        let Some(candidate) = PlaneModel::from_points(&points[a], &points[b], &points[c]) else {
            continue;
        };
        let candidate = candidate.oriented_towards(ground);
        if candidate.angle_to_degs(ground) > tolerance {
            continue;
        }

        let (count, spread) = score(&candidate, points, threshold);
        let better = match best {
            None => count > 0,
            Some((_, best_count, best_spread)) => {
                count > best_count || (count == best_count && spread < best_spread)
            }
        };
        if better {
            best = Some((candidate, count, spread));
            needed = needed.min(iterations_for(count as f64 / n as f64));
        }
    }
    debug!(drawn, max_iterations, "ransac sampling done");

    let Some((plane, count, _)) = best else {
        debug!(points = n, "no plane within angle tolerance");
        return GroundSegmentation::no_plane(n);
    };
    if count < config.min_points_in_plane() {
        debug!(
            inliers = count,
            required = config.min_points_in_plane(),
            "best ground candidate rejected"
        );
        return GroundSegmentation::no_plane(n);
    }

    let (inliers, residual): (Vec<usize>, Vec<usize>) =
        (0..n).partition(|&i| plane.distance(&points[i]) <= threshold);
    debug!(
        inliers = inliers.len(),
        residual = residual.len(),
        normal = ?plane.normal(),
        "ground plane found"
    );
    GroundSegmentation {
        plane: Some(plane),
        inliers,
        residual,
    }
}

/// Samples needed to draw one all-inlier triple with [`RANSAC_CONFIDENCE`]
/// when a fraction `inlier_ratio` of the cloud fits the plane.
fn iterations_for(inlier_ratio: f64) -> usize {
    let all_inliers = inlier_ratio.clamp(0.0, 1.0).powi(3);
    if all_inliers >= 1.0 {
        return 1;
    }
    let k = (1.0 - RANSAC_CONFIDENCE).ln() / (-all_inliers).ln_1p();
    if k.is_finite() {
        k.ceil().max(1.0) as usize
    } else {
        usize::MAX
    }
}

fn score(plane: &PlaneModel, points: &[Point3D], threshold: f64) -> (usize, f64) {
    let mut count = 0usize;
    let mut spread = 0.0_f64;
    for p in points {
        let d = plane.distance(p);
        if d <= threshold {
            count += 1;
            spread += d;
        }
    }
    (count, spread)
}

// -- vector helpers ---------------------------------------------------------

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f64; 3]) -> Option<[f64; 3]> {
    let norm = dot(v, v).sqrt();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    Some([v[0] / norm, v[1] / norm, v[2] / norm])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
