//! Core sensor types shared by every pipeline stage.
//!
//! All coordinates are camera-space millimetres. Point clouds are produced by
//! cameras or by the depth projector and are never mutated by the clustering
//! stages, which read them and build new collections instead.

pub mod converters;
pub mod indexing;

use serde::{Deserialize, Serialize};

// Re-exports
pub use converters::ConversionError;
pub use indexing::{IndexError, VoxelGrid};

// ---------------------------------------------------------------------------
// Points and clouds
// ---------------------------------------------------------------------------

/// 3D point in camera space (millimetres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance, accumulated in `f64`.
    pub fn distance_sq(&self, other: &Point3D) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        let dz = self.z as f64 - other.z as f64;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance_to(&self, other: &Point3D) -> f64 {
        self.distance_sq(other).sqrt()
    }

    pub fn as_f64_array(&self) -> [f64; 3] {
        [self.x as f64, self.y as f64, self.z as f64]
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// An unordered collection of points from a sensor.
///
/// `intensities` is either empty or parallel to `points`; the clustering
/// stages ignore it but carry it into obstacle member clouds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<Point3D>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intensities: Vec<f32>,
    pub timestamp_us: i64,
    #[serde(default)]
    pub frame_id: String,
}

impl PointCloud {
    pub fn new(points: Vec<Point3D>, timestamp: i64) -> Self {
        Self {
            points,
            intensities: Vec::new(),
            timestamp_us: timestamp,
            frame_id: String::new(),
        }
    }

    /// Attach per-point intensities. Ignored unless the length matches.
    pub fn with_intensities(mut self, intensities: Vec<f32>) -> Self {
        if intensities.len() == self.points.len() {
            self.intensities = intensities;
        }
        self
    }

    pub fn with_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = frame_id.into();
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_intensities(&self) -> bool {
        !self.intensities.is_empty() && self.intensities.len() == self.points.len()
    }

    /// Build a new cloud holding the points at `indices`, in that order.
    ///
    /// Out-of-range indices are skipped.
    pub fn subset(&self, indices: &[usize]) -> PointCloud {
        let points: Vec<Point3D> = indices
            .iter()
            .filter_map(|&i| self.points.get(i).copied())
            .collect();
        let intensities = if self.has_intensities() {
            indices
                .iter()
                .filter_map(|&i| self.intensities.get(i).copied())
                .collect()
        } else {
            Vec::new()
        };
        PointCloud {
            points,
            intensities,
            timestamp_us: self.timestamp_us,
            frame_id: self.frame_id.clone(),
        }
    }

    /// Arithmetic mean of all points, or `None` for an empty cloud.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        centroid(&self.points)
    }

    /// Axis-aligned bounds `(min, max)`, or `None` for an empty cloud.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        bounds(&self.points)
    }
}

/// Mean of a point slice.
pub fn centroid(points: &[Point3D]) -> Option<[f64; 3]> {
    if points.is_empty() {
        return None;
    }
    let (mut sx, mut sy, mut sz) = (0.0_f64, 0.0_f64, 0.0_f64);
    for p in points {
        sx += p.x as f64;
        sy += p.y as f64;
        sz += p.z as f64;
    }
    let n = points.len() as f64;
    Some([sx / n, sy / n, sz / n])
}

/// Axis-aligned bounding box of a point slice.
pub fn bounds(points: &[Point3D]) -> Option<([f64; 3], [f64; 3])> {
    if points.is_empty() {
        return None;
    }
    let mut min = [f64::MAX; 3];
    let mut max = [f64::MIN; 3];
    for p in points {
        let a = p.as_f64_array();
        for k in 0..3 {
            min[k] = min[k].min(a[k]);
            max[k] = max[k].max(a[k]);
        }
    }
    Some((min, max))
}

// ---------------------------------------------------------------------------
// Depth maps and calibration
// ---------------------------------------------------------------------------

/// A dense depth image, row-major, one `u16` millimetre sample per pixel.
///
/// A sample of `0` means "no return" and is never treated as a measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDepthMap")]
pub struct DepthMap {
    width: usize,
    height: usize,
    data: Vec<u16>,
}

#[derive(Deserialize)]
struct RawDepthMap {
    width: usize,
    height: usize,
    data: Vec<u16>,
}

impl TryFrom<RawDepthMap> for DepthMap {
    type Error = ConversionError;

    fn try_from(raw: RawDepthMap) -> Result<Self, Self::Error> {
        DepthMap::new(raw.width, raw.height, raw.data)
    }
}

impl DepthMap {
    /// Wrap a row-major sample buffer. Fails if `data.len() != width * height`.
    pub fn new(width: usize, height: usize, data: Vec<u16>) -> Result<Self, ConversionError> {
        let expected = width.checked_mul(height).ok_or(ConversionError::LengthMismatch {
            expected: usize::MAX,
            got: data.len(),
        })?;
        if data.len() != expected {
            return Err(ConversionError::LengthMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw sample buffer, row-major.
    pub fn data(&self) -> &[u16] {
        &self.data
    }

    /// Depth at column `u`, row `v`, or `None` outside the image.
    pub fn get(&self, u: usize, v: usize) -> Option<u16> {
        if u >= self.width || v >= self.height {
            return None;
        }
        self.data.get(v * self.width + u).copied()
    }

    /// Iterate over non-zero samples.
    pub fn valid_samples(&self) -> impl Iterator<Item = u16> + '_ {
        self.data.iter().copied().filter(|&d| d != 0)
    }

    pub fn valid_count(&self) -> usize {
        self.valid_samples().count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Brown-Conrady lens distortion coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub p1: f64,
    pub p2: f64,
}

impl BrownConrady {
    /// Apply distortion to normalised image coordinates.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let xd = x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (xd, yd)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration.
    pub fn undistort(&self, xd: f64, yd: f64) -> (f64, f64) {
        const ITERATIONS: usize = 10;
        let (mut x, mut y) = (xd, yd);
        for _ in 0..ITERATIONS {
            let r2 = x * x + y * y;
            let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
            if radial.abs() < f64::EPSILON {
                break;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (xd - dx) / radial;
            y = (yd - dy) / radial;
        }
        (x, y)
    }

    pub fn is_identity(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.k3 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0
    }
}

/// Pinhole camera calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub width: usize,
    pub height: usize,
    pub fx: f64,
    pub fy: f64,
    pub ppx: f64,
    pub ppy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distortion: Option<BrownConrady>,
}

impl CameraIntrinsics {
    pub fn new(width: usize, height: usize, fx: f64, fy: f64, ppx: f64, ppy: f64) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            ppx,
            ppy,
            distortion: None,
        }
    }

    pub fn with_distortion(mut self, distortion: BrownConrady) -> Self {
        self.distortion = Some(distortion);
        self
    }

    /// Check that focal lengths are positive and every parameter is finite.
    pub fn check_valid(&self) -> Result<(), ConversionError> {
        let finite = [self.fx, self.fy, self.ppx, self.ppy]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(ConversionError::InvalidIntrinsics(format!(
                "fx={} fy={} ppx={} ppy={}",
                self.fx, self.fy, self.ppx, self.ppy
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConversionError::InvalidIntrinsics(format!(
                "image size {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Camera images
// ---------------------------------------------------------------------------

/// A frame as delivered by a camera's image endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Image {
    /// Already-decoded depth samples.
    Depth(DepthMap),
    /// Undecoded 16-bit little-endian depth buffer.
    RawDepth {
        width: usize,
        height: usize,
        bytes: Vec<u8>,
    },
    /// Packed 8-bit RGB. Cannot be interpreted as depth.
    Rgb {
        width: usize,
        height: usize,
        bytes: Vec<u8>,
    },
}

impl Image {
    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            Self::Depth(dm) => (dm.width(), dm.height()),
            Self::RawDepth { width, height, .. } | Self::Rgb { width, height, .. } => {
                (*width, *height)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
