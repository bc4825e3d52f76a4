//! Pinhole unprojection of depth maps into point clouds.

use crate::bridge::converters::ConversionError;
use crate::bridge::{CameraIntrinsics, DepthMap, Point3D, PointCloud};

/// Unproject every valid pixel of `depth` through `intrinsics`.
///
/// For pixel `(u, v)` with depth `z` (mm):
/// `x = (u - ppx) * z / fx`, `y = (v - ppy) * z / fy`. When a distortion model
/// is present it is removed from the normalised coordinates first. Zero-depth
/// pixels produce no point. Output order is row-major over valid pixels.
pub fn depth_to_point_cloud(
    depth: &DepthMap,
    intrinsics: &CameraIntrinsics,
) -> Result<PointCloud, ConversionError> {
    intrinsics.check_valid()?;
    if (intrinsics.width, intrinsics.height) != (depth.width(), depth.height()) {
        return Err(ConversionError::DimensionMismatch {
            expected: (intrinsics.width, intrinsics.height),
            got: (depth.width(), depth.height()),
        });
    }

    let distortion = intrinsics.distortion.filter(|d| !d.is_identity());
    let mut points = Vec::with_capacity(depth.valid_count());
    for (idx, &d) in depth.data().iter().enumerate() {
        if d == 0 {
            continue;
        }
        let u = (idx % depth.width()) as f64;
        let v = (idx / depth.width()) as f64;
        let z = f64::from(d);

        let mut xn = (u - intrinsics.ppx) / intrinsics.fx;
        let mut yn = (v - intrinsics.ppy) / intrinsics.fy;
        if let Some(model) = &distortion {
            (xn, yn) = model.undistort(xn, yn);
        }
        points.push(Point3D::new((xn * z) as f32, (yn * z) as f32, z as f32));
    }
    Ok(PointCloud::new(points, 0))
}
