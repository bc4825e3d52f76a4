//! The camera collaborator.
//!
//! The pipeline borrows cameras through the [`Camera`] trait and never owns
//! their lifecycle. [`StaticCamera`] replays a fixed frame from memory and is
//! what tests and the CLI use.

use crate::bridge::converters::{self, ConversionError};
use crate::bridge::{CameraIntrinsics, DepthMap, Image, PointCloud};
use crate::perception::projection;

/// Errors a camera can report for a single request.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The device did not produce a frame.
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    /// The device cannot serve this kind of request.
    #[error("camera does not support {0}")]
    NotSupported(&'static str),
    /// The frame arrived but could not be decoded.
    #[error(transparent)]
    Decode(#[from] ConversionError),
}

/// A source of point clouds and depth images.
pub trait Camera: Send + Sync {
    fn name(&self) -> &str;

    /// The next point cloud in camera space, millimetres.
    fn next_point_cloud(&self) -> Result<PointCloud, CameraError>;

    /// The current image.
    fn image(&self) -> Result<Image, CameraError>;

    /// Calibration, when the device has one. `Ok(None)` means the camera
    /// answered but is uncalibrated.
    fn intrinsics(&self) -> Result<Option<CameraIntrinsics>, CameraError>;

    /// The current image interpreted as a depth map.
    fn depth_map(&self) -> Result<DepthMap, CameraError> {
        let image = self.image()?;
        Ok(converters::image_to_depth_map(&image)?)
    }
}

// ---------------------------------------------------------------------------
// In-memory camera
// ---------------------------------------------------------------------------

/// A camera that serves the same frame on every request.
///
/// Requests for which no data was supplied fail with
/// [`CameraError::NotSupported`]. When only an image and intrinsics are
/// given, `next_point_cloud` projects the image.
#[derive(Debug, Clone, Default)]
pub struct StaticCamera {
    name: String,
    cloud: Option<PointCloud>,
    image: Option<Image>,
    intrinsics: Option<CameraIntrinsics>,
    intrinsics_error: Option<String>,
    failure: Option<String>,
}

impl StaticCamera {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_point_cloud(mut self, cloud: PointCloud) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn with_image(mut self, image: Image) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_depth_map(self, depth: DepthMap) -> Self {
        self.with_image(Image::Depth(depth))
    }

    pub fn with_intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }

    /// Make `intrinsics()` fail, as a device whose properties query errors.
    pub fn with_intrinsics_error(mut self, reason: impl Into<String>) -> Self {
        self.intrinsics_error = Some(reason.into());
        self
    }

    /// Make every frame request fail with [`CameraError::Unavailable`].
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    fn check_available(&self) -> Result<(), CameraError> {
        match &self.failure {
            Some(reason) => Err(CameraError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl Camera for StaticCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_point_cloud(&self) -> Result<PointCloud, CameraError> {
        self.check_available()?;
        if let Some(cloud) = &self.cloud {
            return Ok(cloud.clone());
        }
        match (&self.image, &self.intrinsics) {
            (Some(image), Some(k)) => {
                let depth = converters::image_to_depth_map(image)?;
                Ok(projection::depth_to_point_cloud(&depth, k)?)
            }
            _ => Err(CameraError::NotSupported("point clouds")),
        }
    }

    fn image(&self) -> Result<Image, CameraError> {
        self.check_available()?;
        self.image.clone().ok_or(CameraError::NotSupported("images"))
    }

    fn intrinsics(&self) -> Result<Option<CameraIntrinsics>, CameraError> {
        if let Some(reason) = &self.intrinsics_error {
            return Err(CameraError::Unavailable(reason.clone()));
        }
        Ok(self.intrinsics.clone())
    }
}
