//! Decoding of raw sensor payloads into bridge types.
//!
//! Covers the three inputs the pipeline accepts from the outside world: a raw
//! 16-bit depth buffer, a camera [`Image`], and point-cloud files in ASCII PCD
//! or whitespace-separated XYZ form.

use crate::bridge::{DepthMap, Image, Point3D, PointCloud};

use std::path::Path;

/// Errors that can occur while decoding sensor payloads.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// A buffer length does not match the declared dimensions.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    /// The input collection was empty when a non-empty one was required.
    #[error("empty input")]
    EmptyInput,
    /// The image carries no depth information.
    #[error("image is not a depth map: {0}")]
    NotDepth(&'static str),
    /// Calibration parameters are unusable.
    #[error("invalid intrinsics: {0}")]
    InvalidIntrinsics(String),
    /// Calibration and depth map disagree on image size.
    #[error("intrinsics are for {expected:?} but depth map is {got:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// A text point-cloud file could not be parsed.
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Depth buffers
// ---------------------------------------------------------------------------

/// Decode a row-major little-endian `u16` depth buffer.
pub fn decode_raw_depth(
    width: usize,
    height: usize,
    bytes: &[u8],
) -> Result<DepthMap, ConversionError> {
    let expected = width.saturating_mul(height).saturating_mul(2);
    if bytes.len() != expected {
        return Err(ConversionError::LengthMismatch {
            expected,
            got: bytes.len(),
        });
    }
    let data = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    DepthMap::new(width, height, data)
}

/// Encode a depth map back into the raw little-endian layout.
pub fn encode_raw_depth(depth: &DepthMap) -> Vec<u8> {
    depth.data().iter().flat_map(|d| d.to_le_bytes()).collect()
}

/// Interpret a camera image as a depth map.
pub fn image_to_depth_map(image: &Image) -> Result<DepthMap, ConversionError> {
    match image {
        Image::Depth(dm) => Ok(dm.clone()),
        Image::RawDepth {
            width,
            height,
            bytes,
        } => decode_raw_depth(*width, *height, bytes),
        Image::Rgb { .. } => Err(ConversionError::NotDepth("rgb image")),
    }
}

// ---------------------------------------------------------------------------
// Point-cloud files
// ---------------------------------------------------------------------------

/// Parse an ASCII PCD document.
///
/// Requires `x`, `y` and `z` fields; an `intensity` field is carried along
/// when present. Rows containing non-finite coordinates are dropped, which is
/// how PCD encodes missing returns.
pub fn parse_pcd_ascii(text: &str) -> Result<PointCloud, ConversionError> {
    let mut fields: Vec<String> = Vec::new();
    let mut declared_points: Option<usize> = None;
    let mut lines = text.lines().enumerate();

    for (idx, raw) in lines.by_ref() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or_default().to_ascii_uppercase();
        match key.as_str() {
            "FIELDS" => fields = parts.map(|f| f.to_ascii_lowercase()).collect(),
            "POINTS" => {
                let n = parts.next().and_then(|v| v.parse().ok()).ok_or_else(|| {
                    ConversionError::Parse {
                        line: idx + 1,
                        reason: "POINTS needs a count".to_string(),
                    }
                })?;
                declared_points = Some(n);
            }
            "DATA" => {
                let mode = parts.next().unwrap_or_default();
                if !mode.eq_ignore_ascii_case("ascii") {
                    return Err(ConversionError::Parse {
                        line: idx + 1,
                        reason: format!("unsupported DATA mode {mode:?}"),
                    });
                }
                break;
            }
            _ => {}
        }
    }

    let column = |name: &str| fields.iter().position(|f| f == name);
    let (ix, iy, iz) = match (column("x"), column("y"), column("z")) {
        (Some(x), Some(y), Some(z)) => (x, y, z),
        _ => {
            return Err(ConversionError::Parse {
                line: 0,
                reason: "FIELDS must contain x, y and z".to_string(),
            })
        }
    };
    let ii = column("intensity");

    let mut points = Vec::with_capacity(declared_points.unwrap_or(0));
    let mut intensities = Vec::new();
    let mut rows = 0usize;
    for (idx, raw) in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        rows += 1;
        let values = parse_row(line, idx + 1)?;
        let get = |i: usize| {
            values.get(i).copied().ok_or_else(|| ConversionError::Parse {
                line: idx + 1,
                reason: format!("expected {} columns, got {}", fields.len(), values.len()),
            })
        };
        let p = Point3D::new(get(ix)?, get(iy)?, get(iz)?);
        if !p.is_finite() {
            continue;
        }
        points.push(p);
        if let Some(i) = ii {
            intensities.push(get(i)?);
        }
    }

    if let Some(n) = declared_points {
        if n != rows {
            return Err(ConversionError::LengthMismatch {
                expected: n,
                got: rows,
            });
        }
    }

    Ok(PointCloud::new(points, 0).with_intensities(intensities))
}

/// Parse a plain XYZ listing: one point per line, whitespace or comma
/// separated, `#` comments allowed. Extra columns are ignored.
pub fn parse_xyz(text: &str) -> Result<PointCloud, ConversionError> {
    let mut points = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = parse_row(line, idx + 1)?;
        if values.len() < 3 {
            return Err(ConversionError::Parse {
                line: idx + 1,
                reason: format!("expected at least 3 columns, got {}", values.len()),
            });
        }
        let p = Point3D::new(values[0], values[1], values[2]);
        if p.is_finite() {
            points.push(p);
        }
    }
    Ok(PointCloud::new(points, 0))
}

/// Load a point cloud from disk, choosing the parser by extension.
pub fn read_point_cloud(path: &Path) -> Result<PointCloud, ConversionError> {
    let text = std::fs::read_to_string(path)?;
    let is_pcd = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pcd"))
        .unwrap_or(false);
    let cloud = if is_pcd {
        parse_pcd_ascii(&text)?
    } else {
        parse_xyz(&text)?
    };
    let frame_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(cloud.with_frame_id(frame_id))
}

/// Load a raw depth buffer from disk.
pub fn read_raw_depth(
    path: &Path,
    width: usize,
    height: usize,
) -> Result<DepthMap, ConversionError> {
    let bytes = std::fs::read(path)?;
    decode_raw_depth(width, height, &bytes)
}

fn parse_row(line: &str, line_no: usize) -> Result<Vec<f32>, ConversionError> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f32>().map_err(|e| ConversionError::Parse {
                line: line_no,
                reason: format!("{t:?}: {e}"),
            })
        })
        .collect()
}
