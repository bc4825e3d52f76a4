//! Voxel-hash spatial index for fixed-radius neighbour queries.
//!
//! Points are binned into cubic cells of side `cell_size`. A pair query with
//! `radius <= cell_size` only visits the 27-neighbourhood of each cell.
//! Points with a non-finite coordinate are never binned, so they take part in
//! no pair.

use crate::bridge::Point3D;

use std::collections::HashMap;

/// Integer cell coordinate.
pub type CellKey = (i64, i64, i64);

/// Errors returned by [`VoxelGrid`] construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),
}

/// Spatial hash over a borrowed point slice.
///
/// The grid stores indices only; the points stay with the caller and are
/// passed back in on every query.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
    len: usize,
}

impl VoxelGrid {
    /// Bin every finite point of `points` into cells of side `cell_size`.
    pub fn build(points: &[Point3D], cell_size: f64) -> Result<Self, IndexError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(IndexError::InvalidCellSize(cell_size));
        }
        let mut cells: HashMap<CellKey, Vec<usize>> = HashMap::new();
        let mut len = 0;
        for (idx, p) in points.iter().enumerate() {
            if !p.is_finite() {
                continue;
            }
            cells.entry(cell_key(p, cell_size)).or_default().push(idx);
            len += 1;
        }
        Ok(Self {
            cell_size,
            cells,
            len,
        })
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of indexed (finite) points.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Indices stored in one cell.
    pub fn cell(&self, key: &CellKey) -> &[usize] {
        self.cells.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Visit every unordered pair `(i, j)`, `i < j`, closer than `radius`.
    ///
    /// Requires `radius <= cell_size` so that the 26-neighbourhood is enough.
    pub fn for_each_pair_within<F>(&self, points: &[Point3D], radius: f64, mut f: F)
    where
        F: FnMut(usize, usize),
    {
        debug_assert!(radius <= self.cell_size);
        let r2 = radius * radius;
        for (&(cx, cy, cz), members) in &self.cells {
            for dx in -1..=1_i64 {
                for dy in -1..=1_i64 {
                    for dz in -1..=1_i64 {
                        let Some(key) = offset_key((cx, cy, cz), (dx, dy, dz)) else {
                            continue;
                        };
                        let neighbours = self.cell(&key);
                        for &i in members {
                            for &j in neighbours {
                                if j <= i {
                                    continue;
                                }
                                if points[i].distance_sq(&points[j]) <= r2 {
                                    f(i, j);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Neighbouring cell, or `None` past the edge of the key space.
fn offset_key(key: CellKey, delta: CellKey) -> Option<CellKey> {
    Some((
        key.0.checked_add(delta.0)?,
        key.1.checked_add(delta.1)?,
        key.2.checked_add(delta.2)?,
    ))
}

/// Far-out coordinates saturate at the `i64` range; the exact distance test
/// still decides every link.
fn cell_key(p: &Point3D, cell_size: f64) -> CellKey {
    (
        (p.x as f64 / cell_size).floor() as i64,
        (p.y as f64 / cell_size).floor() as i64,
        (p.z as f64 / cell_size).floor() as i64,
    )
}
