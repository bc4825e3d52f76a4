//! Euclidean radius clustering over a voxel hash with union-find.
//!
//! Two points are linked when their distance is at most the linkage radius;
//! clusters are the connected components of that relation. Components with
//! fewer than `min_size` members are discarded as noise. Points with a
//! non-finite coordinate cannot be located and are always discarded.
//!
//! Output is independent of input order up to index relabelling: members of
//! each cluster are ascending, and clusters are ordered by their smallest
//! member index.

use crate::bridge::{Point3D, VoxelGrid};
use crate::perception::config::ClusterConfig;
use crate::perception::{PerceptionError, Result};

use std::collections::HashMap;
use tracing::debug;

/// Result of a clustering pass, as index lists into the input slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSet {
    clusters: Vec<Vec<usize>>,
    discarded: Vec<usize>,
}

impl ClusterSet {
    /// Clusters that reached the minimum size.
    pub fn clusters(&self) -> &[Vec<usize>] {
        &self.clusters
    }

    /// Indices that fell into undersized components, ascending.
    pub fn discarded(&self) -> &[usize] {
        &self.discarded
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total number of points assigned to some kept cluster.
    pub fn clustered_count(&self) -> usize {
        self.clusters.iter().map(Vec::len).sum()
    }

    /// Translate indices through `map` (local index -> original index).
    ///
    /// `map` must be ascending so that ordering by smallest member survives.
    pub(crate) fn remap(&self, map: &[usize]) -> ClusterSet {
        let translate = |idx: &Vec<usize>| idx.iter().map(|&i| map[i]).collect::<Vec<_>>();
        ClusterSet {
            clusters: self.clusters.iter().map(translate).collect(),
            discarded: translate(&self.discarded),
        }
    }
}

/// Cluster `points` with linkage radius `radius` (mm), keeping components of
/// at least `min_size` points.
pub fn cluster_points(points: &[Point3D], radius: f64, min_size: usize) -> Result<ClusterSet> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(PerceptionError::config(
            "clustering_radius",
            format!("linkage radius must be positive, got {radius}"),
        ));
    }
    if points.is_empty() {
        return Ok(ClusterSet::default());
    }

    let grid = VoxelGrid::build(points, radius)
        .map_err(|e| PerceptionError::config("clustering_radius", e.to_string()))?;

    let mut parent: Vec<usize> = (0..points.len()).collect();
    grid.for_each_pair_within(points, radius, |i, j| uf_union(&mut parent, i, j));

    // Visiting indices in ascending order makes each group's first entry its
    // smallest member, and groups appear in order of that member.
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut unplaced = Vec::new();
    for i in 0..points.len() {
        if !points[i].is_finite() {
            unplaced.push(i);
            continue;
        }
        let root = uf_find(&mut parent, i);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }

    let mut set = ClusterSet {
        clusters: Vec::new(),
        discarded: unplaced,
    };
    for group in groups {
        if group.len() >= min_size {
            set.clusters.push(group);
        } else {
            set.discarded.extend(group);
        }
    }
    set.discarded.sort_unstable();

    debug!(
        points = points.len(),
        cells = grid.cell_count(),
        clusters = set.clusters.len(),
        discarded = set.discarded.len(),
        non_finite = points.len() - grid.len(),
        radius,
        "radius clustering done"
    );
    Ok(set)
}

/// Cluster using the effective radius and minimum segment size from `config`.
pub fn cluster_with_config(points: &[Point3D], config: &ClusterConfig) -> Result<ClusterSet> {
    cluster_points(
        points,
        config.effective_radius_mm(),
        config.min_points_in_segment(),
    )
}

/// Path-compressing find.
fn uf_find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Union by attaching one root to another.
fn uf_union(parent: &mut [usize], a: usize, b: usize) {
    let ra = uf_find(parent, a);
    let rb = uf_find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}
