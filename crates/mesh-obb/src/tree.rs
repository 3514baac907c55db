//! The OBB tree facade: parameters, lifecycle and statistics.

use nalgebra::Point3;
use tracing::{debug, info};

use crate::builder::{self, ObbBuilder, ObbFit};
use crate::error::{ObbError, ObbResult};
use crate::node::{NodeId, ObbNode};
use crate::tracing_ext::{OperationTimer, log_tree_stats};
use crate::types::{MeshSource, PolyMesh, next_timestamp};

/// Parameters controlling tree construction and queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ObbTreeParams {
    /// Slack used when comparing boxes during tree/tree traversal.
    /// Default: 0.01
    pub tolerance: f64,
    /// Maximum depth of the tree (root is level 0). Default: 12
    pub max_level: u32,
    /// Nodes holding this many cells or fewer become leaves. Default: 25
    pub cells_per_bucket: usize,
    /// Keep the cell list of every leaf. Line queries and cell-level
    /// collision need it. Default: true
    pub retain_cell_lists: bool,
    /// A split plane is taken as soon as its imbalance `|R - L| / N` drops
    /// below this. Default: 0.6
    pub good_split_ratio: f64,
    /// When no plane is good, the best one is still taken if its imbalance is
    /// below this. Default: 0.95
    pub fallback_split_ratio: f64,
}

impl Default for ObbTreeParams {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_level: 12,
            cells_per_bucket: 25,
            retain_cell_lists: true,
            good_split_ratio: 0.6,
            fallback_split_ratio: 0.95,
        }
    }
}

impl ObbTreeParams {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn with_cells_per_bucket(mut self, cells: usize) -> Self {
        self.cells_per_bucket = cells;
        self
    }

    pub fn with_retain_cell_lists(mut self, retain: bool) -> Self {
        self.retain_cell_lists = retain;
        self
    }

    /// Set both split thresholds.
    pub fn with_split_ratios(mut self, good: f64, fallback: f64) -> Self {
        self.good_split_ratio = good;
        self.fallback_split_ratio = fallback;
        self
    }

    /// Check that every parameter is in range.
    pub fn validate(&self) -> ObbResult<()> {
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(ObbError::invalid_params(format!(
                "tolerance must be a finite value >= 0, got {}",
                self.tolerance
            )));
        }
        if !(self.fallback_split_ratio > 0.0 && self.fallback_split_ratio <= 1.0) {
            return Err(ObbError::invalid_params(format!(
                "fallback_split_ratio must be in (0, 1], got {}",
                self.fallback_split_ratio
            )));
        }
        if !(self.good_split_ratio > 0.0 && self.good_split_ratio <= self.fallback_split_ratio) {
            return Err(ObbError::invalid_params(format!(
                "good_split_ratio must be in (0, {}], got {}",
                self.fallback_split_ratio, self.good_split_ratio
            )));
        }
        Ok(())
    }
}

/// Shape summary of a built tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeStatistics {
    pub node_count: usize,
    pub leaf_count: usize,
    pub deepest_level: u32,
    /// Sum of the volumes of all leaf boxes.
    pub total_leaf_volume: f64,
    /// Fewest retained cells in a leaf (0 when lists are not retained).
    pub min_cells_per_leaf: usize,
    /// Most retained cells in a leaf.
    pub max_cells_per_leaf: usize,
    /// Box fits performed by the last build.
    pub obb_count: usize,
}

/// An oriented bounding box tree over the cells of a mesh.
///
/// The tree borrows its mesh and is only meaningful while the mesh is
/// unchanged. [`ObbTree::build_locator`] notices edits through
/// [`MeshSource::modified_time`] and rebuilds.
///
/// # Example
///
/// ```rust,ignore
/// use mesh_obb::{ObbTree, PolyMesh};
/// use nalgebra::Point3;
///
/// let mesh: PolyMesh = load_somehow();
/// let mut tree = ObbTree::with_data_set(&mesh);
/// tree.build_locator()?;
///
/// if let Some(hit) = tree.intersect_with_line(
///     &Point3::new(0.0, 0.0, -10.0),
///     &Point3::new(0.0, 0.0, 10.0),
///     0.0,
/// ) {
///     println!("hit cell {} at {:?}", hit.cell_id, hit.point);
/// }
/// ```
#[derive(Debug)]
pub struct ObbTree<'m, M: MeshSource + ?Sized = PolyMesh> {
    pub(crate) mesh: Option<&'m M>,
    pub(crate) params: ObbTreeParams,
    pub(crate) nodes: Vec<ObbNode>,
    build_time: u64,
    mtime: u64,
    deepest_level: u32,
    obb_count: usize,
}

impl<M: MeshSource + ?Sized> Default for ObbTree<'_, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'m, M: MeshSource + ?Sized> ObbTree<'m, M> {
    /// Create a tree with no mesh and default parameters.
    pub fn new() -> Self {
        Self {
            mesh: None,
            params: ObbTreeParams::default(),
            nodes: Vec::new(),
            build_time: 0,
            mtime: next_timestamp(),
            deepest_level: 0,
            obb_count: 0,
        }
    }

    /// Create a tree over `mesh` with default parameters. Nothing is built
    /// until [`ObbTree::build_locator`] is called.
    pub fn with_data_set(mesh: &'m M) -> Self {
        let mut tree = Self::new();
        tree.mesh = Some(mesh);
        tree
    }

    /// Create a tree over `mesh` with the given parameters.
    pub fn with_params(mesh: &'m M, params: ObbTreeParams) -> Self {
        let mut tree = Self::with_data_set(mesh);
        tree.params = params;
        tree
    }

    pub fn data_set(&self) -> Option<&'m M> {
        self.mesh
    }

    pub fn params(&self) -> &ObbTreeParams {
        &self.params
    }

    /// Attach a mesh and discard any tree built over the previous one.
    pub fn set_data_set(&mut self, mesh: &'m M) {
        self.free_search_structure();
        self.mesh = Some(mesh);
        self.modified();
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        if self.params.tolerance != tolerance {
            self.params.tolerance = tolerance;
            self.modified();
        }
    }

    pub fn set_max_level(&mut self, max_level: u32) {
        if self.params.max_level != max_level {
            self.params.max_level = max_level;
            self.modified();
        }
    }

    pub fn set_number_of_cells_per_bucket(&mut self, cells: usize) {
        if self.params.cells_per_bucket != cells {
            self.params.cells_per_bucket = cells;
            self.modified();
        }
    }

    pub fn set_retain_cell_lists(&mut self, retain: bool) {
        if self.params.retain_cell_lists != retain {
            self.params.retain_cell_lists = retain;
            self.modified();
        }
    }

    /// Replace all parameters at once.
    pub fn set_params(&mut self, params: ObbTreeParams) {
        if self.params != params {
            self.params = params;
            self.modified();
        }
    }

    fn modified(&mut self) {
        self.mtime = next_timestamp();
    }

    /// Timestamp of the last parameter or mesh change made through the tree.
    pub fn modified_time(&self) -> u64 {
        self.mtime
    }

    /// Timestamp of the last successful build, or 0.
    pub fn build_time(&self) -> u64 {
        self.build_time
    }

    /// Whether a rebuild is needed before querying.
    pub fn is_stale(&self) -> bool {
        match self.mesh {
            Some(mesh) => {
                self.nodes.is_empty()
                    || self.build_time <= self.mtime
                    || self.build_time <= mesh.modified_time()
            }
            None => true,
        }
    }

    /// Build the tree if it is missing or stale.
    ///
    /// Invalid parameters leave the previous tree untouched. A mesh that
    /// fails validation frees it.
    pub fn build_locator(&mut self) -> ObbResult<()> {
        let mesh = self.mesh.ok_or(ObbError::NoDataSet)?;
        if !self.is_stale() {
            return Ok(());
        }

        self.params.validate()?;
        let (point_count, cell_count) = match validate_mesh(mesh) {
            Ok(counts) => counts,
            Err(err) => {
                self.free_search_structure();
                return Err(err);
            }
        };

        let _timer = OperationTimer::with_context("build_locator", cell_count, point_count);
        self.free_search_structure();

        let cells: Vec<u32> = (0..cell_count as u32).collect();
        let built = ObbBuilder::new(mesh, &self.params).build(cells);
        self.nodes = built.nodes;
        self.deepest_level = built.deepest_level;
        self.obb_count = built.obb_count;
        self.build_time = next_timestamp();

        info!(
            target: "mesh_obb::build",
            cells = cell_count,
            nodes = self.nodes.len(),
            deepest_level = self.deepest_level,
            "Built OBB tree"
        );
        log_tree_stats(&self.statistics(), "build_locator");
        Ok(())
    }

    /// Discard all nodes. The parameters and mesh stay attached.
    pub fn free_search_structure(&mut self) {
        if !self.nodes.is_empty() {
            debug!(target: "mesh_obb::build", nodes = self.nodes.len(), "Freeing OBB tree");
        }
        self.nodes = Vec::new();
        self.deepest_level = 0;
        self.obb_count = 0;
        self.build_time = 0;
    }

    pub(crate) fn root_id(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(NodeId(0))
    }

    /// The root node, if built.
    pub fn root(&self) -> Option<&ObbNode> {
        self.nodes.first()
    }

    pub fn node(&self, id: NodeId) -> Option<&ObbNode> {
        self.nodes.get(id.index())
    }

    /// All nodes; the root is first and every parent precedes its children.
    pub fn nodes(&self) -> &[ObbNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest level reached by the last build.
    pub fn deepest_level(&self) -> u32 {
        self.deepest_level
    }

    /// Number of box fits performed by the last build.
    pub fn obb_count(&self) -> usize {
        self.obb_count
    }

    /// Ids of the leaves, in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .map(|(i, _)| NodeId(i as u32))
    }

    /// Summarize the shape of the current tree.
    pub fn statistics(&self) -> TreeStatistics {
        let mut stats = TreeStatistics {
            node_count: self.nodes.len(),
            deepest_level: self.deepest_level,
            obb_count: self.obb_count,
            min_cells_per_leaf: usize::MAX,
            ..Default::default()
        };
        for node in self.nodes.iter().filter(|n| n.is_leaf()) {
            let cells = node.cell_ids().len();
            stats.leaf_count += 1;
            stats.total_leaf_volume += node.obb.volume();
            stats.min_cells_per_leaf = stats.min_cells_per_leaf.min(cells);
            stats.max_cells_per_leaf = stats.max_cells_per_leaf.max(cells);
        }
        if stats.leaf_count == 0 {
            stats.min_cells_per_leaf = 0;
        }
        stats
    }

    /// Fit a single box around every cell of `mesh` without building a tree.
    pub fn compute_obb(mesh: &M) -> ObbFit {
        let cells: Vec<u32> = (0..mesh.number_of_cells() as u32).collect();
        builder::compute_obb(mesh, &cells)
    }

    /// Fit a single box around a point cloud.
    pub fn compute_obb_from_points(points: &[Point3<f64>]) -> ObbFit {
        builder::compute_obb_from_points(points)
    }
}

/// Returns `(points, cells)` for a mesh that can be built over.
fn validate_mesh<M: MeshSource + ?Sized>(mesh: &M) -> ObbResult<(usize, usize)> {
    let point_count = mesh.number_of_points();
    let cell_count = mesh.number_of_cells();
    if point_count == 0 || cell_count == 0 {
        return Err(ObbError::empty_mesh(format!(
            "mesh has {point_count} points and {cell_count} cells"
        )));
    }
    for cell_id in 0..cell_count {
        if let Some(&bad) = mesh
            .cell_points(cell_id)
            .iter()
            .find(|&&pid| pid as usize >= point_count)
        {
            return Err(ObbError::invalid_point_index(cell_id, bad, point_count));
        }
    }
    Ok((point_count, cell_count))
}
