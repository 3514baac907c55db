//! Box fitting and recursive tree construction.
//!
//! A box is fitted to a set of cells from the area-weighted second moments of
//! their triangles: the eigenvectors of the covariance matrix give the box
//! directions and projecting every cell point onto them gives the extents.
//! The tree is built top-down by cutting each box with a plane through its
//! center, trying the long axis first.

use hashbrown::HashSet;
use nalgebra::{Matrix3, Point3, Vector3};
use tracing::{debug, trace};

use crate::geometry::{distance_to_line, jacobi_eigen, normalize, SymmetricEigen};
use crate::node::{NodeId, ObbNode, OrientedBox};
use crate::tree::ObbTreeParams;
use crate::types::MeshSource;

/// A fitted box and the eigenvalues of the covariance it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObbFit {
    pub obb: OrientedBox,
    /// Covariance eigenvalues, matching `obb.axes` (largest first).
    pub sizes: [f64; 3],
}

impl ObbFit {
    fn zero_at(corner: Point3<f64>) -> Self {
        Self {
            obb: OrientedBox::zero_at(corner),
            sizes: [0.0; 3],
        }
    }
}

/// Fit a box to a list of cells of `mesh`.
///
/// Cells without triangles (or with zero total area) fall back to the plain
/// covariance of their points.
pub fn compute_obb<M: MeshSource + ?Sized>(mesh: &M, cell_ids: &[u32]) -> ObbFit {
    let mut seen = HashSet::new();
    fit_cells(mesh, cell_ids, &mut seen).0
}

/// Fit a box to a point cloud using the unweighted point covariance.
///
/// An empty slice yields a zero box at the origin.
pub fn compute_obb_from_points(points: &[Point3<f64>]) -> ObbFit {
    if points.is_empty() {
        return ObbFit::zero_at(Point3::origin());
    }

    let n = points.len() as f64;
    let mean = Point3::from(points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n);

    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = p - mean;
        cov += d * d.transpose();
    }
    cov /= n;

    let eigen = jacobi_eigen(&cov);
    project_extents(&mean, &eigen, points.iter().copied())
}

/// Returns the fit and whether the area-weighted moments were degenerate.
fn fit_cells<M: MeshSource + ?Sized>(
    mesh: &M,
    cell_ids: &[u32],
    seen: &mut HashSet<u32>,
) -> (ObbFit, bool) {
    let mut total: f64 = 0.0;
    let mut mean = Vector3::<f64>::zeros();
    let mut moments = Matrix3::<f64>::zeros();

    for &cell_id in cell_ids {
        let cell = cell_id as usize;
        for [a, b, c] in mesh.cell_type(cell).triangulate(mesh.cell_points(cell)) {
            let (p, q, r) = (mesh.point(a), mesh.point(b), mesh.point(c));
            let m = 0.5 * (q - p).cross(&(r - p)).norm();
            let centroid = (p.coords + q.coords + r.coords) / 3.0;

            total += m;
            mean += centroid * m;

            // Second moment of a triangle about the origin.
            for i in 0..3 {
                for j in i..3 {
                    moments[(i, j)] += m
                        * (9.0 * centroid[i] * centroid[j]
                            + p[i] * p[j]
                            + q[i] * q[j]
                            + r[i] * r[j])
                        / 12.0;
                }
            }
        }
    }

    seen.clear();
    let mut points = Vec::new();
    for &cell_id in cell_ids {
        for &pid in mesh.cell_points(cell_id as usize) {
            if seen.insert(pid) {
                points.push(mesh.point(pid));
            }
        }
    }

    if total <= 0.0 || !total.is_finite() {
        trace!(
            target: "mesh_obb::build",
            cells = cell_ids.len(),
            points = points.len(),
            "Zero triangle area, fitting box to points"
        );
        return (compute_obb_from_points(&points), true);
    }

    mean /= total;
    let mut cov = Matrix3::<f64>::zeros();
    for i in 0..3 {
        for j in i..3 {
            cov[(i, j)] = moments[(i, j)] / total - mean[i] * mean[j];
            cov[(j, i)] = cov[(i, j)];
        }
    }

    let eigen = jacobi_eigen(&cov);
    (project_extents(&Point3::from(mean), &eigen, points.into_iter()), false)
}

fn project_extents(
    mean: &Point3<f64>,
    eigen: &SymmetricEigen<3>,
    points: impl Iterator<Item = Point3<f64>>,
) -> ObbFit {
    let dirs: [Vector3<f64>; 3] = std::array::from_fn(|i| eigen.vector(i));
    let ends: [Point3<f64>; 3] = std::array::from_fn(|i| mean + dirs[i]);

    let mut t_min = [f64::MAX; 3];
    let mut t_max = [f64::MIN; 3];
    let mut any = false;
    for p in points {
        any = true;
        for i in 0..3 {
            let t = distance_to_line(&p, mean, &ends[i]).t;
            t_min[i] = t_min[i].min(t);
            t_max[i] = t_max[i].max(t);
        }
    }
    if !any {
        return ObbFit::zero_at(*mean);
    }

    let mut corner = *mean;
    for i in 0..3 {
        corner += dirs[i] * t_min[i];
    }
    let axes = std::array::from_fn(|i| dirs[i] * (t_max[i] - t_min[i]));

    ObbFit {
        obb: OrientedBox::new(corner, axes),
        sizes: [eigen.values[0], eigen.values[1], eigen.values[2]],
    }
}

/// Recursive top-down construction over an arena of nodes.
pub(crate) struct ObbBuilder<'a, M: MeshSource + ?Sized> {
    mesh: &'a M,
    params: &'a ObbTreeParams,
    seen: HashSet<u32>,
    pub nodes: Vec<ObbNode>,
    pub obb_count: usize,
    pub deepest_level: u32,
}

impl<'a, M: MeshSource + ?Sized> ObbBuilder<'a, M> {
    pub fn new(mesh: &'a M, params: &'a ObbTreeParams) -> Self {
        Self {
            mesh,
            params,
            seen: HashSet::new(),
            nodes: Vec::new(),
            obb_count: 0,
            deepest_level: 0,
        }
    }

    /// Build the whole tree over `cells`, root at index 0.
    pub fn build(mut self, cells: Vec<u32>) -> Self {
        self.nodes.push(ObbNode::new(None, 0));
        self.build_tree(cells, NodeId(0), 0);
        self
    }

    fn build_tree(&mut self, cells: Vec<u32>, node: NodeId, level: u32) {
        self.deepest_level = self.deepest_level.max(level);

        let (fit, degenerate) = fit_cells(self.mesh, &cells, &mut self.seen);
        self.obb_count += 1;
        self.nodes[node.index()].obb = fit.obb;

        if degenerate
            || level >= self.params.max_level
            || cells.len() <= self.params.cells_per_bucket
        {
            self.make_leaf(node, cells);
            return;
        }

        match self.split(&cells, &fit.obb) {
            Some((left, right)) => {
                drop(cells);
                let left_id = self.push_child(node, level + 1);
                let right_id = self.push_child(node, level + 1);
                self.nodes[node.index()].children = Some([left_id, right_id]);

                self.build_tree(left, left_id, level + 1);
                self.build_tree(right, right_id, level + 1);
            }
            None => self.make_leaf(node, cells),
        }
    }

    fn push_child(&mut self, parent: NodeId, level: u32) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ObbNode::new(Some(parent), level));
        id
    }

    fn make_leaf(&mut self, node: NodeId, cells: Vec<u32>) {
        if self.params.retain_cell_lists {
            self.nodes[node.index()].cells = Some(cells);
        }
    }

    /// Search the three box axes for a balanced split plane through the box
    /// center.
    fn split(&self, cells: &[u32], obb: &OrientedBox) -> Option<(Vec<u32>, Vec<u32>)> {
        let center = obb.center();
        let mut best_plane = 0;
        let mut best_ratio = 1.0;
        let mut forced = false;
        let mut plane = 0;

        while plane < 3 {
            let ratio;
            if let Some(n) = normalize(&obb.axes[plane]) {
                let (left, right) = self.classify(cells, &n, &center);
                ratio = (right.len() as f64 - left.len() as f64).abs() / cells.len() as f64;
                if ratio < self.params.good_split_ratio || forced {
                    debug!(
                        target: "mesh_obb::build",
                        plane = plane,
                        ratio = ratio,
                        left = left.len(),
                        right = right.len(),
                        forced = forced,
                        "Accepted split plane"
                    );
                    return Some((left, right));
                }
            } else {
                ratio = 1.0;
            }

            if ratio < best_ratio {
                best_ratio = ratio;
                best_plane = plane;
            }
            plane += 1;
            if plane == 3 && !forced && best_ratio < self.params.fallback_split_ratio {
                plane = best_plane;
                forced = true;
            }
        }

        trace!(
            target: "mesh_obb::build",
            cells = cells.len(),
            best_ratio = best_ratio,
            "No acceptable split plane, making leaf"
        );
        None
    }

    /// Partition cells by the side of the plane `(n, p)` they fall on.
    /// Straddling cells go by the centroid of their points.
    fn classify(
        &self,
        cells: &[u32],
        n: &Vector3<f64>,
        p: &Point3<f64>,
    ) -> (Vec<u32>, Vec<u32>) {
        let mut left = Vec::with_capacity(cells.len() / 2);
        let mut right = Vec::with_capacity(cells.len() / 2);

        for &cell_id in cells {
            let ids = self.mesh.cell_points(cell_id as usize);
            let mut negative = false;
            let mut positive = false;
            for &pid in ids {
                if n.dot(&(self.mesh.point(pid) - p)) < 0.0 {
                    negative = true;
                } else {
                    positive = true;
                }
            }

            let goes_left = if negative && positive {
                let sum: Vector3<f64> = ids.iter().map(|&pid| self.mesh.point(pid).coords).sum();
                let centroid = sum / ids.len() as f64;
                n.dot(&(centroid - p.coords)) < 0.0
            } else {
                negative
            };

            if goes_left {
                left.push(cell_id);
            } else {
                right.push(cell_id);
            }
        }

        (left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellType, PolyMesh};

    fn box_mesh(a: f64, b: f64, c: f64) -> PolyMesh {
        let points = (0..8)
            .map(|i| {
                Point3::new(
                    if i & 1 != 0 { a } else { 0.0 },
                    if i & 2 != 0 { b } else { 0.0 },
                    if i & 4 != 0 { c } else { 0.0 },
                )
            })
            .collect();
        PolyMesh::from_triangles(
            points,
            &[
                [0, 2, 3], [0, 3, 1], [4, 5, 7], [4, 7, 6],
                [0, 1, 5], [0, 5, 4], [2, 6, 7], [2, 7, 3],
                [0, 4, 6], [0, 6, 2], [1, 3, 7], [1, 7, 5],
            ],
        )
    }

    fn all_cells<M: MeshSource>(mesh: &M) -> Vec<u32> {
        (0..mesh.number_of_cells() as u32).collect()
    }

    #[test]
    fn test_fit_elongated_box() {
        let mesh = box_mesh(4.0, 2.0, 1.0);
        let fit = compute_obb(&mesh, &all_cells(&mesh));

        let ext = fit.obb.extents();
        assert!((ext[0] - 4.0).abs() < 1e-9);
        assert!((ext[1] - 2.0).abs() < 1e-9);
        assert!((ext[2] - 1.0).abs() < 1e-9);
        assert!((fit.obb.volume() - 8.0).abs() < 1e-8);
        assert!(fit.sizes[0] >= fit.sizes[1] && fit.sizes[1] >= fit.sizes[2]);

        let center = fit.obb.center();
        assert!((center - Point3::new(2.0, 1.0, 0.5)).norm() < 1e-9);
    }

    #[test]
    fn test_fit_contains_all_points() {
        let mesh = box_mesh(3.0, 1.0, 0.5);
        let fit = compute_obb(&mesh, &all_cells(&mesh));
        for p in &mesh.points {
            assert!(fit.obb.contains_point(p, 1e-9));
        }
    }

    #[test]
    fn test_fit_from_points() {
        let points: Vec<_> = (0..11)
            .map(|i| Point3::new(i as f64, 0.5 * (i % 2) as f64, 0.0))
            .collect();
        let fit = compute_obb_from_points(&points);
        let ext = fit.obb.extents();
        assert!((ext[0] - 10.0).abs() < 1e-6);
        assert!(ext[2] < 1e-9);
        for p in &points {
            assert!(fit.obb.contains_point(p, 1e-9));
        }

        let empty = compute_obb_from_points(&[]);
        assert_eq!(empty.obb, OrientedBox::zero_at(Point3::origin()));
    }

    #[test]
    fn test_zero_area_falls_back_to_points() {
        let mut mesh = PolyMesh::new();
        mesh.add_point(0.0, 0.0, 0.0);
        mesh.add_point(1.0, 0.0, 0.0);
        mesh.add_point(2.0, 0.0, 0.0);
        mesh.add_triangle([0, 1, 2]);
        mesh.add_cell(CellType::Line, &[0, 2]);

        let mut seen = HashSet::new();
        let (fit, degenerate) = fit_cells(&mesh, &[0, 1], &mut seen);
        assert!(degenerate);
        assert!((fit.obb.extents()[0] - 2.0).abs() < 1e-9);
        for p in &mesh.points {
            assert!(fit.obb.contains_point(p, 1e-9));
        }
    }

    #[test]
    fn test_coincident_points_give_zero_box() {
        let mut mesh = PolyMesh::new();
        for _ in 0..3 {
            mesh.add_point(1.0, 2.0, 3.0);
        }
        mesh.add_triangle([0, 1, 2]);
        let fit = compute_obb(&mesh, &[0]);
        assert_eq!(fit.obb.corner, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(fit.obb.volume(), 0.0);
    }

    #[test]
    fn test_split_partitions_cells() {
        // A row of 40 small triangles along x
        let mut mesh = PolyMesh::new();
        for i in 0..40 {
            let x = i as f64;
            let a = mesh.add_point(x, 0.0, 0.0);
            let b = mesh.add_point(x + 0.5, 0.0, 0.0);
            let c = mesh.add_point(x, 0.5, 0.0);
            mesh.add_triangle([a, b, c]);
        }

        let params = ObbTreeParams::default().with_cells_per_bucket(4);
        let builder = ObbBuilder::new(&mesh, &params).build(all_cells(&mesh));

        let root = &builder.nodes[0];
        let [l, r] = root.children.unwrap();
        assert_eq!(builder.nodes[l.index()].parent, Some(NodeId(0)));
        assert_eq!(builder.nodes[r.index()].level, 1);

        let mut seen: Vec<u32> = builder
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .flat_map(|n| n.cell_ids().iter().copied())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, all_cells(&mesh));
        assert!(builder.obb_count == builder.nodes.len());
        assert!(builder.deepest_level >= 3);
    }

    #[test]
    fn test_unsplittable_cells_make_leaf() {
        // Every triangle spans the whole box, so every plane puts them all on
        // one side.
        let mut mesh = PolyMesh::new();
        mesh.add_point(0.0, 0.0, 0.0);
        mesh.add_point(4.0, 0.0, 0.0);
        mesh.add_point(0.0, 2.0, 0.0);
        for _ in 0..30 {
            mesh.add_triangle([0, 1, 2]);
        }

        let params = ObbTreeParams::default().with_cells_per_bucket(2);
        let builder = ObbBuilder::new(&mesh, &params).build(all_cells(&mesh));
        assert_eq!(builder.nodes.len(), 1);
        assert_eq!(builder.nodes[0].cell_ids().len(), 30);
    }
}
