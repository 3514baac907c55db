//! Cell-level collision between two OBB trees.
//!
//! The box traversal in [`ObbTree::intersect_with_obb_tree`] narrows the
//! search to pairs of overlapping leaves. For each pair, every triangle of the
//! second tree's leaf is checked against the first leaf's box and then tested
//! exactly against the first leaf's triangles.

use nalgebra::{Matrix4, Vector3};
use tracing::{debug, warn};

use crate::geometry::transform_point;
use crate::query::triangle_intersects_node;
use crate::tracing_ext::log_perf_section;
use crate::tree::ObbTree;
use crate::types::{MeshSource, Triangle};

/// Parameters for cell-level collision.
#[derive(Debug, Clone)]
pub struct CollisionParams {
    /// Slack for the triangle/box and triangle/triangle tests. Default: 1e-10
    pub epsilon: f64,
    /// Stop after this many colliding pairs. Default: None (report all)
    pub max_reported: Option<usize>,
}

impl Default for CollisionParams {
    fn default() -> Self {
        Self {
            epsilon: 1e-10,
            max_reported: None,
        }
    }
}

impl CollisionParams {
    /// Report at most `max` pairs.
    pub fn with_max_reported(max: usize) -> Self {
        Self {
            max_reported: Some(max),
            ..Default::default()
        }
    }
}

/// Colliding cells found between two trees.
#[derive(Debug, Clone, Default)]
pub struct TreeIntersectionResult {
    /// `(cell of this tree, cell of the other tree)` pairs.
    pub pairs: Vec<(u32, u32)>,
    /// Overlapping leaf pairs handed to the cell test.
    pub leaf_pairs_tested: usize,
    /// Whether the search stopped early at `max_reported`.
    pub truncated: bool,
}

impl TreeIntersectionResult {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<'m, M: MeshSource + ?Sized> ObbTree<'m, M> {
    /// Find all pairs of cells, one from each tree, that intersect.
    ///
    /// `xform` maps `other` into this tree's frame. Both trees must be built
    /// with retained cell lists.
    pub fn find_intersecting_cells<N: MeshSource + ?Sized>(
        &self,
        other: &ObbTree<'_, N>,
        xform: Option<&Matrix4<f64>>,
        params: &CollisionParams,
    ) -> TreeIntersectionResult {
        let mut result = TreeIntersectionResult::default();
        let (Some(mesh_a), Some(mesh_b)) = (self.mesh, other.mesh) else {
            return result;
        };
        if !self.params.retain_cell_lists || !other.params.retain_cell_lists {
            warn!(
                target: "mesh_obb::query",
                "Cell collision needs retained cell lists on both trees"
            );
            return result;
        }

        let _perf = log_perf_section("find_intersecting_cells");
        let eps = params.epsilon;

        let status = self.intersect_with_obb_tree(other, xform, |leaf_a, leaf_b, xform| {
            result.leaf_pairs_tested += 1;

            let tris_a: Vec<(u32, Vec<Triangle>)> = leaf_a
                .cell_ids()
                .iter()
                .map(|&c| (c, mesh_a.cell_triangles(c as usize)))
                .collect();

            let mut found = 0;
            for &cell_b in leaf_b.cell_ids() {
                let tris_b: Vec<Triangle> = mesh_b
                    .cell_triangles(cell_b as usize)
                    .into_iter()
                    .filter(|t| {
                        triangle_intersects_node(leaf_a, &t.v0, &t.v1, &t.v2, xform, eps)
                    })
                    .map(|t| match xform {
                        Some(m) => Triangle::new(
                            transform_point(m, &t.v0),
                            transform_point(m, &t.v1),
                            transform_point(m, &t.v2),
                        ),
                        None => t,
                    })
                    .collect();
                if tris_b.is_empty() {
                    continue;
                }

                for (cell_a, a) in &tris_a {
                    let hit = a
                        .iter()
                        .any(|ta| tris_b.iter().any(|tb| triangles_intersect(ta, tb, eps)));
                    if hit {
                        result.pairs.push((*cell_a, cell_b));
                        found += 1;
                        if params.max_reported.is_some_and(|max| result.pairs.len() >= max) {
                            result.truncated = true;
                            return -1;
                        }
                    }
                }
            }
            found
        });

        debug!(
            target: "mesh_obb::query",
            pairs = result.pairs.len(),
            leaf_pairs = result.leaf_pairs_tested,
            status = status,
            "Cell collision finished"
        );
        result
    }
}

/// Whether two triangles share at least one point, up to `epsilon`.
///
/// Candidate separating directions are both plane normals and the nine
/// edge/edge crosses. Triangles in a common plane have no usable crosses,
/// so the in-plane normals of all six edges stand in for them. Zero-area
/// triangles overlap nothing.
pub fn triangles_intersect(a: &Triangle, b: &Triangle, epsilon: f64) -> bool {
    let eps2 = epsilon * epsilon;
    let (na, nb) = (a.normal_unnormalized(), b.normal_unnormalized());
    if na.norm_squared() < eps2 || nb.norm_squared() < eps2 {
        return false;
    }

    let (ea, eb) = (edge_vectors(a), edge_vectors(b));
    let same_plane = na.cross(&nb).norm_squared() < eps2 * na.norm_squared() * nb.norm_squared();

    let mut axes: Vec<Vector3<f64>> = Vec::with_capacity(11);
    axes.push(na);
    if same_plane {
        axes.extend(ea.iter().map(|e| na.cross(e)));
        axes.extend(eb.iter().map(|e| nb.cross(e)));
    } else {
        axes.push(nb);
        axes.extend(ea.iter().flat_map(|u| eb.iter().map(move |v| u.cross(v))));
    }

    axes.iter()
        .filter(|axis| axis.norm_squared() > eps2)
        .all(|axis| spans_overlap(span(a, axis), span(b, axis), epsilon))
}

fn edge_vectors(t: &Triangle) -> [Vector3<f64>; 3] {
    [t.v1 - t.v0, t.v2 - t.v1, t.v0 - t.v2]
}

/// `(min, max)` of the vertices projected on `axis`.
fn span(t: &Triangle, axis: &Vector3<f64>) -> (f64, f64) {
    t.vertices()
        .iter()
        .map(|v| axis.dot(&v.coords))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| (lo.min(d), hi.max(d)))
}

fn spans_overlap((lo_a, hi_a): (f64, f64), (lo_b, hi_b): (f64, f64), epsilon: f64) -> bool {
    lo_b <= hi_a + epsilon && lo_a <= hi_b + epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn xy_triangle(x: f64, y: f64, z: f64, size: f64) -> Triangle {
        Triangle::new(
            Point3::new(x, y, z),
            Point3::new(x + size, y, z),
            Point3::new(x + size / 2.0, y + size, z),
        )
    }

    #[test]
    fn test_far_triangles_do_not_intersect() {
        let t1 = xy_triangle(0.0, 0.0, 0.0, 1.0);
        let t2 = xy_triangle(10.0, 10.0, 0.0, 1.0);
        assert!(!triangles_intersect(&t1, &t2, 1e-10));
    }

    #[test]
    fn test_coplanar_overlap() {
        let t1 = xy_triangle(0.0, 0.0, 0.0, 1.0);
        let t2 = xy_triangle(0.3, 0.2, 0.0, 1.0);
        assert!(triangles_intersect(&t1, &t2, 1e-10));
    }

    #[test]
    fn test_parallel_planes_do_not_intersect() {
        let t1 = xy_triangle(0.0, 0.0, 0.0, 1.0);
        let t2 = xy_triangle(0.0, 0.0, 0.5, 1.0);
        assert!(!triangles_intersect(&t1, &t2, 1e-10));
    }

    #[test]
    fn test_piercing_triangles() {
        let flat = xy_triangle(0.0, 0.0, 0.0, 2.0);
        let upright = Triangle::new(
            Point3::new(1.0, 0.5, -1.0),
            Point3::new(1.0, 0.5, 1.0),
            Point3::new(1.0, 1.5, 0.0),
        );
        assert!(triangles_intersect(&flat, &upright, 1e-10));

        let lifted = Triangle::new(
            Point3::new(1.0, 0.5, 0.5),
            Point3::new(1.0, 0.5, 1.5),
            Point3::new(1.0, 1.5, 1.0),
        );
        assert!(!triangles_intersect(&flat, &lifted, 1e-10));
    }

    #[test]
    fn test_shared_edge_counts_as_contact() {
        let floor = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let wall = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        );
        assert!(triangles_intersect(&floor, &wall, 1e-10));
        assert!(triangles_intersect(&wall, &floor, 1e-10));

        // Same wall pushed just past the floor's edge
        let offset = Vector3::new(0.0, -1e-3, 0.0);
        let moved = Triangle::new(wall.v0 + offset, wall.v1 + offset, wall.v2 + offset);
        assert!(!triangles_intersect(&floor, &moved, 1e-10));
    }

    #[test]
    fn test_degenerate_triangle_never_intersects() {
        let t1 = xy_triangle(0.0, 0.0, 0.0, 1.0);
        let sliver = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(!triangles_intersect(&t1, &sliver, 1e-10));
    }
}
