//! Read-only queries against a built OBB tree.
//!
//! Overlap tests use the separating axis theorem: two convex shapes are
//! disjoint exactly when their projections onto some axis do not overlap.
//! Traversals are iterative with explicit stacks, so query depth is not
//! limited by the call stack.

use nalgebra::{Matrix4, Point3, Vector3};
use tracing::{trace, warn};

use crate::geometry::{normalize, transform_point};
use crate::node::{ObbNode, OrientedBox};
use crate::tree::ObbTree;
use crate::types::{CellHit, MeshSource};

/// Hits closer than this along the segment are one crossing.
const SAME_CROSSING_T: f64 = 1e-9;

/// A segment/cell intersection found by a tree query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineHit {
    /// Parametric position along the query segment, in `[0, 1]`.
    pub t: f64,
    pub point: Point3<f64>,
    /// Parametric coordinates within the hit sub-triangle.
    pub pcoords: [f64; 3],
    pub sub_id: usize,
    pub cell_id: u32,
}

impl LineHit {
    fn from_cell_hit(hit: CellHit, cell_id: u32) -> Self {
        Self {
            t: hit.t,
            point: hit.point,
            pcoords: hit.pcoords,
            sub_id: hit.sub_id,
            cell_id,
        }
    }
}

/// The first axis found to separate two boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparatingAxis {
    /// The line joining the two box centers.
    CenterLine,
    /// Face normal `i` of the second box.
    FaceB(usize),
    /// Face normal `i` of the first box.
    FaceA(usize),
    /// Cross product of edge `i` of the first box with edge `j` of the second.
    Edge(usize, usize),
}

// Face normals of a box. A collapsed axis is replaced by the normal of the
// face the other two span, so flat boxes still get tested on their plane.
fn face_normals(obb: &OrientedBox) -> [Vector3<f64>; 3] {
    let [a0, a1, a2] = obb.axes;
    let mut normals = obb.axes;
    if a0.norm_squared() == 0.0 {
        normals[0] = a1.cross(&a2);
    }
    if a1.norm_squared() == 0.0 {
        normals[1] = a2.cross(&a0);
    }
    if a2.norm_squared() == 0.0 {
        normals[2] = a0.cross(&a1);
    }
    normals
}

#[inline]
fn box_radius(obb: &OrientedBox, axis: &Vector3<f64>) -> f64 {
    0.5 * obb.axes.iter().map(|a| a.dot(axis).abs()).sum::<f64>()
}

/// Check if the segment `p0 -> p1` can touch the box of `node`.
///
/// Exact separating-axis test over the three face normals, the segment
/// direction and the three face-normal × direction cross products.
pub fn line_intersects_node(node: &ObbNode, p0: &Point3<f64>, p1: &Point3<f64>) -> bool {
    let obb = &node.obb;
    let half = (p1 - p0) * 0.5;
    let offset = (p0 + half) - obb.center();
    let normals = face_normals(obb);

    let separated = |axis: &Vector3<f64>| {
        offset.dot(axis).abs() > box_radius(obb, axis) + half.dot(axis).abs()
    };

    if normals.iter().any(separated) || separated(&half) {
        return false;
    }
    !normals.iter().any(|n| separated(&n.cross(&half)))
}

/// Check if a triangle overlaps the box of `node`.
///
/// The triangle is first mapped through `xform` when one is given. Projection
/// intervals are widened by `eps` before comparing.
pub fn triangle_intersects_node(
    node: &ObbNode,
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    xform: Option<&Matrix4<f64>>,
    eps: f64,
) -> bool {
    let tri = match xform {
        Some(m) => [transform_point(m, p0), transform_point(m, p1), transform_point(m, p2)],
        None => [*p0, *p1, *p2],
    };
    let obb = &node.obb;
    let center = obb.center();
    let normals = face_normals(obb);
    let edges = [tri[1] - tri[0], tri[2] - tri[1], tri[0] - tri[2]];

    let separated = |axis: &Vector3<f64>| {
        let Some(n) = normalize(axis) else {
            return false;
        };
        let c = center.coords.dot(&n);
        let r = box_radius(obb, &n);
        let proj = tri.map(|p| p.coords.dot(&n));
        let t_min = proj[0].min(proj[1]).min(proj[2]);
        let t_max = proj[0].max(proj[1]).max(proj[2]);
        t_max + eps < c - r || c + r + eps < t_min
    };

    if separated(&edges[0].cross(&edges[1])) {
        return false;
    }
    if normals.iter().any(separated) {
        return false;
    }
    for n in &normals {
        for e in &edges {
            if separated(&n.cross(e)) {
                return false;
            }
        }
    }
    true
}

/// Find the first axis separating box `a` from box `b`.
///
/// `xform`, when given, maps `b` into the frame of `a`. Candidate axes are
/// tried in order: the center line, the faces of `b`, the faces of `a`, then
/// the nine edge cross products. Returns `None` when the boxes overlap.
pub fn separating_axis(
    a: &ObbNode,
    b: &ObbNode,
    xform: Option<&Matrix4<f64>>,
    eps: f64,
) -> Option<SeparatingAxis> {
    let box_a = a.obb;
    let box_b = match xform {
        Some(m) => b.obb.transformed(m),
        None => b.obb,
    };

    let center_offset = box_b.center() - box_a.center();
    let separated = |axis: &Vector3<f64>| {
        let Some(n) = normalize(axis) else {
            return false;
        };
        center_offset.dot(&n).abs() > box_radius(&box_a, &n) + box_radius(&box_b, &n) + eps
    };

    if separated(&center_offset) {
        return Some(SeparatingAxis::CenterLine);
    }

    let normals_b = face_normals(&box_b);
    if let Some(i) = normals_b.iter().position(separated) {
        return Some(SeparatingAxis::FaceB(i));
    }

    let normals_a = face_normals(&box_a);
    if let Some(i) = normals_a.iter().position(separated) {
        return Some(SeparatingAxis::FaceA(i));
    }

    for (i, na) in normals_a.iter().enumerate() {
        for (j, nb) in normals_b.iter().enumerate() {
            if separated(&na.cross(nb)) {
                return Some(SeparatingAxis::Edge(i, j));
            }
        }
    }

    None
}

/// Check if two boxes are disjoint. See [`separating_axis`].
#[inline]
pub fn disjoint_obb_nodes(
    a: &ObbNode,
    b: &ObbNode,
    xform: Option<&Matrix4<f64>>,
    eps: f64,
) -> bool {
    separating_axis(a, b, xform, eps).is_some()
}

impl<'m, M: MeshSource + ?Sized> ObbTree<'m, M> {
    /// Closest cell hit along the segment `a0 -> a1`.
    ///
    /// `tol` widens the acceptance region of each cell test. Returns `None`
    /// when nothing is hit, the tree is not built, or the tree was built
    /// without retaining cell lists.
    pub fn intersect_with_line(
        &self,
        a0: &Point3<f64>,
        a1: &Point3<f64>,
        tol: f64,
    ) -> Option<LineHit> {
        let mut best: Option<LineHit> = None;
        self.visit_line_hits(a0, a1, tol, |hit| {
            if best.is_none_or(|b| hit.t < b.t) {
                best = Some(hit);
            }
        });
        best
    }

    /// Every surface crossing along the segment `a0 -> a1`, ordered by `t`.
    ///
    /// A crossing through an edge or vertex shared by several cells is
    /// reported once.
    pub fn intersect_with_line_all(
        &self,
        a0: &Point3<f64>,
        a1: &Point3<f64>,
        tol: f64,
    ) -> Vec<LineHit> {
        let mut hits = Vec::new();
        self.visit_line_hits(a0, a1, tol, |hit| hits.push(hit));
        hits.sort_by(|x, y| x.t.total_cmp(&y.t).then(x.cell_id.cmp(&y.cell_id)));
        hits.dedup_by(|later, kept| later.t - kept.t <= SAME_CROSSING_T);
        hits
    }

    fn visit_line_hits(
        &self,
        a0: &Point3<f64>,
        a1: &Point3<f64>,
        tol: f64,
        mut on_hit: impl FnMut(LineHit),
    ) {
        let (Some(mesh), Some(root)) = (self.mesh, self.root_id()) else {
            return;
        };
        if !self.params.retain_cell_lists {
            warn!(
                target: "mesh_obb::query",
                "Line query on a tree built without cell lists; enable retain_cell_lists"
            );
            return;
        }

        let mut stack = vec![root];
        let mut visited = 0usize;
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            if !line_intersects_node(node, a0, a1) {
                continue;
            }
            visited += 1;
            match node.children {
                Some([left, right]) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => {
                    for &cell_id in node.cell_ids() {
                        if let Some(hit) = mesh.cell_intersects_segment(cell_id as usize, a0, a1, tol)
                        {
                            on_hit(LineHit::from_cell_hit(hit, cell_id));
                        }
                    }
                }
            }
        }
        trace!(target: "mesh_obb::query", visited = visited, "Line traversal finished");
    }

    /// Walk this tree and `other` together, calling `callback` for every pair
    /// of leaves whose boxes overlap.
    ///
    /// `xform` maps `other` into this tree's frame. Non-negative callback
    /// results are summed, saturating at `i32::MAX`, and returned. A negative
    /// result stops the traversal at once and is returned as is. Boxes are
    /// compared with this tree's tolerance.
    pub fn intersect_with_obb_tree<N, F>(
        &self,
        other: &ObbTree<'_, N>,
        xform: Option<&Matrix4<f64>>,
        mut callback: F,
    ) -> i32
    where
        N: MeshSource + ?Sized,
        F: FnMut(&ObbNode, &ObbNode, Option<&Matrix4<f64>>) -> i32,
    {
        let (Some(root_a), Some(root_b)) = (self.root_id(), other.root_id()) else {
            return 0;
        };
        let eps = self.params.tolerance;
        let disjoint = |a: &ObbNode, b: &ObbNode| disjoint_obb_nodes(a, b, xform, eps);

        if disjoint(&self.nodes[root_a.index()], &other.nodes[root_b.index()]) {
            return 0;
        }

        let mut total: i32 = 0;
        let mut stack = vec![(root_a, root_b)];
        while let Some((ia, ib)) = stack.pop() {
            let a = &self.nodes[ia.index()];
            let b = &other.nodes[ib.index()];

            match (a.children, b.children) {
                (None, None) => {
                    let result = callback(a, b, xform);
                    if result < 0 {
                        return result;
                    }
                    total = total.saturating_add(result);
                }
                (None, Some(kids_b)) => {
                    for kb in kids_b {
                        if !disjoint(a, &other.nodes[kb.index()]) {
                            stack.push((ia, kb));
                        }
                    }
                }
                (Some(kids_a), None) => {
                    for ka in kids_a {
                        if !disjoint(&self.nodes[ka.index()], b) {
                            stack.push((ka, ib));
                        }
                    }
                }
                (Some(kids_a), Some(kids_b)) => {
                    for ka in kids_a {
                        for kb in kids_b {
                            if !disjoint(&self.nodes[ka.index()], &other.nodes[kb.index()]) {
                                stack.push((ka, kb));
                            }
                        }
                    }
                }
            }
        }
        total
    }
}
