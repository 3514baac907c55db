//! Oriented boxes and the nodes of an OBB tree.
//!
//! Nodes live in an arena owned by the tree and refer to each other by
//! [`NodeId`]. A parent link is only a lookup index; ownership runs strictly
//! from the arena to its nodes, so dropping the arena drops the whole tree.

use nalgebra::{Matrix4, Point3, Vector3};

use crate::geometry::{normalize, transform_point};

/// Index of a node inside an OBB tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A box given by one corner and three edge vectors leaving it.
///
/// The edge vectors are mutually orthogonal for boxes produced by the fitter,
/// ordered by decreasing covariance eigenvalue, and not normalized: each one
/// spans the full extent of the box along its direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub corner: Point3<f64>,
    pub axes: [Vector3<f64>; 3],
}

impl Default for OrientedBox {
    fn default() -> Self {
        Self::zero_at(Point3::origin())
    }
}

impl OrientedBox {
    /// Create a box from a corner and three edge vectors.
    #[inline]
    pub fn new(corner: Point3<f64>, axes: [Vector3<f64>; 3]) -> Self {
        Self { corner, axes }
    }

    /// A zero-extent box at `corner`.
    #[inline]
    pub fn zero_at(corner: Point3<f64>) -> Self {
        Self {
            corner,
            axes: [Vector3::zeros(); 3],
        }
    }

    /// Center of the box.
    #[inline]
    pub fn center(&self) -> Point3<f64> {
        self.corner + (self.axes[0] + self.axes[1] + self.axes[2]) * 0.5
    }

    /// Volume spanned by the three edge vectors.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.axes[0].cross(&self.axes[1]).dot(&self.axes[2]).abs()
    }

    /// Edge lengths along each axis, longest first.
    #[inline]
    pub fn extents(&self) -> [f64; 3] {
        [self.axes[0].norm(), self.axes[1].norm(), self.axes[2].norm()]
    }

    /// The eight box corners.
    ///
    /// Corner `i` adds axis `k` whenever bit `k` of `i` is set.
    pub fn corners(&self) -> [Point3<f64>; 8] {
        std::array::from_fn(|i| {
            let mut p = self.corner;
            for (k, axis) in self.axes.iter().enumerate() {
                if i & (1 << k) != 0 {
                    p += axis;
                }
            }
            p
        })
    }

    /// Check if a point lies inside the box, allowing `tol` of slack in
    /// world units along each axis.
    pub fn contains_point(&self, p: &Point3<f64>, tol: f64) -> bool {
        let d = p - self.corner;
        self.axes.iter().all(|axis| {
            let len2 = axis.norm_squared();
            let proj = d.dot(axis);
            if len2 > 0.0 {
                let len = len2.sqrt();
                let s = proj / len;
                s >= -tol && s <= len + tol
            } else {
                true
            }
        }) && self.flat_directions_contain(&d, tol)
    }

    // Directions with no extent still need the point to lie in the box's span.
    fn flat_directions_contain(&self, d: &Vector3<f64>, tol: f64) -> bool {
        let mut residual = *d;
        // Gram-Schmidt over the non-degenerate axes
        let mut basis: Vec<Vector3<f64>> = Vec::with_capacity(3);
        for mut u in self.axes.iter().filter_map(normalize) {
            for b in &basis {
                u -= b * u.dot(b);
            }
            if let Some(u) = normalize(&u) {
                basis.push(u);
            }
        }
        for b in &basis {
            residual -= b * residual.dot(b);
        }
        residual.norm() <= tol
    }

    /// Map the box through a homogeneous transform.
    ///
    /// The corner and each axis endpoint are transformed as points and the
    /// axes re-derived by differencing, so translations are never applied to
    /// the edge vectors.
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        let corner = transform_point(matrix, &self.corner);
        let axes = self.axes.map(|axis| transform_point(matrix, &(self.corner + axis)) - corner);
        Self { corner, axes }
    }
}

/// A node of an OBB tree.
#[derive(Debug, Clone)]
pub struct ObbNode {
    /// Bounding box of every cell below this node.
    pub obb: OrientedBox,
    /// Parent node; `None` at the root.
    pub parent: Option<NodeId>,
    /// Child nodes; `None` at a leaf.
    pub children: Option<[NodeId; 2]>,
    /// Cell ids bounded by this leaf, kept only when the tree retains them.
    pub cells: Option<Vec<u32>>,
    /// Depth of the node (root is 0).
    pub level: u32,
}

impl ObbNode {
    pub(crate) fn new(parent: Option<NodeId>, level: u32) -> Self {
        Self {
            obb: OrientedBox::default(),
            parent,
            children: None,
            cells: None,
            level,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline]
    pub fn corner(&self) -> &Point3<f64> {
        &self.obb.corner
    }

    #[inline]
    pub fn axes(&self) -> &[Vector3<f64>; 3] {
        &self.obb.axes
    }

    /// Retained cell ids, or an empty slice.
    #[inline]
    pub fn cell_ids(&self) -> &[u32] {
        self.cells.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Translation3};

    fn unit_box() -> OrientedBox {
        OrientedBox::new(Point3::origin(), [Vector3::x(), Vector3::y(), Vector3::z()])
    }

    #[test]
    fn test_center_and_volume() {
        let b = OrientedBox::new(
            Point3::new(1.0, 1.0, 1.0),
            [
                Vector3::new(4.0, 0.0, 0.0),
                Vector3::new(0.0, 2.0, 0.0),
                Vector3::new(0.0, 0.0, 1.0),
            ],
        );
        assert_eq!(b.center(), Point3::new(3.0, 2.0, 1.5));
        assert!((b.volume() - 8.0).abs() < 1e-12);
        assert_eq!(b.extents(), [4.0, 2.0, 1.0]);
    }

    #[test]
    fn test_corners() {
        let corners = unit_box().corners();
        assert_eq!(corners[0], Point3::origin());
        assert_eq!(corners[7], Point3::new(1.0, 1.0, 1.0));
        assert_eq!(corners[5], Point3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_contains_point() {
        let b = unit_box();
        assert!(b.contains_point(&Point3::new(0.5, 0.5, 0.5), 0.0));
        assert!(b.contains_point(&Point3::new(1.0, 0.0, 1.0), 0.0));
        assert!(!b.contains_point(&Point3::new(1.1, 0.5, 0.5), 0.0));
        assert!(b.contains_point(&Point3::new(1.05, 0.5, 0.5), 0.1));
    }

    #[test]
    fn test_flat_box_containment() {
        let flat = OrientedBox::new(
            Point3::origin(),
            [Vector3::new(2.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0), Vector3::zeros()],
        );
        assert!(flat.contains_point(&Point3::new(1.0, 0.5, 0.0), 1e-9));
        assert!(!flat.contains_point(&Point3::new(1.0, 0.5, 0.2), 1e-9));
    }

    #[test]
    fn test_transformed_keeps_shape() {
        let rot = Rotation3::from_euler_angles(0.4, 0.1, -0.9);
        let xform = Translation3::new(5.0, -2.0, 1.0).to_homogeneous() * rot.to_homogeneous();
        let b = unit_box().transformed(&xform);

        assert!((b.volume() - 1.0).abs() < 1e-12);
        for axis in &b.axes {
            assert!((axis.norm() - 1.0).abs() < 1e-12);
        }
        let expected = transform_point(&xform, &Point3::new(0.5, 0.5, 0.5));
        assert!((b.center() - expected).norm() < 1e-12);
    }
}
