//! Polygonal representation of the boxes in a tree, for inspection.

use crate::node::NodeId;
use crate::tree::ObbTree;
use crate::types::{CellType, MeshSource, PolyMesh};

// Quads of a box, as corner indices where bit k selects axis k.
const BOX_FACES: [[u32; 4]; 6] = [
    [0, 2, 3, 1],
    [0, 1, 5, 4],
    [0, 4, 6, 2],
    [1, 3, 7, 5],
    [4, 5, 7, 6],
    [2, 6, 7, 3],
];

impl<'m, M: MeshSource + ?Sized> ObbTree<'m, M> {
    /// Emit the boxes at `level` as a quad mesh, eight points and six quads
    /// per box. `None` emits every leaf instead.
    ///
    /// Leaves above the requested level are not emitted.
    pub fn generate_representation(&self, level: Option<u32>) -> PolyMesh {
        let mut out = PolyMesh::new();
        let Some(root) = self.root_id() else {
            return out;
        };

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            let emit = match level {
                Some(l) => node.level == l,
                None => node.is_leaf(),
            };

            if emit {
                append_box(&mut out, &node.obb.corners());
            } else if let Some([left, right]) = node.children
                && level.is_none_or(|l| node.level < l)
            {
                stack.push(right);
                stack.push(left);
            }
        }
        out
    }

    /// Ids of the nodes at exactly `level`, in depth-first order.
    pub fn nodes_at_level(&self, level: u32) -> Vec<NodeId> {
        let mut found = Vec::new();
        let Some(root) = self.root_id() else {
            return found;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            if node.level == level {
                found.push(id);
            } else if let Some([left, right]) = node.children {
                stack.push(right);
                stack.push(left);
            }
        }
        found
    }
}

fn append_box(out: &mut PolyMesh, corners: &[nalgebra::Point3<f64>; 8]) {
    let base = out.points.len() as u32;
    out.points.extend_from_slice(corners);
    for face in BOX_FACES {
        out.add_cell(CellType::Quad, &face.map(|i| base + i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ObbTreeParams;

    fn row_mesh(n: u32) -> PolyMesh {
        let mut mesh = PolyMesh::new();
        for i in 0..n {
            let x = 2.0 * i as f64;
            let a = mesh.add_point(x, 0.0, 0.0);
            let b = mesh.add_point(x + 1.0, 0.0, 0.0);
            let c = mesh.add_point(x, 1.0, 0.0);
            mesh.add_triangle([a, b, c]);
        }
        mesh
    }

    #[test]
    fn test_root_representation() {
        let mesh = row_mesh(10);
        let mut tree = ObbTree::with_data_set(&mesh);
        tree.build_locator().unwrap();

        let rep = tree.generate_representation(Some(0));
        assert_eq!(rep.point_count(), 8);
        assert_eq!(rep.cell_count(), 6);
        assert!(rep.cells.iter().all(|c| c.cell_type == CellType::Quad));
    }

    #[test]
    fn test_leaf_representation() {
        let mesh = row_mesh(40);
        let params = ObbTreeParams::default().with_cells_per_bucket(5);
        let mut tree = ObbTree::with_params(&mesh, params);
        tree.build_locator().unwrap();

        let leaves = tree.statistics().leaf_count;
        let rep = tree.generate_representation(None);
        assert_eq!(rep.point_count(), 8 * leaves);
        assert_eq!(rep.cell_count(), 6 * leaves);

        let level_one = tree.generate_representation(Some(1));
        assert_eq!(level_one.cell_count(), 12);
        assert_eq!(tree.nodes_at_level(1).len(), 2);
    }

    #[test]
    fn test_empty_tree_representation() {
        let tree: ObbTree<'_, PolyMesh> = ObbTree::new();
        assert!(tree.generate_representation(None).is_empty());
    }
}
