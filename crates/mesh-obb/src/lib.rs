//! Oriented bounding box trees over polygonal meshes.
//!
//! An [`ObbTree`] recursively partitions the cells of a mesh into tightly
//! fitting, arbitrarily oriented boxes. Once built it answers:
//!
//! - **Segment queries**: the closest cell hit along a segment, or every hit
//! - **Triangle and segment overlap** against single nodes
//! - **Tree/tree overlap**: simultaneous traversal of two trees under a
//!   transform, down to leaf pairs or to intersecting cell pairs
//!
//! Boxes are fitted from the area-weighted covariance of each node's
//! triangles. Box/box overlap uses the 15-axis separating axis test.
//!
//! # Quick Start
//!
//! ```
//! use mesh_obb::{ObbTree, PolyMesh};
//! use nalgebra::Point3;
//!
//! // A unit square in the z = 0 plane
//! let mesh = PolyMesh::from_triangles(
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     &[[0, 1, 2], [0, 2, 3]],
//! );
//!
//! let mut tree = ObbTree::with_data_set(&mesh);
//! tree.build_locator().unwrap();
//!
//! let hit = tree
//!     .intersect_with_line(&Point3::new(0.7, 0.2, 1.0), &Point3::new(0.7, 0.2, -1.0), 0.0)
//!     .unwrap();
//! assert_eq!(hit.cell_id, 0);
//! assert!((hit.t - 0.5).abs() < 1e-12);
//! ```
//!
//! # Staleness
//!
//! A tree borrows its mesh. [`ObbTree::build_locator`] compares the build
//! timestamp against the tree's parameter changes and
//! [`MeshSource::modified_time`], and only rebuilds when something changed.
//! Custom [`MeshSource`] implementations should stamp edits with
//! [`next_timestamp`].
//!
//! # Logging
//!
//! Builds and queries emit [`tracing`] events; see [`tracing_ext`] for the
//! targets.

mod builder;
mod collide;
mod error;
pub mod geometry;
mod node;
mod query;
mod represent;
pub mod tracing_ext;
mod tree;
mod types;

pub use builder::{ObbFit, compute_obb, compute_obb_from_points};
pub use collide::{CollisionParams, TreeIntersectionResult, triangles_intersect};
pub use error::{ObbError, ObbErrorCode, ObbResult, RecoverySuggestion};
pub use node::{NodeId, ObbNode, OrientedBox};
pub use query::{
    LineHit, SeparatingAxis, disjoint_obb_nodes, line_intersects_node, separating_axis,
    triangle_intersects_node,
};
pub use tree::{ObbTree, ObbTreeParams, TreeStatistics};
pub use types::{Cell, CellHit, CellType, MeshSource, PolyMesh, Triangle, next_timestamp};
