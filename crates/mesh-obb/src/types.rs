//! Core mesh data types and the mesh source interface consumed by the tree.

use nalgebra::{Point3, Vector3};
use std::sync::atomic::{AtomicU64, Ordering};

static GLOBAL_CLOCK: AtomicU64 = AtomicU64::new(1);

/// Returns a new process-wide modification timestamp.
///
/// Timestamps are strictly increasing, so comparing two of them tells which
/// event happened later. Meshes stamp themselves on every edit and trees stamp
/// parameter changes and builds.
#[inline]
pub fn next_timestamp() -> u64 {
    GLOBAL_CLOCK.fetch_add(1, Ordering::Relaxed)
}

/// Type tag of a mesh cell.
///
/// Only the polygonal types decompose into triangles. The others are carried
/// so that mixed meshes can be indexed, but contribute no surface area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    Vertex,
    Line,
    PolyLine,
    Triangle,
    Polygon,
    Quad,
    TriangleStrip,
}

impl CellType {
    /// Whether cells of this type decompose into triangles.
    #[inline]
    pub fn is_triangulable(&self) -> bool {
        matches!(
            self,
            CellType::Triangle | CellType::Polygon | CellType::Quad | CellType::TriangleStrip
        )
    }

    /// Point ids of sub-triangle `idx` of a cell with the given point list.
    ///
    /// Fans (triangle, polygon, quad) share their first point; strips
    /// alternate winding so every sub-triangle keeps the strip's orientation.
    #[inline]
    pub fn sub_triangle(&self, ids: &[u32], idx: usize) -> Option<[u32; 3]> {
        if idx + 2 >= ids.len() {
            return None;
        }
        match self {
            CellType::Triangle | CellType::Polygon | CellType::Quad => {
                Some([ids[0], ids[idx + 1], ids[idx + 2]])
            }
            CellType::TriangleStrip => {
                let odd = idx & 1;
                Some([ids[idx], ids[idx + 1 + odd], ids[idx + 2 - odd]])
            }
            _ => None,
        }
    }

    /// Iterate the sub-triangles of a cell.
    pub fn triangulate<'a>(&self, ids: &'a [u32]) -> impl Iterator<Item = [u32; 3]> + 'a {
        let cell_type = *self;
        let count = if cell_type.is_triangulable() {
            ids.len().saturating_sub(2)
        } else {
            0
        };
        (0..count).filter_map(move |idx| cell_type.sub_triangle(ids, idx))
    }
}

/// A polygonal cell referencing points by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub cell_type: CellType,
    pub point_ids: Vec<u32>,
}

impl Cell {
    /// Create a new cell.
    #[inline]
    pub fn new(cell_type: CellType, point_ids: impl Into<Vec<u32>>) -> Self {
        Self {
            cell_type,
            point_ids: point_ids.into(),
        }
    }

    /// Create a triangle cell.
    #[inline]
    pub fn triangle(ids: [u32; 3]) -> Self {
        Self::new(CellType::Triangle, ids)
    }
}

/// Result of intersecting a segment with a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellHit {
    /// Parametric position along the segment, in `[0, 1]`.
    pub t: f64,
    /// Intersection point.
    pub point: Point3<f64>,
    /// Parametric coordinates within the hit sub-triangle.
    pub pcoords: [f64; 3],
    /// Index of the sub-triangle that was hit.
    pub sub_id: usize,
}

/// Read access to the points and cells an OBB tree is built over.
///
/// Implementors must bump [`MeshSource::modified_time`] (using
/// [`next_timestamp`]) whenever points or cells change, otherwise a tree built
/// over the mesh will not notice it went stale.
pub trait MeshSource {
    /// Number of points.
    fn number_of_points(&self) -> usize;

    /// Coordinates of a point.
    fn point(&self, point_id: u32) -> Point3<f64>;

    /// Number of cells.
    fn number_of_cells(&self) -> usize;

    /// Type tag of a cell.
    fn cell_type(&self, cell_id: usize) -> CellType;

    /// Ordered point ids of a cell.
    fn cell_points(&self, cell_id: usize) -> &[u32];

    /// Timestamp of the last geometric or structural edit.
    fn modified_time(&self) -> u64;

    /// Sub-triangles of a cell with resolved coordinates.
    fn cell_triangles(&self, cell_id: usize) -> Vec<Triangle> {
        let ids = self.cell_points(cell_id);
        self.cell_type(cell_id)
            .triangulate(ids)
            .map(|[p, q, r]| Triangle::new(self.point(p), self.point(q), self.point(r)))
            .collect()
    }

    /// Intersect the segment `a0 -> a1` with a cell.
    ///
    /// The default decomposes the cell into triangles and returns the hit
    /// closest to `a0`. `tol` widens the barycentric acceptance region.
    fn cell_intersects_segment(
        &self,
        cell_id: usize,
        a0: &Point3<f64>,
        a1: &Point3<f64>,
        tol: f64,
    ) -> Option<CellHit> {
        let direction = a1 - a0;
        let mut best: Option<CellHit> = None;
        for (sub_id, tri) in self.cell_triangles(cell_id).iter().enumerate() {
            if let Some((t, u, v)) = tri.intersect_segment(a0, &direction, tol)
                && best.is_none_or(|b| t < b.t)
            {
                best = Some(CellHit {
                    t,
                    point: a0 + direction * t,
                    pcoords: [u, v, 0.0],
                    sub_id,
                });
            }
        }
        best
    }
}

/// An in-memory polygonal mesh.
///
/// Edits through the helper methods bump the modification timestamp. When
/// mutating `points` or `cells` directly, call [`PolyMesh::modified`].
#[derive(Debug, Clone)]
pub struct PolyMesh {
    /// Point coordinates.
    pub points: Vec<Point3<f64>>,

    /// Cells as indices into `points`.
    pub cells: Vec<Cell>,

    mtime: u64,
}

impl PolyMesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            cells: Vec::new(),
            mtime: next_timestamp(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(point_count: usize, cell_count: usize) -> Self {
        Self {
            points: Vec::with_capacity(point_count),
            cells: Vec::with_capacity(cell_count),
            mtime: next_timestamp(),
        }
    }

    /// Build a triangle mesh from points and index triples.
    pub fn from_triangles(points: Vec<Point3<f64>>, faces: &[[u32; 3]]) -> Self {
        let cells = faces.iter().map(|&f| Cell::triangle(f)).collect();
        Self {
            points,
            cells,
            mtime: next_timestamp(),
        }
    }

    /// Append a point and return its id.
    pub fn add_point(&mut self, x: f64, y: f64, z: f64) -> u32 {
        self.points.push(Point3::new(x, y, z));
        self.modified();
        (self.points.len() - 1) as u32
    }

    /// Append a cell and return its id.
    pub fn add_cell(&mut self, cell_type: CellType, point_ids: &[u32]) -> usize {
        self.cells.push(Cell::new(cell_type, point_ids));
        self.modified();
        self.cells.len() - 1
    }

    /// Append a triangle cell and return its id.
    pub fn add_triangle(&mut self, ids: [u32; 3]) -> usize {
        self.add_cell(CellType::Triangle, &ids)
    }

    /// Mark the mesh as changed.
    #[inline]
    pub fn modified(&mut self) {
        self.mtime = next_timestamp();
    }

    /// Number of points in the mesh.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of cells in the mesh.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Check if mesh is empty (no points or cells).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() || self.cells.is_empty()
    }

    /// Compute the axis-aligned bounding box.
    /// Returns (min_corner, max_corner) or None if mesh has no points.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.points.first()?;
        let mut min = *first;
        let mut max = *first;

        for p in &self.points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some((min, max))
    }

    /// Apply a homogeneous transform to every point.
    pub fn transform(&mut self, matrix: &nalgebra::Matrix4<f64>) {
        for p in &mut self.points {
            *p = crate::geometry::transform_point(matrix, p);
        }
        self.modified();
    }
}

impl Default for PolyMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshSource for PolyMesh {
    #[inline]
    fn number_of_points(&self) -> usize {
        self.points.len()
    }

    #[inline]
    fn point(&self, point_id: u32) -> Point3<f64> {
        self.points[point_id as usize]
    }

    #[inline]
    fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn cell_type(&self, cell_id: usize) -> CellType {
        self.cells[cell_id].cell_type
    }

    #[inline]
    fn cell_points(&self, cell_id: usize) -> &[u32] {
        &self.cells[cell_id].point_ids
    }

    #[inline]
    fn modified_time(&self) -> u64 {
        self.mtime
    }
}

/// A triangle with concrete vertex positions.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the area of the triangle.
    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Compute the centroid (center of mass).
    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    /// The three vertices as an array.
    #[inline]
    pub fn vertices(&self) -> [Point3<f64>; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Möller–Trumbore intersection restricted to the segment
    /// `origin .. origin + direction`.
    ///
    /// Returns `(t, u, v)` with `t` in `[0, 1]` and `(u, v)` the barycentric
    /// coordinates of the hit relative to `v1` and `v2`.
    pub fn intersect_segment(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        tol: f64,
    ) -> Option<(f64, f64, f64)> {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = direction.cross(&edge2);
        let a = edge1.dot(&h);

        // Segment parallel to the triangle plane
        if a.abs() < 1e-12 * edge1.norm() * edge2.norm() * direction.norm() || a == 0.0 {
            return None;
        }

        let f = 1.0 / a;
        let s = origin - self.v0;
        let u = f * s.dot(&h);
        if u < -tol || u > 1.0 + tol {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * direction.dot(&q);
        if v < -tol || u + v > 1.0 + tol {
            return None;
        }

        let t = f * edge2.dot(&q);
        if (0.0..=1.0).contains(&t) {
            Some((t, u, v))
        } else {
            None
        }
    }
}
