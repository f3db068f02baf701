//! Triangle mesh representation and geometric operations
//!
//! This module provides the indexed triangle mesh used by model volumes,
//! including:
//! - Affine transformations (translate, scale, rotate, mirror, generic 3x4)
//! - Bounding box calculation
//! - Manifold checking and hole repair
//! - Plane cuts and connected-component splitting
//! - 2D convex hull projection for arrangement footprints

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::geometry::{convex_hull, BoundingBox3, Point2, Polygon, Vertex, EPSILON};

/// A coordinate axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// The X axis
    X,
    /// The Y axis
    Y,
    /// The Z axis
    Z,
}

/// A triangle referencing three vertices by index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    /// First vertex index
    pub v1: usize,
    /// Second vertex index
    pub v2: usize,
    /// Third vertex index
    pub v3: usize,
}

impl Triangle {
    /// Create a new triangle
    pub fn new(v1: usize, v2: usize, v3: usize) -> Self {
        Self { v1, v2, v3 }
    }
}

/// An indexed triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions
    pub vertices: Vec<Vertex>,
    /// Triangles referencing the vertex list
    pub triangles: Vec<Triangle>,
}

impl TriangleMesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Number of triangles in the mesh
    pub fn facets_count(&self) -> usize {
        self.triangles.len()
    }

    /// Append all geometry from another mesh
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend(other.triangles.iter().map(|t| {
            Triangle::new(t.v1 + offset, t.v2 + offset, t.v3 + offset)
        }));
    }

    /// Shift every vertex
    pub fn translate(&mut self, dx: f64, dy: f64, dz: f64) {
        for v in &mut self.vertices {
            v.x += dx;
            v.y += dy;
            v.z += dz;
        }
    }

    /// Scale every vertex uniformly about the origin
    pub fn scale(&mut self, factor: f64) {
        self.scale_xyz(factor, factor, factor);
    }

    /// Scale every vertex per axis about the origin
    pub fn scale_xyz(&mut self, sx: f64, sy: f64, sz: f64) {
        for v in &mut self.vertices {
            v.x *= sx;
            v.y *= sy;
            v.z *= sz;
        }
    }

    /// Rotate the mesh about the Z axis by `angle` radians
    pub fn rotate_z(&mut self, angle: f64) {
        self.rotate(angle, Axis::Z);
    }

    /// Rotate the mesh about a coordinate axis by `angle` radians
    pub fn rotate(&mut self, angle: f64, axis: Axis) {
        let (s, c) = angle.sin_cos();
        for v in &mut self.vertices {
            let (x, y, z) = (v.x, v.y, v.z);
            match axis {
                Axis::X => {
                    v.y = c * y - s * z;
                    v.z = s * y + c * z;
                }
                Axis::Y => {
                    v.x = c * x + s * z;
                    v.z = -s * x + c * z;
                }
                Axis::Z => {
                    v.x = c * x - s * y;
                    v.y = s * x + c * y;
                }
            }
        }
    }

    /// Mirror the mesh across the plane perpendicular to `axis`
    ///
    /// Triangle winding is flipped to keep normals facing outward.
    pub fn mirror(&mut self, axis: Axis) {
        for v in &mut self.vertices {
            match axis {
                Axis::X => v.x = -v.x,
                Axis::Y => v.y = -v.y,
                Axis::Z => v.z = -v.z,
            }
        }
        for t in &mut self.triangles {
            std::mem::swap(&mut t.v2, &mut t.v3);
        }
    }

    /// Apply a 3x4 affine matrix in row-major order
    ///
    /// The matrix maps `v' = M * [x, y, z, 1]`.
    pub fn transform(&mut self, m: &[f64; 12]) {
        for v in &mut self.vertices {
            let (x, y, z) = (v.x, v.y, v.z);
            v.x = m[0] * x + m[1] * y + m[2] * z + m[3];
            v.y = m[4] * x + m[5] * y + m[6] * z + m[7];
            v.z = m[8] * x + m[9] * y + m[10] * z + m[11];
        }
    }

    /// Drop the mesh so that its lowest vertex sits at z = 0
    pub fn align_to_ground(&mut self) {
        let bb = self.bounding_box();
        if bb.defined {
            self.translate(0.0, 0.0, -bb.min.z);
        }
    }

    /// Axis-aligned bounds of all vertices referenced by at least one facet
    pub fn bounding_box(&self) -> BoundingBox3 {
        let mut bb = BoundingBox3::new();
        for t in &self.triangles {
            for &i in &[t.v1, t.v2, t.v3] {
                if let Some(&v) = self.vertices.get(i) {
                    bb.merge_point(v);
                }
            }
        }
        bb
    }

    /// Count of edges used by exactly one triangle
    ///
    /// Zero for a watertight mesh.
    pub fn open_edge_count(&self) -> usize {
        self.edge_counts()
            .values()
            .filter(|&&count| count == 1)
            .count()
    }

    /// Whether every edge is shared by exactly two triangles
    pub fn is_manifold(&self) -> bool {
        !self.is_empty() && self.edge_counts().values().all(|&count| count == 2)
    }

    /// Close open boundary loops with planar caps
    ///
    /// Boundary edges (used by exactly one triangle) are chained into loops
    /// and each loop is triangulated on its dominant plane. Loops that fail
    /// to chain or to triangulate produce an [`Error::InvalidMesh`].
    pub fn repair(&mut self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let loops = self.boundary_loops()?;
        for ring in loops {
            let cap = triangulate_loop(&self.vertices, &ring)?;
            self.triangles.extend(cap);
        }
        Ok(())
    }

    /// Split the mesh into connected components
    ///
    /// Two triangles are connected when they share a vertex. Components are
    /// returned as independent meshes with compacted vertex lists.
    pub fn split(&self) -> Vec<TriangleMesh> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut dsu = DisjointSet::new(self.vertices.len());
        for t in &self.triangles {
            dsu.union(t.v1, t.v2);
            dsu.union(t.v1, t.v3);
        }

        // Group facets by component root, preserving facet order.
        let mut roots: Vec<usize> = Vec::new();
        let mut groups: HashMap<usize, Vec<Triangle>> = HashMap::new();
        for t in &self.triangles {
            let root = dsu.find(t.v1);
            groups
                .entry(root)
                .or_insert_with(|| {
                    roots.push(root);
                    Vec::new()
                })
                .push(*t);
        }

        roots
            .iter()
            .map(|root| {
                let mut builder = MeshBuilder::new();
                for t in &groups[root] {
                    builder.push_triangle(
                        self.vertices[t.v1],
                        self.vertices[t.v2],
                        self.vertices[t.v3],
                    );
                }
                builder.into_mesh()
            })
            .collect()
    }

    /// Cut the mesh with the horizontal plane at the given Z height
    ///
    /// Returns the geometry above the plane and the geometry below it, in
    /// that order. Straddling triangles are split at the plane, vertices
    /// within [`EPSILON`] of the plane are snapped to it, and both halves
    /// are left with an open cross-section that callers close via
    /// [`TriangleMesh::repair`]. Either half may come back empty.
    pub fn cut(&self, z: f64) -> (TriangleMesh, TriangleMesh) {
        let mut upper = MeshBuilder::new();
        let mut lower = MeshBuilder::new();

        let snapped: Vec<Vertex> = self
            .vertices
            .iter()
            .map(|v| {
                if (v.z - z).abs() < EPSILON {
                    Vertex::new(v.x, v.y, z)
                } else {
                    *v
                }
            })
            .collect();

        for t in &self.triangles {
            let tri = [snapped[t.v1], snapped[t.v2], snapped[t.v3]];
            split_triangle_at_plane(&tri, z, &mut upper, &mut lower);
        }
        (upper.into_mesh(), lower.into_mesh())
    }

    /// Convex hull of the mesh projected onto the XY plane
    ///
    /// Degenerate meshes whose projection collapses to fewer than three
    /// distinct points produce an [`Error::InvalidMesh`].
    pub fn convex_hull_2d(&self) -> Result<Polygon> {
        let points: Vec<Point2> = self
            .vertices
            .iter()
            .map(|v| Point2::new(v.x, v.y))
            .collect();
        let hull = convex_hull(&points);
        if hull.points.len() < 3 {
            return Err(Error::InvalidMesh(
                "mesh projection is degenerate, no 2D footprint".to_string(),
            ));
        }
        Ok(hull)
    }

    fn edge_counts(&self) -> HashMap<(usize, usize), usize> {
        let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
        for t in &self.triangles {
            for (a, b) in [(t.v1, t.v2), (t.v2, t.v3), (t.v3, t.v1)] {
                let key = (a.min(b), a.max(b));
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Chain boundary edges into closed loops of vertex indices
    ///
    /// Directed boundary edges are followed in their facet orientation, so
    /// each loop comes back in consistent winding around its hole.
    fn boundary_loops(&self) -> Result<Vec<Vec<usize>>> {
        let counts = self.edge_counts();
        let mut next: HashMap<usize, usize> = HashMap::new();
        for t in &self.triangles {
            for (a, b) in [(t.v1, t.v2), (t.v2, t.v3), (t.v3, t.v1)] {
                let key = (a.min(b), a.max(b));
                if counts.get(&key) == Some(&1) {
                    next.insert(a, b);
                }
            }
        }

        let mut loops = Vec::new();
        while let Some((&start, _)) = next.iter().next() {
            let mut ring = vec![start];
            let mut cur = start;
            loop {
                let Some(succ) = next.remove(&cur) else {
                    return Err(Error::InvalidMesh(
                        "open boundary does not form a closed loop".to_string(),
                    ));
                };
                if succ == start {
                    break;
                }
                ring.push(succ);
                cur = succ;
            }
            if ring.len() < 3 {
                return Err(Error::InvalidMesh(
                    "boundary loop has fewer than three vertices".to_string(),
                ));
            }
            loops.push(ring);
        }
        Ok(loops)
    }
}

/// Incremental mesh builder that deduplicates vertices by exact coordinates
struct MeshBuilder {
    mesh: TriangleMesh,
    index: HashMap<(u64, u64, u64), usize>,
}

impl MeshBuilder {
    fn new() -> Self {
        Self {
            mesh: TriangleMesh::new(),
            index: HashMap::new(),
        }
    }

    fn vertex_id(&mut self, v: Vertex) -> usize {
        let key = (v.x.to_bits(), v.y.to_bits(), v.z.to_bits());
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.mesh.vertices.len();
        self.mesh.vertices.push(v);
        self.index.insert(key, i);
        i
    }

    fn push_triangle(&mut self, a: Vertex, b: Vertex, c: Vertex) {
        let (v1, v2, v3) = (self.vertex_id(a), self.vertex_id(b), self.vertex_id(c));
        // Snapping can collapse a sliver onto a single vertex; skip those.
        if v1 == v2 || v2 == v3 || v3 == v1 {
            return;
        }
        self.mesh.triangles.push(Triangle::new(v1, v2, v3));
    }

    fn into_mesh(self) -> TriangleMesh {
        self.mesh
    }
}

/// Distribute one triangle across a horizontal cutting plane
///
/// Vertices exactly on the plane (after snapping) count toward whichever
/// half the rest of the triangle falls into, so only genuinely straddling
/// triangles get split.
fn split_triangle_at_plane(
    tri: &[Vertex; 3],
    z: f64,
    upper: &mut MeshBuilder,
    lower: &mut MeshBuilder,
) {
    let side = |v: &Vertex| -> i8 {
        if v.z > z {
            1
        } else if v.z < z {
            -1
        } else {
            0
        }
    };
    let sides = [side(&tri[0]), side(&tri[1]), side(&tri[2])];
    let pos = sides.iter().filter(|&&s| s > 0).count();
    let neg = sides.iter().filter(|&&s| s < 0).count();

    if neg == 0 {
        upper.push_triangle(tri[0], tri[1], tri[2]);
        return;
    }
    if pos == 0 {
        lower.push_triangle(tri[0], tri[1], tri[2]);
        return;
    }

    if pos == 1 && neg == 1 {
        // One vertex on the plane: a single edge crosses it.
        let k = sides.iter().position(|&s| s == 0).unwrap_or(0);
        let a = tri[k];
        let b = tri[(k + 1) % 3];
        let c = tri[(k + 2) % 3];
        let p = plane_intersection(b, c, z);
        if side(&b) > 0 {
            upper.push_triangle(a, b, p);
            lower.push_triangle(a, p, c);
        } else {
            upper.push_triangle(a, p, c);
            lower.push_triangle(a, b, p);
        }
        return;
    }

    // No on-plane vertices: one vertex sits alone on its side.
    let alone_side: i8 = if pos == 1 { 1 } else { -1 };
    let k = sides
        .iter()
        .position(|&s| s == alone_side)
        .unwrap_or(0);
    let a = tri[k];
    let b = tri[(k + 1) % 3];
    let c = tri[(k + 2) % 3];
    let p_ab = plane_intersection(a, b, z);
    let p_ca = plane_intersection(c, a, z);
    let (one, two) = if alone_side > 0 {
        (&mut *upper, &mut *lower)
    } else {
        (&mut *lower, &mut *upper)
    };
    one.push_triangle(a, p_ab, p_ca);
    two.push_triangle(p_ab, b, c);
    two.push_triangle(p_ab, c, p_ca);
}

fn plane_intersection(a: Vertex, b: Vertex, z: f64) -> Vertex {
    let t = (z - a.z) / (b.z - a.z);
    Vertex::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y), z)
}

/// Triangulate one closed boundary loop on its dominant plane
fn triangulate_loop(vertices: &[Vertex], ring: &[usize]) -> Result<Vec<Triangle>> {
    // Newell normal of the loop decides which plane to flatten onto.
    let (mut nx, mut ny, mut nz) = (0.0_f64, 0.0_f64, 0.0_f64);
    for i in 0..ring.len() {
        let a = vertices[ring[i]];
        let b = vertices[ring[(i + 1) % ring.len()]];
        nx += (a.y - b.y) * (a.z + b.z);
        ny += (a.z - b.z) * (a.x + b.x);
        nz += (a.x - b.x) * (a.y + b.y);
    }

    let coords: Vec<f64> = ring
        .iter()
        .flat_map(|&i| {
            let v = vertices[i];
            if nx.abs() >= ny.abs() && nx.abs() >= nz.abs() {
                [v.y, v.z]
            } else if ny.abs() >= nz.abs() {
                [v.x, v.z]
            } else {
                [v.x, v.y]
            }
        })
        .collect();

    let indices = earcutr::earcut(&coords, &[], 2)
        .map_err(|e| Error::InvalidMesh(format!("boundary cap triangulation failed: {:?}", e)))?;
    if indices.len() < 3 {
        return Err(Error::InvalidMesh(
            "boundary cap triangulation produced no triangles".to_string(),
        ));
    }

    Ok(indices
        .chunks_exact(3)
        .map(|c| Triangle::new(ring[c[0]], ring[c[2]], ring[c[1]]))
        .collect())
}

/// Union-find over vertex indices
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// An axis-aligned unit-cube mesh scaled to the given edge length, with
    /// its minimum corner at the origin
    pub(crate) fn cube(edge: f64) -> TriangleMesh {
        let e = edge;
        let vertices = vec![
            Vertex::new(0.0, 0.0, 0.0),
            Vertex::new(e, 0.0, 0.0),
            Vertex::new(e, e, 0.0),
            Vertex::new(0.0, e, 0.0),
            Vertex::new(0.0, 0.0, e),
            Vertex::new(e, 0.0, e),
            Vertex::new(e, e, e),
            Vertex::new(0.0, e, e),
        ];
        let triangles = vec![
            // bottom
            Triangle::new(0, 2, 1),
            Triangle::new(0, 3, 2),
            // top
            Triangle::new(4, 5, 6),
            Triangle::new(4, 6, 7),
            // front
            Triangle::new(0, 1, 5),
            Triangle::new(0, 5, 4),
            // right
            Triangle::new(1, 2, 6),
            Triangle::new(1, 6, 5),
            // back
            Triangle::new(2, 3, 7),
            Triangle::new(2, 7, 6),
            // left
            Triangle::new(3, 0, 4),
            Triangle::new(3, 4, 7),
        ];
        TriangleMesh {
            vertices,
            triangles,
        }
    }

    #[test]
    fn test_cube_is_manifold() {
        let mesh = cube(10.0);
        assert!(mesh.is_manifold());
        assert_eq!(mesh.open_edge_count(), 0);
        assert_eq!(mesh.facets_count(), 12);
    }

    #[test]
    fn test_open_mesh_detected() {
        let mut mesh = cube(10.0);
        mesh.triangles.pop();
        assert!(!mesh.is_manifold());
        assert_eq!(mesh.open_edge_count(), 3);
    }

    #[test]
    fn test_repair_closes_hole() {
        let mut mesh = cube(10.0);
        mesh.triangles.pop();
        mesh.repair().unwrap();
        assert!(mesh.is_manifold());
    }

    #[test]
    fn test_translate_and_bounding_box() {
        let mut mesh = cube(10.0);
        mesh.translate(5.0, -3.0, 2.0);
        let bb = mesh.bounding_box();
        assert_eq!(bb.min, Vertex::new(5.0, -3.0, 2.0));
        assert_eq!(bb.max, Vertex::new(15.0, 7.0, 12.0));
    }

    #[test]
    fn test_scale_xyz() {
        let mut mesh = cube(1.0);
        mesh.scale_xyz(2.0, 3.0, 4.0);
        let size = mesh.bounding_box().size();
        assert_eq!(size, Vertex::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_rotate_z_quarter_turn() {
        let mut mesh = cube(10.0);
        mesh.rotate_z(std::f64::consts::FRAC_PI_2);
        let bb = mesh.bounding_box();
        assert!((bb.min.x - (-10.0)).abs() < 1e-9);
        assert!((bb.max.x - 0.0).abs() < 1e-9);
        assert!((bb.min.y - 0.0).abs() < 1e-9);
        assert!((bb.max.y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_mirror_keeps_manifold() {
        let mut mesh = cube(10.0);
        mesh.mirror(Axis::X);
        assert!(mesh.is_manifold());
        let bb = mesh.bounding_box();
        assert_eq!(bb.min.x, -10.0);
        assert_eq!(bb.max.x, 0.0);
    }

    #[test]
    fn test_transform_matrix_translation() {
        let mut mesh = cube(1.0);
        #[rustfmt::skip]
        let m = [
            1.0, 0.0, 0.0, 7.0,
            0.0, 1.0, 0.0, 8.0,
            0.0, 0.0, 1.0, 9.0,
        ];
        mesh.transform(&m);
        let bb = mesh.bounding_box();
        assert_eq!(bb.min, Vertex::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn test_merge_counts() {
        let mut a = cube(1.0);
        let mut b = cube(1.0);
        b.translate(10.0, 0.0, 0.0);
        a.merge(&b);
        assert_eq!(a.facets_count(), 24);
        assert_eq!(a.vertices.len(), 16);
    }

    #[test]
    fn test_split_two_components() {
        let mut a = cube(1.0);
        let mut b = cube(1.0);
        b.translate(10.0, 0.0, 0.0);
        a.merge(&b);
        let parts = a.split();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert_eq!(part.facets_count(), 12);
            assert!(part.is_manifold());
        }
    }

    #[test]
    fn test_split_single_component() {
        let parts = cube(1.0).split();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_cut_through_middle() {
        let mesh = cube(10.0);
        let (mut upper, mut lower) = mesh.cut(5.0);
        assert!(!upper.is_empty());
        assert!(!lower.is_empty());

        let ub = upper.bounding_box();
        let lb = lower.bounding_box();
        assert!((ub.min.z - 5.0).abs() < 1e-9);
        assert!((ub.max.z - 10.0).abs() < 1e-9);
        assert!((lb.min.z - 0.0).abs() < 1e-9);
        assert!((lb.max.z - 5.0).abs() < 1e-9);

        upper.repair().unwrap();
        lower.repair().unwrap();
        assert!(upper.is_manifold());
        assert!(lower.is_manifold());
    }

    #[test]
    fn test_cut_outside_range_leaves_one_half_empty() {
        let mesh = cube(10.0);
        let (upper, lower) = mesh.cut(20.0);
        assert!(upper.is_empty());
        assert_eq!(lower.facets_count(), 12);

        let (upper, lower) = mesh.cut(-5.0);
        assert_eq!(upper.facets_count(), 12);
        assert!(lower.is_empty());
    }

    #[test]
    fn test_cut_snaps_near_plane_vertices() {
        let mesh = cube(10.0);
        // Just under EPSILON away from a vertex layer: snapping keeps the
        // bottom face intact instead of producing slivers.
        let (upper, lower) = mesh.cut(EPSILON / 2.0);
        assert!(lower.is_empty());
        assert_eq!(upper.facets_count(), 12);
    }

    #[test]
    fn test_convex_hull_2d() {
        let mut mesh = cube(10.0);
        mesh.translate(-5.0, -5.0, 0.0);
        let hull = mesh.convex_hull_2d().unwrap();
        assert_eq!(hull.points.len(), 4);
        assert!((hull.signed_area().abs() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_convex_hull_2d_degenerate() {
        let mesh = TriangleMesh {
            vertices: vec![
                Vertex::new(0.0, 0.0, 0.0),
                Vertex::new(0.0, 0.0, 5.0),
                Vertex::new(0.0, 0.0, 10.0),
            ],
            triangles: vec![Triangle::new(0, 1, 2)],
        };
        assert!(matches!(
            mesh.convex_hull_2d(),
            Err(Error::InvalidMesh(_))
        ));
    }

    #[test]
    fn test_align_to_ground() {
        let mut mesh = cube(10.0);
        mesh.translate(0.0, 0.0, 42.0);
        mesh.align_to_ground();
        assert_eq!(mesh.bounding_box().min.z, 0.0);
    }
}
