//! Geometric primitives: vertices, 2D points, bounding boxes and polygons
//!
//! These are plain value types shared by the mesh, the entity graph and the
//! arrangement engine. Bounding boxes carry an explicit `defined` flag: a box
//! that never merged a point is undefined and callers must check before using
//! its extents.

use nalgebra::{Matrix4, Point3};

/// Epsilon used for floating-point comparisons throughout the crate
pub const EPSILON: f64 = 1e-4;

/// A 3D vertex with x, y, z coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A 2D point on the build platform plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point2 {
    /// Create a new point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// This point rotated about the origin by `angle` radians
    pub fn rotated(&self, angle: f64) -> Point2 {
        let (s, c) = angle.sin_cos();
        Point2::new(c * self.x - s * self.y, s * self.x + c * self.y)
    }

    /// Shift the point in place
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }
}

/// An axis-aligned 3D bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox3 {
    /// Minimum corner (meaningful only when `defined`)
    pub min: Vertex,
    /// Maximum corner (meaningful only when `defined`)
    pub max: Vertex,
    /// Whether at least one point has been merged into the box
    pub defined: bool,
}

impl Default for BoundingBox3 {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundingBox3 {
    /// Create a new, undefined bounding box
    pub fn new() -> Self {
        Self {
            min: Vertex::new(0.0, 0.0, 0.0),
            max: Vertex::new(0.0, 0.0, 0.0),
            defined: false,
        }
    }

    /// Grow the box to include a point
    pub fn merge_point(&mut self, p: Vertex) {
        if self.defined {
            self.min.x = self.min.x.min(p.x);
            self.min.y = self.min.y.min(p.y);
            self.min.z = self.min.z.min(p.z);
            self.max.x = self.max.x.max(p.x);
            self.max.y = self.max.y.max(p.y);
            self.max.z = self.max.z.max(p.z);
        } else {
            self.min = p;
            self.max = p;
            self.defined = true;
        }
    }

    /// Grow the box to include another box (undefined boxes merge as no-ops)
    pub fn merge(&mut self, other: &BoundingBox3) {
        if other.defined {
            self.merge_point(other.min);
            self.merge_point(other.max);
        }
    }

    /// Extent of the box along each axis
    pub fn size(&self) -> Vertex {
        Vertex::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }

    /// Center point of the box
    pub fn center(&self) -> Vertex {
        Vertex::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Shift the box in place
    pub fn translate(&mut self, dx: f64, dy: f64, dz: f64) {
        self.min.x += dx;
        self.min.y += dy;
        self.min.z += dz;
        self.max.x += dx;
        self.max.y += dy;
        self.max.z += dz;
    }

    /// Whether `other` lies entirely inside this box
    pub fn contains(&self, other: &BoundingBox3) -> bool {
        self.defined
            && other.defined
            && other.min.x >= self.min.x
            && other.max.x <= self.max.x
            && other.min.y >= self.min.y
            && other.max.y <= self.max.y
            && other.min.z >= self.min.z
            && other.max.z <= self.max.z
    }

    /// Whether `other` overlaps this box at all
    pub fn intersects(&self, other: &BoundingBox3) -> bool {
        self.defined
            && other.defined
            && other.min.x <= self.max.x
            && other.max.x >= self.min.x
            && other.min.y <= self.max.y
            && other.max.y >= self.min.y
            && other.min.z <= self.max.z
            && other.max.z >= self.min.z
    }

    /// Apply a homogeneous affine transform to the box
    ///
    /// Maps all eight corners and takes the axis-aligned bounds of the
    /// results, which over-approximates for rotations that are not multiples
    /// of 90 degrees.
    pub fn transformed(&self, m: &Matrix4<f64>) -> BoundingBox3 {
        let mut out = BoundingBox3::new();
        if !self.defined {
            return out;
        }
        for &x in &[self.min.x, self.max.x] {
            for &y in &[self.min.y, self.max.y] {
                for &z in &[self.min.z, self.max.z] {
                    let p = m.transform_point(&Point3::new(x, y, z));
                    out.merge_point(Vertex::new(p.x, p.y, p.z));
                }
            }
        }
        out
    }
}

/// An axis-aligned 2D rectangle (a bin, in arrangement terms)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox2 {
    /// Minimum corner (meaningful only when `defined`)
    pub min: Point2,
    /// Maximum corner (meaningful only when `defined`)
    pub max: Point2,
    /// Whether at least one point has been merged into the box
    pub defined: bool,
}

impl Default for BoundingBox2 {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundingBox2 {
    /// Create a new, undefined rectangle
    pub fn new() -> Self {
        Self {
            min: Point2::default(),
            max: Point2::default(),
            defined: false,
        }
    }

    /// Create a defined rectangle from two corners
    pub fn from_corners(min: Point2, max: Point2) -> Self {
        Self {
            min,
            max,
            defined: true,
        }
    }

    /// Grow the rectangle to include a point
    pub fn merge_point(&mut self, p: Point2) {
        if self.defined {
            self.min.x = self.min.x.min(p.x);
            self.min.y = self.min.y.min(p.y);
            self.max.x = self.max.x.max(p.x);
            self.max.y = self.max.y.max(p.y);
        } else {
            self.min = p;
            self.max = p;
            self.defined = true;
        }
    }

    /// Grow the rectangle to include another rectangle
    pub fn merge(&mut self, other: &BoundingBox2) {
        if other.defined {
            self.merge_point(other.min);
            self.merge_point(other.max);
        }
    }

    /// Width of the rectangle
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Height of the rectangle
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Center point of the rectangle
    pub fn center(&self) -> Point2 {
        Point2::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }
}

/// A simple polygon on the build platform plane
///
/// Used as the footprint primitive of the arrangement engine. Footprints are
/// convex by construction (they come from convex hulls) but the basic ring
/// operations here make no convexity assumption.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    /// The vertex ring, open or closed depending on the producer
    pub points: Vec<Point2>,
}

impl Polygon {
    /// Create a polygon from a vertex ring
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    /// Signed area via the shoelace formula (positive for counter-clockwise)
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            area += a.x * b.y - b.x * a.y;
        }
        area / 2.0
    }

    /// Whether the ring winds clockwise
    pub fn is_clockwise(&self) -> bool {
        self.signed_area() < 0.0
    }

    /// Reverse the ring if needed so that it winds clockwise
    pub fn make_clockwise(&mut self) {
        if !self.is_clockwise() {
            self.points.reverse();
        }
    }

    /// Rotate every vertex about the origin
    pub fn rotate(&mut self, angle: f64) {
        for p in &mut self.points {
            *p = p.rotated(angle);
        }
    }

    /// Scale every vertex about the origin
    pub fn scale(&mut self, factor: f64) {
        for p in &mut self.points {
            p.x *= factor;
            p.y *= factor;
        }
    }

    /// Shift every vertex
    pub fn translate(&mut self, dx: f64, dy: f64) {
        for p in &mut self.points {
            p.translate(dx, dy);
        }
    }

    /// Axis-aligned bounds of the ring
    pub fn bounding_box(&self) -> BoundingBox2 {
        let mut bb = BoundingBox2::new();
        for &p in &self.points {
            bb.merge_point(p);
        }
        bb
    }

    /// Whether a point is inside the polygon (ray casting; boundary counts as
    /// inside)
    pub fn contains_point(&self, p: Point2) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[j];
            if point_on_segment(p, a, b) {
                return true;
            }
            if (a.y > p.y) != (b.y > p.y) {
                let xint = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < xint {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Whether this polygon overlaps `other` (edge touching is not overlap)
    ///
    /// Exact for convex rings (separating-axis test); footprints are always
    /// convex so that is the only case the engine relies on.
    pub fn overlaps(&self, other: &Polygon) -> bool {
        if self.points.len() < 3 || other.points.len() < 3 {
            return false;
        }
        !has_separating_axis(self, other) && !has_separating_axis(other, self)
    }

    /// Minimum distance between this polygon and `other`
    ///
    /// Zero when the polygons overlap or touch.
    pub fn distance_to(&self, other: &Polygon) -> f64 {
        if self.overlaps(other) {
            return 0.0;
        }
        let mut best = f64::INFINITY;
        let n = self.points.len();
        let m = other.points.len();
        for i in 0..n {
            let a0 = self.points[i];
            let a1 = self.points[(i + 1) % n];
            for j in 0..m {
                let b0 = other.points[j];
                let b1 = other.points[(j + 1) % m];
                best = best.min(segment_distance(a0, a1, b0, b1));
            }
        }
        best
    }

    /// Grow a convex ring outward by `distance`
    ///
    /// Each edge is shifted along its outward normal and adjacent offset
    /// edges are re-intersected. At sharp corners this over-covers compared
    /// to a true rounded offset, which is the conservative direction for
    /// clearance enforcement.
    pub fn offset_convex(&self, distance: f64) -> Polygon {
        let ring = dedup_ring(&self.points);
        let n = ring.len();
        if n < 3 || distance == 0.0 {
            return Polygon::new(ring);
        }
        // Interior sits left of each edge in a counter-clockwise ring, so
        // outward is the right-hand normal; clockwise rings need the flip.
        let sign = if Polygon::new(ring.clone()).is_clockwise() {
            -1.0
        } else {
            1.0
        };
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let prev = ring[(i + n - 1) % n];
            let cur = ring[i];
            let next = ring[(i + 1) % n];
            let (p0, p1) = offset_edge(prev, cur, sign * distance);
            let (q0, q1) = offset_edge(cur, next, sign * distance);
            match line_intersection(p0, p1, q0, q1) {
                Some(p) => out.push(p),
                // Near-collinear edges: fall back to the shared offset point.
                None => out.push(q0),
            }
        }
        Polygon::new(out)
    }
}

/// Convex hull of a point set (Andrew monotone chain, counter-clockwise)
///
/// Collinear points on the hull boundary are dropped. Fewer than three
/// distinct input points produce a degenerate ring that callers must reject.
pub fn convex_hull(points: &[Point2]) -> Polygon {
    let mut pts: Vec<Point2> = points.to_vec();
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup_by(|a, b| (a.x - b.x).abs() < 1e-12 && (a.y - b.y).abs() < 1e-12);
    let n = pts.len();
    if n < 3 {
        return Polygon::new(pts);
    }

    let mut hull: Vec<Point2> = Vec::with_capacity(2 * n);
    // Lower hull
    for &p in &pts {
        while hull.len() >= 2
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    // Upper hull
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    Polygon::new(hull)
}

/// Cross product of (b - a) x (c - a)
pub(crate) fn cross(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn dedup_ring(points: &[Point2]) -> Vec<Point2> {
    let mut ring: Vec<Point2> = Vec::with_capacity(points.len());
    for &p in points {
        if ring
            .last()
            .is_none_or(|q| (q.x - p.x).abs() > 1e-12 || (q.y - p.y).abs() > 1e-12)
        {
            ring.push(p);
        }
    }
    if ring.len() > 1
        && (ring[0].x - ring[ring.len() - 1].x).abs() < 1e-12
        && (ring[0].y - ring[ring.len() - 1].y).abs() < 1e-12
    {
        ring.pop();
    }
    ring
}

fn offset_edge(a: Point2, b: Point2, distance: f64) -> (Point2, Point2) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-12 {
        return (a, b);
    }
    // Right-hand normal of the edge direction.
    let nx = dy / len * distance;
    let ny = -dx / len * distance;
    (
        Point2::new(a.x + nx, a.y + ny),
        Point2::new(b.x + nx, b.y + ny),
    )
}

fn line_intersection(p0: Point2, p1: Point2, q0: Point2, q1: Point2) -> Option<Point2> {
    let d1x = p1.x - p0.x;
    let d1y = p1.y - p0.y;
    let d2x = q1.x - q0.x;
    let d2y = q1.y - q0.y;
    let denom = d1x * d2y - d1y * d2x;
    if denom.abs() < 1e-12 {
        return None;
    }
    let t = ((q0.x - p0.x) * d2y - (q0.y - p0.y) * d2x) / denom;
    Some(Point2::new(p0.x + t * d1x, p0.y + t * d1y))
}

fn point_on_segment(p: Point2, a: Point2, b: Point2) -> bool {
    if cross(a, b, p).abs() > 1e-9 {
        return false;
    }
    p.x >= a.x.min(b.x) - 1e-12
        && p.x <= a.x.max(b.x) + 1e-12
        && p.y >= a.y.min(b.y) - 1e-12
        && p.y <= a.y.max(b.y) + 1e-12
}

/// True when some edge of `a` is a separating axis between `a` and `b`,
/// treating boundary contact as separated
fn has_separating_axis(a: &Polygon, b: &Polygon) -> bool {
    let n = a.points.len();
    for i in 0..n {
        let p0 = a.points[i];
        let p1 = a.points[(i + 1) % n];
        let ax = p1.y - p0.y;
        let ay = -(p1.x - p0.x);
        let len = (ax * ax + ay * ay).sqrt();
        if len < 1e-12 {
            continue;
        }
        let (mut amin, mut amax) = (f64::INFINITY, f64::NEG_INFINITY);
        for &p in &a.points {
            let d = (p.x * ax + p.y * ay) / len;
            amin = amin.min(d);
            amax = amax.max(d);
        }
        let (mut bmin, mut bmax) = (f64::INFINITY, f64::NEG_INFINITY);
        for &p in &b.points {
            let d = (p.x * ax + p.y * ay) / len;
            bmin = bmin.min(d);
            bmax = bmax.max(d);
        }
        if amax <= bmin + 1e-9 || bmax <= amin + 1e-9 {
            return true;
        }
    }
    false
}

fn point_segment_distance(p: Point2, a: Point2, b: Point2) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 < 1e-24 {
        return p.distance_to(&a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance_to(&Point2::new(a.x + t * dx, a.y + t * dy))
}

fn segments_intersect(a0: Point2, a1: Point2, b0: Point2, b1: Point2) -> bool {
    let d1 = cross(b0, b1, a0);
    let d2 = cross(b0, b1, a1);
    let d3 = cross(a0, a1, b0);
    let d4 = cross(a0, a1, b1);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

fn segment_distance(a0: Point2, a1: Point2, b0: Point2, b1: Point2) -> f64 {
    if segments_intersect(a0, a1, b0, b1) {
        return 0.0;
    }
    point_segment_distance(a0, b0, b1)
        .min(point_segment_distance(a1, b0, b1))
        .min(point_segment_distance(b0, a0, a1))
        .min(point_segment_distance(b1, a0, a1))
}
