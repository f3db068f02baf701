//! Build-platform arrangement of model instances
//!
//! Two packing strategies live here. When a bin (the printable area) is
//! given, instances are packed with a no-fit-polygon placer: every footprint
//! is the convex hull of its object's solid geometry under the instance
//! rotation and scaling, candidate positions come from Minkowski sums
//! against the already-placed footprints, and the position closest to the
//! bin center wins. Items that cannot fit the bin overflow into virtual
//! bins strided to the right of it. Without a bin, a simple rectangular
//! grid layout based on snug instance bounding boxes is used instead.
//!
//! All footprints are convex hulls, so overlap tests, Minkowski sums and
//! clearance offsets only need to handle convex rings.

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox2, Point2, Polygon};
use crate::model::Model;

/// Horizontal stride between overflow bins, as a multiple of the bin width
const STRIDE_PADDING: f64 = 1.2;

/// Where one arranged footprint ended up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrangedItem {
    /// Translation that places the footprint
    pub translation: Point2,
    /// Index of the bin the footprint landed in (0 is the real bed)
    pub bin_index: usize,
}

/// Pack convex footprints into a bin with pairwise clearance
///
/// Footprints are placed largest first; the returned placements are in
/// input order. Any two placed footprints end up at least `min_distance`
/// apart. Footprints that cannot fit the bin next to the already-placed
/// ones overflow into virtual bins strided along +X, unless
/// `first_bin_only` is set, in which case they are left unplaced (`None`
/// in the result) so the caller can keep them at their current position.
/// A footprint wider or taller than the bin itself is infeasible
/// regardless. The progress callback receives the number of placed
/// footprints after each placement.
pub fn arrange_polygons(
    footprints: &[Polygon],
    min_distance: f64,
    bin: &BoundingBox2,
    first_bin_only: bool,
    mut progress: Option<&mut dyn FnMut(usize)>,
) -> Result<Vec<Option<ArrangedItem>>> {
    let norm = (bin.width() * bin.height()).sqrt();

    // Largest area first, like a human packing a plate.
    let mut order: Vec<usize> = (0..footprints.len()).collect();
    order.sort_by(|&a, &b| {
        let area_a = footprints[a].signed_area().abs();
        let area_b = footprints[b].signed_area().abs();
        area_b
            .partial_cmp(&area_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Placed footprint per bin, inflated by the clearance distance so that
    // NFP contact and overlap tests both enforce it.
    let mut placed: Vec<(usize, Polygon)> = Vec::new();
    let mut results: Vec<Option<ArrangedItem>> = vec![None; footprints.len()];
    let mut placed_count = 0;

    for &item_index in &order {
        let hull = normalized_ccw(&footprints[item_index]);
        if hull.points.len() < 3 {
            return Err(Error::ArrangementInfeasible(
                "footprint is degenerate".to_string(),
            ));
        }
        let item_bb = hull.bounding_box();
        if item_bb.width() > bin.width() + 1e-9 || item_bb.height() > bin.height() + 1e-9 {
            return Err(Error::ArrangementInfeasible(format!(
                "footprint of {:.1}x{:.1} exceeds the {:.1}x{:.1} bin",
                item_bb.width(),
                item_bb.height(),
                bin.width(),
                bin.height()
            )));
        }

        let mut bin_index = 0;
        let translation = loop {
            if bin_index > 0 && first_bin_only {
                log::warn!(
                    "footprint {} does not fit the bin, leaving it unplaced",
                    item_index
                );
                break None;
            }
            let bin_b = strided_bin(bin, bin_index);
            // IFP of a convex shape in a rectangle is itself a rectangle of
            // valid translations.
            let ifp = BoundingBox2::from_corners(
                Point2::new(bin_b.min.x - item_bb.min.x, bin_b.min.y - item_bb.min.y),
                Point2::new(bin_b.max.x - item_bb.max.x, bin_b.max.y - item_bb.max.y),
            );

            if let Some(t) = best_position(&hull, &item_bb, &ifp, &bin_b, norm, &placed, bin_index)
            {
                break Some(t);
            }
            bin_index += 1;
            log::warn!(
                "footprint {} does not fit the bin next to the placed items, moving it to overflow bin {}",
                item_index,
                bin_index
            );
        };
        let Some(translation) = translation else {
            continue;
        };

        let mut inflated = hull.offset_convex(min_distance);
        inflated.translate(translation.x, translation.y);
        placed.push((bin_index, inflated));
        results[item_index] = Some(ArrangedItem {
            translation,
            bin_index,
        });
        placed_count += 1;
        if let Some(cb) = progress.as_mut() {
            cb(placed_count);
        }
    }

    Ok(results)
}

/// Lay rectangles of the given sizes out on a regular grid
///
/// Returns the desired center of each rectangle. With a bin the grid is
/// centered inside it and overflowing the bin capacity is an
/// [`Error::ArrangementInfeasible`]; without one the grid is roughly square
/// and centered on the origin.
pub fn arrange_rectangles(
    sizes: &[Point2],
    distance: f64,
    bin: Option<&BoundingBox2>,
) -> Result<Vec<Point2>> {
    if sizes.is_empty() {
        return Ok(Vec::new());
    }
    let cell_w = sizes.iter().map(|s| s.x).fold(0.0, f64::max) + distance;
    let cell_h = sizes.iter().map(|s| s.y).fold(0.0, f64::max) + distance;
    if cell_w <= 0.0 || cell_h <= 0.0 {
        return Err(Error::ArrangementInfeasible(
            "items have no platform extent and no spacing distance".to_string(),
        ));
    }

    let (columns, center) = match bin {
        Some(bin) => {
            let columns = ((bin.width() + distance) / cell_w).floor() as usize;
            let rows = ((bin.height() + distance) / cell_h).floor() as usize;
            if columns == 0 || rows == 0 || columns * rows < sizes.len() {
                return Err(Error::ArrangementInfeasible(format!(
                    "{} items do not fit a {}x{} grid on the bed",
                    sizes.len(),
                    columns,
                    rows
                )));
            }
            (columns, bin.center())
        }
        None => {
            let columns = (sizes.len() as f64).sqrt().ceil() as usize;
            (columns.max(1), Point2::default())
        }
    };

    let used_columns = sizes.len().min(columns);
    let used_rows = sizes.len().div_ceil(columns);
    let grid_w = used_columns as f64 * cell_w - distance;
    let grid_h = used_rows as f64 * cell_h - distance;
    let origin = Point2::new(center.x - grid_w / 2.0, center.y - grid_h / 2.0);

    Ok((0..sizes.len())
        .map(|k| {
            let col = (k % columns) as f64;
            let row = (k / columns) as f64;
            Point2::new(
                origin.x + col * cell_w + (cell_w - distance) / 2.0,
                origin.y + row * cell_h + (cell_h - distance) / 2.0,
            )
        })
        .collect())
}

/// Pick the cheapest valid position for one footprint in one bin
fn best_position(
    hull: &Polygon,
    item_bb: &BoundingBox2,
    ifp: &BoundingBox2,
    bin: &BoundingBox2,
    norm: f64,
    placed: &[(usize, Polygon)],
    bin_index: usize,
) -> Option<Point2> {
    if ifp.max.x < ifp.min.x - 1e-9 || ifp.max.y < ifp.min.y - 1e-9 {
        return None;
    }
    let occupied: Vec<&Polygon> = placed
        .iter()
        .filter(|(b, _)| *b == bin_index)
        .map(|(_, p)| p)
        .collect();

    let bin_center = bin.center();
    if occupied.is_empty() {
        // First footprint goes to the bin center.
        let t = Point2::new(
            bin_center.x - (item_bb.min.x + item_bb.max.x) / 2.0,
            bin_center.y - (item_bb.min.y + item_bb.max.y) / 2.0,
        );
        return Some(clamp_to_rect(t, ifp));
    }

    let mut candidates: Vec<Point2> = Vec::new();
    let reflected = reflect(hull);
    for other in &occupied {
        let nfp = minkowski_sum(other, &reflected);
        for &v in &nfp.points {
            candidates.push(clamp_to_rect(v, ifp));
        }
    }
    // Bin corners help when the walls, not the placed items, constrain.
    candidates.push(ifp.min);
    candidates.push(ifp.max);
    candidates.push(Point2::new(ifp.min.x, ifp.max.y));
    candidates.push(Point2::new(ifp.max.x, ifp.min.y));

    let mut best: Option<(f64, Point2)> = None;
    for t in candidates {
        let mut moved = hull.clone();
        moved.translate(t.x, t.y);
        if occupied.iter().any(|p| p.overlaps(&moved)) {
            continue;
        }
        let center = Point2::new(
            (item_bb.min.x + item_bb.max.x) / 2.0 + t.x,
            (item_bb.min.y + item_bb.max.y) / 2.0 + t.y,
        );
        let score = center.distance_to(&bin_center) / norm;
        if best.is_none_or(|(s, _)| score < s) {
            best = Some((score, t));
        }
    }
    best.map(|(_, t)| t)
}

fn strided_bin(bin: &BoundingBox2, index: usize) -> BoundingBox2 {
    let shift = index as f64 * bin.width() * STRIDE_PADDING;
    BoundingBox2::from_corners(
        Point2::new(bin.min.x + shift, bin.min.y),
        Point2::new(bin.max.x + shift, bin.max.y),
    )
}

fn clamp_to_rect(p: Point2, rect: &BoundingBox2) -> Point2 {
    Point2::new(
        p.x.clamp(rect.min.x, rect.max.x.max(rect.min.x)),
        p.y.clamp(rect.min.y, rect.max.y.max(rect.min.y)),
    )
}

/// Counter-clockwise copy of a convex ring
fn normalized_ccw(polygon: &Polygon) -> Polygon {
    let mut p = polygon.clone();
    if p.is_clockwise() {
        p.points.reverse();
    }
    p
}

/// Point reflection of a ring through the origin
fn reflect(polygon: &Polygon) -> Polygon {
    Polygon::new(
        polygon
            .points
            .iter()
            .map(|p| Point2::new(-p.x, -p.y))
            .collect(),
    )
}

/// Minkowski sum of two convex counter-clockwise rings
///
/// Linear-time edge merge; the result traces the positions where the second
/// ring touches the first.
fn minkowski_sum(a: &Polygon, b: &Polygon) -> Polygon {
    let a = rotate_to_bottom_start(&normalized_ccw(a));
    let b = rotate_to_bottom_start(&normalized_ccw(b));
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return Polygon::default();
    }

    let edge = |ring: &[Point2], i: usize| -> Point2 {
        let from = ring[i % ring.len()];
        let to = ring[(i + 1) % ring.len()];
        Point2::new(to.x - from.x, to.y - from.y)
    };

    let (mut i, mut j) = (0usize, 0usize);
    let mut out = Vec::with_capacity(n + m);
    while i < n || j < m {
        out.push(Point2::new(a[i % n].x + b[j % m].x, a[i % n].y + b[j % m].y));
        if i >= n {
            j += 1;
            continue;
        }
        if j >= m {
            i += 1;
            continue;
        }
        let ea = edge(&a, i);
        let eb = edge(&b, j);
        let cr = ea.x * eb.y - ea.y * eb.x;
        if cr > 1e-12 {
            i += 1;
        } else if cr < -1e-12 {
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
    }
    Polygon::new(out)
}

/// Rotate a ring so it starts at the bottom-most (then left-most) vertex
fn rotate_to_bottom_start(polygon: &Polygon) -> Vec<Point2> {
    let points = &polygon.points;
    if points.is_empty() {
        return Vec::new();
    }
    let mut start = 0;
    for (i, p) in points.iter().enumerate() {
        let s = points[start];
        if p.y < s.y || (p.y == s.y && p.x < s.x) {
            start = i;
        }
    }
    let mut out = Vec::with_capacity(points.len());
    out.extend_from_slice(&points[start..]);
    out.extend_from_slice(&points[..start]);
    out
}

impl Model {
    /// One convex footprint per instance, in placement order
    ///
    /// Instances whose raw mesh projects to fewer than three hull points
    /// cannot be packed and yield `None`.
    fn instance_footprints(&self) -> Vec<Option<Polygon>> {
        let mut footprints = Vec::new();
        for object in &self.objects {
            let hull = object.raw_mesh().convex_hull_2d().ok();
            for instance in &object.instances {
                footprints.push(hull.as_ref().map(|hull| {
                    let mut footprint = hull.clone();
                    instance.transform_polygon(&mut footprint);
                    footprint
                }));
            }
        }
        footprints
    }

    /// Arrange all instances on the platform, keeping instance counts
    ///
    /// With a bin, the no-fit-polygon placer packs the instance footprints
    /// with `dist` clearance and the return value says whether everything
    /// landed in the real bin (overflowed instances sit to its right).
    /// Without a bin, snug instance bounding boxes are laid out on a grid
    /// around the origin and `Ok(false)` is returned since there is no bin
    /// to fit.
    pub fn arrange_objects(
        &mut self,
        dist: f64,
        bin: Option<&BoundingBox2>,
        progress: Option<&mut dyn FnMut(usize)>,
    ) -> Result<bool> {
        match bin {
            Some(bin) if bin.defined => {
                // Degenerate footprints are excluded from packing and the
                // owning instances keep their current offsets.
                let footprints = self.instance_footprints();
                let packable: Vec<Polygon> =
                    footprints.iter().flatten().cloned().collect();
                if packable.is_empty() {
                    return Ok(true);
                }
                let placements = arrange_polygons(&packable, dist, bin, false, progress)?;

                let mut idx = 0;
                let mut placed = 0;
                let mut all_in_bin = true;
                for object in &mut self.objects {
                    for instance in &mut object.instances {
                        if footprints[idx].is_some() {
                            if let Some(item) = placements[placed] {
                                instance.offset = item.translation;
                                if item.bin_index > 0 {
                                    all_in_bin = false;
                                }
                            }
                            placed += 1;
                        }
                        idx += 1;
                    }
                    object.invalidate_bounding_box();
                }
                Ok(all_in_bin)
            }
            _ => {
                // Snug per-instance boxes account for rotation and scaling.
                let mut sizes = Vec::new();
                let mut centers = Vec::new();
                for object in &self.objects {
                    for index in 0..object.instances.len() {
                        let bb = object.instance_bounding_box(index)?;
                        sizes.push(Point2::new(bb.size().x, bb.size().y));
                        centers.push(Point2::new(bb.center().x, bb.center().y));
                    }
                }
                if sizes.is_empty() {
                    return Ok(false);
                }
                let positions = arrange_rectangles(&sizes, dist, None)?;

                let mut idx = 0;
                for object in &mut self.objects {
                    for instance in &mut object.instances {
                        instance.offset = Point2::new(
                            positions[idx].x - centers[idx].x,
                            positions[idx].y - centers[idx].y,
                        );
                        idx += 1;
                    }
                    object.invalidate_bounding_box();
                }
                Ok(false)
            }
        }
    }

    /// Duplicate the entire model, preserving relative instance positions
    ///
    /// The model is treated as one rigid group: `copies` rectangles of the
    /// whole model's size are laid out on a grid and every group of
    /// instances is shifted to its cell, the existing instances included.
    /// The object count is unchanged; only instances multiply. Fails with
    /// [`Error::ArrangementInfeasible`] when the copies cannot fit the bin,
    /// leaving the model untouched.
    pub fn duplicate(
        &mut self,
        copies: usize,
        dist: f64,
        bin: Option<&BoundingBox2>,
    ) -> Result<()> {
        if copies == 0 || self.objects.is_empty() {
            return Ok(());
        }
        let bb = self.bounding_box();
        if !bb.defined {
            return Ok(());
        }
        let size = Point2::new(bb.size().x, bb.size().y);
        let group_center = Point2::new(bb.center().x, bb.center().y);

        let sizes = vec![size; copies];
        let positions = arrange_rectangles(&sizes, dist, bin)?;

        for object in &mut self.objects {
            let originals = object.instances.clone();
            for (copy, position) in positions.iter().enumerate() {
                let shift = Point2::new(position.x - group_center.x, position.y - group_center.y);
                if copy == 0 {
                    for instance in &mut object.instances {
                        instance.offset.translate(shift.x, shift.y);
                    }
                } else {
                    for original in &originals {
                        let mut instance = *original;
                        instance.offset.translate(shift.x, shift.y);
                        object.instances.push(instance);
                    }
                }
            }
            object.invalidate_bounding_box();
        }
        Ok(())
    }

    /// Append copies of every instance, then rearrange everything
    pub fn duplicate_objects(
        &mut self,
        copies: usize,
        dist: f64,
        bin: Option<&BoundingBox2>,
    ) -> Result<()> {
        for object in &mut self.objects {
            let originals = object.instances.clone();
            for original in &originals {
                for _ in 1..copies.max(1) {
                    object.instances.push(*original);
                }
            }
            object.invalidate_bounding_box();
        }
        self.arrange_objects(dist, bin, None)?;
        Ok(())
    }

    /// Replace the single object's instances with an x-by-y grid
    ///
    /// Grid spacing comes from the object's mesh size plus `dist`. Only
    /// models holding exactly one object support this; anything else is an
    /// [`Error::UnsupportedOperation`] and leaves the model untouched.
    pub fn duplicate_objects_grid(&mut self, x: usize, y: usize, dist: f64) -> Result<()> {
        if self.objects.len() != 1 {
            return Err(Error::UnsupportedOperation(format!(
                "grid duplication needs exactly one object, model has {}",
                self.objects.len()
            )));
        }
        let object = &mut self.objects[0];
        let size = object.raw_mesh().bounding_box().size();
        object.clear_instances();
        for x_copy in 0..x {
            for y_copy in 0..y {
                let instance = object.add_instance();
                instance.offset.x = (size.x + dist) * x_copy as f64;
                instance.offset.y = (size.y + dist) * y_copy as f64;
            }
        }
        Ok(())
    }
}
