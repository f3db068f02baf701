//! Core entity graph: model, objects, volumes and instances
//!
//! A [`Model`] owns a list of [`ModelObject`]s plus the materials they refer
//! to. Each object owns its [`ModelVolume`]s (the actual meshes, some of
//! which are modifiers) and its [`ModelInstance`]s (placements on the build
//! platform). Ownership is strictly top-down: children are addressed by
//! index through their parent and never point back at it.
//!
//! Objects cache their placed bounding box. The cache is refreshed lazily by
//! [`ModelObject::bounding_box`] and must be dropped with
//! [`ModelObject::invalidate_bounding_box`] whenever volumes, instances or
//! their meshes change; every mutating method on the object does this
//! itself, so the contract only binds callers that reach into the public
//! fields directly.

use std::collections::BTreeMap;

use nalgebra::{Matrix4, Vector3};

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox3, Point2, Polygon, Vertex, EPSILON};
use crate::mesh::{Axis, TriangleMesh};
use crate::model::material::{MaterialId, ModelMaterial, MATERIAL_NONE};

/// Position of a placed instance relative to the printable volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintVolumeState {
    /// The instance fits entirely inside the print volume
    #[default]
    Inside,
    /// The instance overlaps the boundary of the print volume
    PartlyOutside,
    /// The instance lies entirely outside the print volume
    FullyOutside,
}

/// A layer-height override applied to one Z span of an object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerHeightRange {
    /// Bottom of the span
    pub min_z: f64,
    /// Top of the span
    pub max_z: f64,
    /// Layer height to use within the span
    pub height: f64,
}

/// Round-robin allocator of extruder ids for multipart conversion
///
/// Hands out ids starting at 1 and wraps after `max_extruders`.
#[derive(Debug, Clone)]
pub struct ExtruderIdAllocator {
    next_id: u32,
}

impl Default for ExtruderIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtruderIdAllocator {
    /// Create an allocator that starts at extruder 1
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Hand out the next extruder id, wrapping after `max_extruders`
    pub fn allocate(&mut self, max_extruders: u32) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        if self.next_id > max_extruders.max(1) {
            self.next_id = 1;
        }
        id
    }

    /// Restart the cycle at extruder 1
    pub fn reset(&mut self) {
        self.next_id = 1;
    }
}

/// One placement of a model object on the build platform
///
/// The transform pipeline is fixed: rotate about Z, scale uniformly, then
/// translate by `offset` in the platform plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInstance {
    /// Rotation about the Z axis, in radians
    pub rotation: f64,
    /// Uniform scaling factor
    pub scaling_factor: f64,
    /// Translation in the platform plane
    pub offset: Point2,
    /// Result of the latest print-volume check
    pub print_volume_state: PrintVolumeState,
}

impl Default for ModelInstance {
    fn default() -> Self {
        Self {
            rotation: 0.0,
            scaling_factor: 1.0,
            offset: Point2::default(),
            print_volume_state: PrintVolumeState::default(),
        }
    }
}

impl ModelInstance {
    /// Apply the instance transform to a mesh
    ///
    /// With `dont_translate` the platform offset is skipped, leaving the
    /// mesh in instance-local coordinates.
    pub fn transform_mesh(&self, mesh: &mut TriangleMesh, dont_translate: bool) {
        mesh.rotate_z(self.rotation);
        mesh.scale(self.scaling_factor);
        if !dont_translate {
            mesh.translate(self.offset.x, self.offset.y, 0.0);
        }
    }

    /// Bounding box of a mesh under the instance transform
    ///
    /// Scans every facet vertex instead of transforming box corners, so the
    /// result stays snug under rotation. Scaling is skipped when the factor
    /// is within [`EPSILON`] of one.
    pub fn transform_mesh_bounding_box(
        &self,
        mesh: &TriangleMesh,
        dont_translate: bool,
    ) -> BoundingBox3 {
        let (s, c) = self.rotation.sin_cos();
        let mut bbox = BoundingBox3::new();
        for t in &mesh.triangles {
            for &i in &[t.v1, t.v2, t.v3] {
                if let Some(v) = mesh.vertices.get(i) {
                    let mut p = *v;
                    let (x, y) = (p.x, p.y);
                    p.x = c * x - s * y;
                    p.y = s * x + c * y;
                    bbox.merge_point(p);
                }
            }
        }
        if bbox.defined {
            if (self.scaling_factor - 1.0).abs() > EPSILON {
                bbox.min.x *= self.scaling_factor;
                bbox.min.y *= self.scaling_factor;
                bbox.min.z *= self.scaling_factor;
                bbox.max.x *= self.scaling_factor;
                bbox.max.y *= self.scaling_factor;
                bbox.max.z *= self.scaling_factor;
            }
            if !dont_translate {
                bbox.translate(self.offset.x, self.offset.y, 0.0);
            }
        }
        bbox
    }

    /// Bounding box of a box under the instance transform
    ///
    /// Applies the affine transform analytically to the eight corners, which
    /// is fast but over-approximates rotated geometry.
    pub fn transform_bounding_box(
        &self,
        bbox: &BoundingBox3,
        dont_translate: bool,
    ) -> BoundingBox3 {
        let mut m = Matrix4::new_scaling(self.scaling_factor)
            * Matrix4::new_rotation(Vector3::z() * self.rotation);
        if !dont_translate {
            m = Matrix4::new_translation(&Vector3::new(self.offset.x, self.offset.y, 0.0)) * m;
        }
        bbox.transformed(&m)
    }

    /// Apply rotation and scaling (never translation) to a platform polygon
    pub fn transform_polygon(&self, polygon: &mut Polygon) {
        polygon.rotate(self.rotation);
        polygon.scale(self.scaling_factor);
    }
}

/// A mesh belonging to a model object
///
/// A volume is either solid geometry or, when `modifier` is set, a region
/// that only alters print settings of the geometry it overlaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelVolume {
    /// Display name of the volume
    pub name: String,
    /// The volume geometry
    pub mesh: TriangleMesh,
    /// Whether this volume is a settings modifier instead of solid geometry
    pub modifier: bool,
    /// Material assigned to the volume ([`MATERIAL_NONE`] when unassigned)
    pub material_id: MaterialId,
    /// Print configuration overrides for this volume
    pub config: BTreeMap<String, String>,
}

impl ModelVolume {
    /// Create a solid volume from a mesh
    pub fn new(mesh: TriangleMesh) -> Self {
        Self {
            mesh,
            ..Self::default()
        }
    }
}

/// A printable object: a set of volumes plus their placements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelObject {
    /// Display name of the object
    pub name: String,
    /// Path of the file the object was loaded from, empty when synthetic
    pub input_file: String,
    /// The object's volumes (solids and modifiers)
    pub volumes: Vec<ModelVolume>,
    /// Placements of the object on the platform
    pub instances: Vec<ModelInstance>,
    /// Print configuration overrides for this object
    pub config: BTreeMap<String, String>,
    /// Layer-height overrides by Z span
    pub layer_height_ranges: Vec<LayerHeightRange>,
    /// Translation applied when the object was centered around the origin
    pub origin_translation: Vertex,
    bounding_box_cache: Option<BoundingBox3>,
}

impl ModelObject {
    /// Create an empty object
    pub fn new() -> Self {
        Self {
            origin_translation: Vertex::new(0.0, 0.0, 0.0),
            ..Self::default()
        }
    }

    /// Copy of this object's metadata and instances, without any volumes
    fn clone_without_volumes(&self) -> ModelObject {
        ModelObject {
            name: self.name.clone(),
            input_file: self.input_file.clone(),
            volumes: Vec::new(),
            instances: self.instances.clone(),
            config: self.config.clone(),
            layer_height_ranges: self.layer_height_ranges.clone(),
            origin_translation: self.origin_translation,
            bounding_box_cache: None,
        }
    }

    /// Add a solid volume holding the given mesh
    pub fn add_volume(&mut self, mesh: TriangleMesh) -> &mut ModelVolume {
        self.volumes.push(ModelVolume::new(mesh));
        self.bounding_box_cache = None;
        self.volumes.last_mut().unwrap()
    }

    /// Remove the volume at `index`
    pub fn delete_volume(&mut self, index: usize) -> Result<()> {
        if index >= self.volumes.len() {
            return Err(Error::out_of_bounds("volume", index, self.volumes.len()));
        }
        self.volumes.remove(index);
        self.bounding_box_cache = None;
        Ok(())
    }

    /// Remove all volumes
    pub fn clear_volumes(&mut self) {
        self.volumes.clear();
        self.bounding_box_cache = None;
    }

    /// Add a default placement (no rotation, unit scale, origin offset)
    pub fn add_instance(&mut self) -> &mut ModelInstance {
        self.instances.push(ModelInstance::default());
        self.bounding_box_cache = None;
        self.instances.last_mut().unwrap()
    }

    /// Remove the instance at `index`
    pub fn delete_instance(&mut self, index: usize) -> Result<()> {
        if index >= self.instances.len() {
            return Err(Error::out_of_bounds("instance", index, self.instances.len()));
        }
        self.instances.remove(index);
        self.bounding_box_cache = None;
        Ok(())
    }

    /// Remove the most recently added instance
    pub fn delete_last_instance(&mut self) -> Result<()> {
        if self.instances.is_empty() {
            return Err(Error::out_of_bounds("instance", 0, 0));
        }
        self.instances.pop();
        self.bounding_box_cache = None;
        Ok(())
    }

    /// Remove all instances
    pub fn clear_instances(&mut self) {
        self.instances.clear();
        self.bounding_box_cache = None;
    }

    /// Drop the cached bounding box
    ///
    /// Required after mutating volumes, instances or meshes through the
    /// public fields; the object's own mutating methods call it internally.
    pub fn invalidate_bounding_box(&mut self) {
        self.bounding_box_cache = None;
    }

    /// Bounding box over all placed instances, cached until invalidated
    ///
    /// Merges the raw boxes of the solid volumes once, then maps that single
    /// box through each instance's affine transform, so it over-approximates
    /// rotated instances. Use [`instance_bounding_box`][Self::instance_bounding_box]
    /// where a snug box is needed. Undefined when the object has no instances
    /// or no solid geometry.
    pub fn bounding_box(&mut self) -> BoundingBox3 {
        if let Some(bb) = self.bounding_box_cache {
            return bb;
        }
        let mut raw = BoundingBox3::new();
        for volume in &self.volumes {
            if !volume.modifier {
                raw.merge(&volume.mesh.bounding_box());
            }
        }
        let mut bb = BoundingBox3::new();
        for instance in &self.instances {
            bb.merge(&instance.transform_bounding_box(&raw, false));
        }
        self.bounding_box_cache = Some(bb);
        bb
    }

    /// Merged mesh of all solid volumes, one copy per placed instance
    pub fn mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for instance in &self.instances {
            let mut m = self.raw_mesh();
            instance.transform_mesh(&mut m, false);
            mesh.merge(&m);
        }
        mesh
    }

    /// Merged mesh of all solid volumes in object-local coordinates
    pub fn raw_mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for volume in &self.volumes {
            if !volume.modifier {
                mesh.merge(&volume.mesh);
            }
        }
        mesh
    }

    /// Bounding box of the first instance without its platform offset
    ///
    /// Errors with [`Error::Precondition`] when the object has no instances,
    /// since the rotation and scaling to apply are unknown without one.
    pub fn raw_bounding_box(&self) -> Result<BoundingBox3> {
        let Some(instance) = self.instances.first() else {
            return Err(Error::Precondition(
                "raw_bounding_box requires at least one instance".to_string(),
            ));
        };
        let mut bb = BoundingBox3::new();
        for volume in &self.volumes {
            if !volume.modifier {
                bb.merge(&instance.transform_mesh_bounding_box(&volume.mesh, true));
            }
        }
        Ok(bb)
    }

    /// Bounding box of one instance without its platform offset
    pub fn instance_bounding_box(&self, index: usize) -> Result<BoundingBox3> {
        let Some(instance) = self.instances.get(index) else {
            return Err(Error::out_of_bounds("instance", index, self.instances.len()));
        };
        let mut bb = BoundingBox3::new();
        for volume in &self.volumes {
            if !volume.modifier {
                bb.merge(&instance.transform_mesh_bounding_box(&volume.mesh, true));
            }
        }
        Ok(bb)
    }

    /// Move the object geometry so that it is centered on the XY origin and
    /// rests on the platform
    ///
    /// Instance offsets are compensated (with each instance's rotation and
    /// scaling applied to the shift) so final placed positions are
    /// unchanged. The applied shift accumulates in `origin_translation`.
    pub fn center_around_origin(&mut self) {
        let mut bb = BoundingBox3::new();
        for volume in &self.volumes {
            if !volume.modifier {
                bb.merge(&volume.mesh.bounding_box());
            }
        }
        if !bb.defined {
            return;
        }

        let size = bb.size();
        let shift_x = -bb.min.x - size.x / 2.0;
        let shift_y = -bb.min.y - size.y / 2.0;
        let shift_z = -bb.min.z;

        self.translate(shift_x, shift_y, shift_z);
        self.origin_translation.x += shift_x;
        self.origin_translation.y += shift_y;
        self.origin_translation.z += shift_z;

        if !self.instances.is_empty() {
            for instance in &mut self.instances {
                let v = Point2::new(-shift_x, -shift_y)
                    .rotated(instance.rotation);
                instance
                    .offset
                    .translate(v.x * instance.scaling_factor, v.y * instance.scaling_factor);
            }
            self.bounding_box_cache = None;
        }
    }

    /// Shift all volume meshes
    ///
    /// The cached bounding box is shifted along instead of being recomputed.
    pub fn translate(&mut self, dx: f64, dy: f64, dz: f64) {
        for volume in &mut self.volumes {
            volume.mesh.translate(dx, dy, dz);
        }
        if let Some(bb) = &mut self.bounding_box_cache {
            bb.translate(dx, dy, dz);
        }
    }

    /// Scale all volume meshes uniformly about the origin
    pub fn scale(&mut self, factor: f64) {
        self.scale_xyz(factor, factor, factor);
    }

    /// Scale all volume meshes per axis about the origin
    pub fn scale_xyz(&mut self, sx: f64, sy: f64, sz: f64) {
        for volume in &mut self.volumes {
            volume.mesh.scale_xyz(sx, sy, sz);
        }
        self.origin_translation.x *= sx;
        self.origin_translation.y *= sy;
        self.origin_translation.z *= sz;
        self.bounding_box_cache = None;
    }

    /// Rotate all volume meshes about a coordinate axis
    ///
    /// Resets `origin_translation`, which only tracks plain translations.
    pub fn rotate(&mut self, angle: f64, axis: Axis) {
        for volume in &mut self.volumes {
            volume.mesh.rotate(angle, axis);
        }
        self.origin_translation = Vertex::new(0.0, 0.0, 0.0);
        self.bounding_box_cache = None;
    }

    /// Mirror all volume meshes across the plane perpendicular to `axis`
    pub fn mirror(&mut self, axis: Axis) {
        for volume in &mut self.volumes {
            volume.mesh.mirror(axis);
        }
        self.origin_translation = Vertex::new(0.0, 0.0, 0.0);
        self.bounding_box_cache = None;
    }

    /// Apply a 3x4 row-major affine matrix to all volume meshes
    pub fn transform(&mut self, m: &[f64; 12]) {
        for volume in &mut self.volumes {
            volume.mesh.transform(m);
        }
        self.origin_translation = Vertex::new(0.0, 0.0, 0.0);
        self.bounding_box_cache = None;
    }

    /// Total facet count across solid volumes
    pub fn facets_count(&self) -> usize {
        self.volumes
            .iter()
            .filter(|v| !v.modifier)
            .map(|v| v.mesh.facets_count())
            .sum()
    }

    /// Whether any solid volume has open edges
    pub fn needed_repair(&self) -> bool {
        self.volumes
            .iter()
            .any(|v| !v.modifier && v.mesh.open_edge_count() > 0)
    }

    /// Cut the object with the horizontal plane at the given Z height
    ///
    /// Returns the upper and lower halves as new objects carrying the same
    /// metadata, instances and configuration, with `input_file` cleared the
    /// same way `split` clears it. Solid volumes are cut and
    /// their cross-sections closed; modifier volumes are copied to both
    /// halves uncut. A half with no remaining solid geometry comes back as
    /// `None`.
    pub fn cut(&self, z: f64) -> Result<(Option<ModelObject>, Option<ModelObject>)> {
        let mut upper = self.clone_without_volumes();
        let mut lower = self.clone_without_volumes();
        upper.input_file.clear();
        lower.input_file.clear();

        for volume in &self.volumes {
            if volume.modifier {
                upper.volumes.push(volume.clone());
                lower.volumes.push(volume.clone());
                continue;
            }
            let (upper_mesh, lower_mesh) = volume.mesh.cut(z);
            for (half, mut mesh) in [(&mut upper, upper_mesh), (&mut lower, lower_mesh)] {
                if mesh.is_empty() {
                    continue;
                }
                mesh.repair()?;
                let new_volume = half.add_volume(mesh);
                new_volume.name = volume.name.clone();
                new_volume.material_id = volume.material_id;
                new_volume.config = volume.config.clone();
            }
        }

        let keep = |half: ModelObject| -> Option<ModelObject> {
            half.volumes.iter().any(|v| !v.modifier).then_some(half)
        };
        Ok((keep(upper), keep(lower)))
    }

    /// Split a single-volume object into its connected components
    ///
    /// Each component becomes a new object carrying the original metadata
    /// and instances, with `input_file` cleared. Objects with more than one
    /// volume are returned unchanged as a single-element list, since split
    /// parts could not be regrouped with their modifiers afterwards.
    pub fn split(&self) -> Result<Vec<ModelObject>> {
        if self.volumes.len() != 1 {
            return Ok(vec![self.clone()]);
        }

        let volume = &self.volumes[0];
        let mut objects = Vec::new();
        for mut part in volume.mesh.split() {
            part.repair()?;
            let mut object = self.clone_without_volumes();
            object.input_file.clear();
            let new_volume = object.add_volume(part);
            new_volume.name = volume.name.clone();
            new_volume.modifier = volume.modifier;
            new_volume.material_id = volume.material_id;
            new_volume.config = volume.config.clone();
            objects.push(object);
        }
        Ok(objects)
    }
}

/// The root of the entity graph
#[derive(Debug, Clone, Default)]
pub struct Model {
    /// The model's objects
    pub objects: Vec<ModelObject>,
    /// Materials by id, shared across objects
    pub materials: BTreeMap<MaterialId, ModelMaterial>,
    pub(crate) extruder_ids: ExtruderIdAllocator,
}

impl Model {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty object
    pub fn add_object(&mut self) -> &mut ModelObject {
        self.objects.push(ModelObject::new());
        self.objects.last_mut().unwrap()
    }

    /// Remove the object at `index`
    pub fn delete_object(&mut self, index: usize) -> Result<()> {
        if index >= self.objects.len() {
            return Err(Error::out_of_bounds("object", index, self.objects.len()));
        }
        self.objects.remove(index);
        Ok(())
    }

    /// Remove all objects
    pub fn clear_objects(&mut self) {
        self.objects.clear();
    }

    /// Material for `id`, created empty on first access
    ///
    /// Errors with [`Error::Precondition`] for the reserved
    /// [`MATERIAL_NONE`] id.
    pub fn add_material(&mut self, id: MaterialId) -> Result<&mut ModelMaterial> {
        if id == MATERIAL_NONE {
            return Err(Error::Precondition(
                "material id 0 is reserved for unassigned volumes".to_string(),
            ));
        }
        Ok(self.materials.entry(id).or_default())
    }

    /// Assign a material to a volume, creating the material entry on
    /// first use
    ///
    /// Assigning [`MATERIAL_NONE`] detaches the volume without touching
    /// the materials map.
    pub fn set_volume_material(
        &mut self,
        object_index: usize,
        volume_index: usize,
        id: MaterialId,
    ) -> Result<()> {
        let Some(object) = self.objects.get_mut(object_index) else {
            return Err(Error::out_of_bounds("object", object_index, self.objects.len()));
        };
        let Some(volume) = object.volumes.get_mut(volume_index) else {
            return Err(Error::out_of_bounds(
                "volume",
                volume_index,
                object.volumes.len(),
            ));
        };
        volume.material_id = id;
        if id != MATERIAL_NONE {
            self.materials.entry(id).or_default();
        }
        Ok(())
    }

    /// Material for `id`, when present
    pub fn get_material(&self, id: MaterialId) -> Option<&ModelMaterial> {
        self.materials.get(&id)
    }

    /// Remove the material for `id`, returning whether it existed
    ///
    /// Volumes referencing the removed id keep it; lookups simply start
    /// returning `None`.
    pub fn delete_material(&mut self, id: MaterialId) -> bool {
        self.materials.remove(&id).is_some()
    }

    /// Bounding box over all objects' placed instances
    pub fn bounding_box(&mut self) -> BoundingBox3 {
        let mut bb = BoundingBox3::new();
        for object in &mut self.objects {
            bb.merge(&object.bounding_box());
        }
        bb
    }

    /// Merged mesh of every placed instance of every object
    pub fn mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for object in &self.objects {
            mesh.merge(&object.mesh());
        }
        mesh
    }

    /// Shift all objects
    pub fn translate(&mut self, dx: f64, dy: f64, dz: f64) {
        for object in &mut self.objects {
            object.translate(dx, dy, dz);
        }
    }

    /// Whether any object has no placement yet
    pub fn has_objects_with_no_instances(&self) -> bool {
        self.objects.iter().any(|o| o.instances.is_empty())
    }

    /// Give every instance-less object a single default placement
    ///
    /// Returns whether any instance was added.
    pub fn add_default_instances(&mut self) -> bool {
        let mut added = false;
        for object in &mut self.objects {
            if object.instances.is_empty() {
                object.add_instance();
                added = true;
            }
        }
        added
    }

    /// Shift all instance offsets so the model is centered on `point`
    pub fn center_instances_around_point(&mut self, point: Point2) {
        let bb = self.bounding_box();
        if !bb.defined {
            return;
        }
        let size = bb.size();
        let shift_x = -bb.min.x + point.x - size.x / 2.0;
        let shift_y = -bb.min.y + point.y - size.y / 2.0;
        for object in &mut self.objects {
            for instance in &mut object.instances {
                instance.offset.translate(shift_x, shift_y);
            }
            object.invalidate_bounding_box();
        }
    }

    /// Shift all instance offsets so the model's minimum corner sits at the
    /// XY origin
    pub fn align_instances_to_origin(&mut self) {
        let bb = self.bounding_box();
        if !bb.defined {
            return;
        }
        let size = bb.size();
        self.center_instances_around_point(Point2::new(size.x / 2.0, size.y / 2.0));
    }

    /// Lift objects that dip below the platform back up to z = 0
    pub fn adjust_min_z(&mut self) {
        if self.objects.is_empty() {
            return;
        }
        if self.bounding_box().min.z < 0.0 {
            for object in &mut self.objects {
                let min_z = object.bounding_box().min.z;
                if min_z < 0.0 {
                    object.translate(0.0, 0.0, -min_z);
                }
            }
        }
    }

    /// Heuristic for "these objects are really parts of one print"
    ///
    /// Multiple single-volume, unconfigured objects whose meshes do not
    /// share a common bottom height were most likely exported as the parts
    /// of a single multipart object.
    pub fn looks_like_multipart_object(&self) -> bool {
        if self.objects.len() <= 1 {
            return false;
        }
        let mut zmin: Option<f64> = None;
        for object in &self.objects {
            if object.volumes.len() > 1 || object.config.len() > 1 {
                return false;
            }
            for volume in &object.volumes {
                let bb = volume.mesh.bounding_box();
                if !bb.defined {
                    continue;
                }
                match zmin {
                    None => zmin = Some(bb.min.z),
                    Some(z) if (z - bb.min.z).abs() > EPSILON => return true,
                    Some(_) => {}
                }
            }
        }
        false
    }

    /// Collapse all objects into a single multi-volume object
    ///
    /// Each former object becomes one volume named after it, assigned an
    /// extruder id from the round-robin allocator, restarting at 1 for
    /// every conversion. The first object's instances and input file are
    /// kept for the combined object.
    pub fn convert_multipart_object(&mut self, max_extruders: u32) {
        if self.objects.is_empty() {
            return;
        }
        self.extruder_ids.reset();

        let mut object = ModelObject::new();
        object.input_file = self.objects[0].input_file.clone();
        object.instances = self.objects[0].instances.clone();

        for source in &self.objects {
            for volume in &source.volumes {
                let extruder = self.extruder_ids.allocate(max_extruders);
                let new_volume = object.add_volume(volume.mesh.clone());
                new_volume.name = source.name.clone();
                new_volume.modifier = volume.modifier;
                new_volume.material_id = volume.material_id;
                new_volume.config = volume.config.clone();
                new_volume
                    .config
                    .insert("extruder".to_string(), extruder.to_string());
            }
        }

        self.objects.clear();
        self.objects.push(object);
    }

    /// Split one volume into its connected components, in place
    ///
    /// The volume is replaced by one sibling volume per component, named
    /// `<name>_<k>` and assigned an extruder id from the round-robin
    /// allocator, restarting at 1 for every split. Component meshes are
    /// repaired. A single-component volume is left alone.
    pub fn split_volume(
        &mut self,
        object_index: usize,
        volume_index: usize,
        max_extruders: u32,
    ) -> Result<()> {
        let Some(object) = self.objects.get_mut(object_index) else {
            return Err(Error::out_of_bounds("object", object_index, self.objects.len()));
        };
        let Some(volume) = object.volumes.get(volume_index) else {
            return Err(Error::out_of_bounds(
                "volume",
                volume_index,
                object.volumes.len(),
            ));
        };

        let parts = volume.mesh.split();
        if parts.len() <= 1 {
            return Ok(());
        }

        let template = volume.clone();
        self.extruder_ids.reset();
        let mut replacements = Vec::with_capacity(parts.len());
        for (k, mut part) in parts.into_iter().enumerate() {
            part.repair()?;
            let mut new_volume = template.clone();
            new_volume.mesh = part;
            new_volume.name = format!("{}_{}", template.name, k + 1);
            new_volume.config.insert(
                "extruder".to_string(),
                self.extruder_ids.allocate(max_extruders).to_string(),
            );
            replacements.push(new_volume);
        }

        let object = &mut self.objects[object_index];
        object.volumes.remove(volume_index);
        for (k, new_volume) in replacements.into_iter().enumerate() {
            object.volumes.insert(volume_index + k, new_volume);
        }
        object.invalidate_bounding_box();
        Ok(())
    }

    /// Classify every instance against the printable volume
    ///
    /// Each instance's state is stored on the instance itself; the snug
    /// per-facet bounding box of all solid volumes decides the
    /// classification. Returns whether every instance fits entirely inside.
    pub fn check_instances_print_volume_state(&mut self, print_volume: &BoundingBox3) -> bool {
        let mut all_inside = true;
        for object in &mut self.objects {
            let volumes = &object.volumes;
            for instance in &mut object.instances {
                let mut bb = BoundingBox3::new();
                for volume in volumes {
                    if !volume.modifier {
                        bb.merge(&instance.transform_mesh_bounding_box(&volume.mesh, false));
                    }
                }
                instance.print_volume_state = if print_volume.contains(&bb) {
                    PrintVolumeState::Inside
                } else if print_volume.intersects(&bb) {
                    PrintVolumeState::PartlyOutside
                } else {
                    PrintVolumeState::FullyOutside
                };
                if instance.print_volume_state != PrintVolumeState::Inside {
                    all_inside = false;
                }
            }
        }
        all_inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::cube;

    fn one_cube_model(edge: f64) -> Model {
        let mut model = Model::new();
        let object = model.add_object();
        object.add_volume(cube(edge));
        object.add_instance();
        model
    }

    #[test]
    fn test_instance_transform_mesh_pipeline_order() {
        // Rotation must happen before translation: a quarter turn of a unit
        // cube followed by an offset lands at a different spot than the
        // reverse order would.
        let mut mesh = cube(1.0);
        let instance = ModelInstance {
            rotation: std::f64::consts::FRAC_PI_2,
            scaling_factor: 2.0,
            offset: Point2::new(10.0, 0.0),
            print_volume_state: PrintVolumeState::Inside,
        };
        instance.transform_mesh(&mut mesh, false);
        let bb = mesh.bounding_box();
        assert!((bb.min.x - 8.0).abs() < 1e-9);
        assert!((bb.max.x - 10.0).abs() < 1e-9);
        assert!((bb.min.y - 0.0).abs() < 1e-9);
        assert!((bb.max.y - 2.0).abs() < 1e-9);
        assert!((bb.max.z - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_transform_mesh_bounding_box_matches_mesh_transform() {
        let instance = ModelInstance {
            rotation: 0.7,
            scaling_factor: 1.5,
            offset: Point2::new(3.0, -2.0),
            print_volume_state: PrintVolumeState::Inside,
        };
        let mesh = cube(10.0);
        let fast = instance.transform_mesh_bounding_box(&mesh, false);

        let mut transformed = mesh.clone();
        instance.transform_mesh(&mut transformed, false);
        let exact = transformed.bounding_box();

        assert!((fast.min.x - exact.min.x).abs() < 1e-9);
        assert!((fast.max.y - exact.max.y).abs() < 1e-9);
        assert!((fast.max.z - exact.max.z).abs() < 1e-9);
    }

    #[test]
    fn test_transform_bounding_box_overapproximates() {
        let instance = ModelInstance {
            rotation: std::f64::consts::FRAC_PI_4,
            scaling_factor: 1.0,
            offset: Point2::default(),
            print_volume_state: PrintVolumeState::Inside,
        };
        let mesh = cube(10.0);
        let snug = instance.transform_mesh_bounding_box(&mesh, true);
        let coarse = instance.transform_bounding_box(&mesh.bounding_box(), true);
        assert!(coarse.contains(&snug) || coarse == snug);
    }

    #[test]
    fn test_bounding_box_transforms_one_coarse_box() {
        use crate::mesh::Triangle;

        // A tetrahedron does not reach its own box corners, so the coarse
        // per-instance transform over-approximates the placed geometry.
        let mut mesh = TriangleMesh::new();
        mesh.vertices = vec![
            Vertex::new(0.0, 0.0, 0.0),
            Vertex::new(10.0, 0.0, 0.0),
            Vertex::new(0.0, 10.0, 0.0),
            Vertex::new(0.0, 0.0, 10.0),
        ];
        mesh.triangles = vec![
            Triangle::new(0, 2, 1),
            Triangle::new(0, 1, 3),
            Triangle::new(0, 3, 2),
            Triangle::new(1, 2, 3),
        ];

        let mut model = Model::new();
        let object = model.add_object();
        object.add_volume(mesh);
        object.add_instance().rotation = std::f64::consts::FRAC_PI_4;

        let raw = model.objects[0].volumes[0].mesh.bounding_box();
        let coarse = model.objects[0].instances[0].transform_bounding_box(&raw, false);
        let cached = model.objects[0].bounding_box();
        assert_eq!(cached, coarse);

        let snug = model.objects[0].instance_bounding_box(0).unwrap();
        assert!(cached.min.y <= snug.min.y + 1e-9);
        assert!(cached.max.y >= snug.max.y - 1e-9);
        assert!(cached.size().y > snug.size().y + 1.0);
    }

    #[test]
    fn test_bounding_box_cache_invalidation() {
        let mut model = one_cube_model(10.0);
        let before = model.objects[0].bounding_box();
        assert_eq!(before.size().x, 10.0);

        // Mutating through public fields requires an explicit invalidate.
        model.objects[0].volumes[0].mesh.scale(2.0);
        assert_eq!(model.objects[0].bounding_box(), before);
        model.objects[0].invalidate_bounding_box();
        assert_eq!(model.objects[0].bounding_box().size().x, 20.0);
    }

    #[test]
    fn test_translate_shifts_cache() {
        let mut model = one_cube_model(10.0);
        model.objects[0].bounding_box();
        model.objects[0].translate(5.0, 0.0, 0.0);
        let bb = model.objects[0].bounding_box();
        assert_eq!(bb.min.x, 5.0);
        assert_eq!(bb.max.x, 15.0);
    }

    #[test]
    fn test_raw_bounding_box_requires_instance() {
        let mut model = Model::new();
        let object = model.add_object();
        object.add_volume(cube(10.0));
        assert!(matches!(
            model.objects[0].raw_bounding_box(),
            Err(Error::Precondition(_))
        ));

        model.objects[0].add_instance();
        let bb = model.objects[0].raw_bounding_box().unwrap();
        assert_eq!(bb.size().x, 10.0);
    }

    #[test]
    fn test_raw_bounding_box_ignores_offset() {
        let mut model = one_cube_model(10.0);
        model.objects[0].instances[0].offset = Point2::new(100.0, 100.0);
        let bb = model.objects[0].raw_bounding_box().unwrap();
        assert_eq!(bb.min.x, 0.0);
    }

    #[test]
    fn test_modifier_excluded_from_raw_mesh() {
        let mut model = one_cube_model(10.0);
        let modifier = model.objects[0].add_volume(cube(20.0));
        modifier.modifier = true;
        assert_eq!(model.objects[0].raw_mesh().facets_count(), 12);
        assert_eq!(model.objects[0].facets_count(), 12);
    }

    #[test]
    fn test_delete_bounds_checked() {
        let mut model = one_cube_model(10.0);
        assert!(matches!(
            model.objects[0].delete_volume(5),
            Err(Error::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            model.objects[0].delete_instance(1),
            Err(Error::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            model.delete_object(3),
            Err(Error::IndexOutOfBounds { .. })
        ));
        assert!(model.objects[0].delete_volume(0).is_ok());
        assert!(model.objects[0].delete_last_instance().is_ok());
        assert!(model.objects[0].delete_last_instance().is_err());
    }

    #[test]
    fn test_center_around_origin_preserves_placement() {
        let mut model = one_cube_model(10.0);
        model.objects[0].translate(7.0, 3.0, 1.0);
        model.objects[0].instances[0].rotation = 0.3;
        model.objects[0].instances[0].scaling_factor = 2.0;
        let placed_before = model.objects[0].bounding_box();

        model.objects[0].center_around_origin();

        let raw = model.objects[0].raw_mesh().bounding_box();
        assert!((raw.center().x).abs() < 1e-9);
        assert!((raw.center().y).abs() < 1e-9);
        assert!((raw.min.z).abs() < 1e-9);

        let placed_after = model.objects[0].bounding_box();
        assert!((placed_before.min.x - placed_after.min.x).abs() < 1e-9);
        assert!((placed_before.max.y - placed_after.max.y).abs() < 1e-9);
    }

    #[test]
    fn test_cut_copies_metadata_and_modifiers() {
        let mut model = one_cube_model(10.0);
        {
            let object = &mut model.objects[0];
            object.name = "part".to_string();
            object.input_file = "part.stl".to_string();
            object.config.insert("fill".to_string(), "20%".to_string());
            let modifier = object.add_volume(cube(30.0));
            modifier.modifier = true;
        }

        let (upper, lower) = model.objects[0].cut(5.0).unwrap();
        let upper = upper.unwrap();
        let lower = lower.unwrap();

        for half in [&upper, &lower] {
            assert_eq!(half.name, "part");
            assert!(half.input_file.is_empty());
            assert_eq!(half.config.get("fill").unwrap(), "20%");
            assert_eq!(half.instances.len(), 1);
            // modifier copied uncut, plus one cut solid
            assert_eq!(half.volumes.len(), 2);
            assert!(half.volumes.iter().any(|v| v.modifier));
        }
        assert!(!upper.needed_repair());
        assert!(!lower.needed_repair());
    }

    #[test]
    fn test_cut_above_object_yields_one_half() {
        let model = one_cube_model(10.0);
        let (upper, lower) = model.objects[0].cut(50.0).unwrap();
        assert!(upper.is_none());
        assert!(lower.is_some());
    }

    #[test]
    fn test_split_two_components() {
        let mut model = Model::new();
        let object = model.add_object();
        let mut mesh = cube(10.0);
        let mut second = cube(10.0);
        second.translate(100.0, 0.0, 0.0);
        mesh.merge(&second);
        let volume = object.add_volume(mesh);
        volume.name = "pair".to_string();
        volume.material_id = 3;
        object.add_instance();

        let parts = model.objects[0].split().unwrap();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert!(part.input_file.is_empty());
            assert_eq!(part.volumes.len(), 1);
            assert_eq!(part.volumes[0].name, "pair");
            assert_eq!(part.volumes[0].material_id, 3);
            assert_eq!(part.instances.len(), 1);
        }
    }

    #[test]
    fn test_split_multi_volume_returned_unchanged() {
        let mut model = one_cube_model(10.0);
        model.objects[0].add_volume(cube(5.0));
        let parts = model.objects[0].split().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].volumes.len(), 2);
    }

    #[test]
    fn test_material_map() {
        let mut model = Model::new();
        assert!(matches!(
            model.add_material(MATERIAL_NONE),
            Err(Error::Precondition(_))
        ));

        model
            .add_material(1)
            .unwrap()
            .attributes
            .insert("name".to_string(), "PLA".to_string());
        assert_eq!(model.get_material(1).unwrap().name(), Some("PLA"));
        assert!(model.get_material(2).is_none());
        assert!(model.delete_material(1));
        assert!(!model.delete_material(1));
    }

    #[test]
    fn test_set_volume_material_creates_entry() {
        let mut model = Model::new();
        let object = model.add_object();
        object.add_volume(cube(5.0));

        model.set_volume_material(0, 0, 7).unwrap();
        assert_eq!(model.objects[0].volumes[0].material_id, 7);
        assert!(model.get_material(7).is_some());

        model.set_volume_material(0, 0, MATERIAL_NONE).unwrap();
        assert_eq!(model.objects[0].volumes[0].material_id, MATERIAL_NONE);
        assert!(model.get_material(MATERIAL_NONE).is_none());

        assert!(matches!(
            model.set_volume_material(1, 0, 7),
            Err(Error::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_extruder_id_allocator_wraps() {
        let mut ids = ExtruderIdAllocator::new();
        assert_eq!(ids.allocate(3), 1);
        assert_eq!(ids.allocate(3), 2);
        assert_eq!(ids.allocate(3), 3);
        assert_eq!(ids.allocate(3), 1);
        ids.allocate(3);
        ids.reset();
        assert_eq!(ids.allocate(3), 1);
    }

    #[test]
    fn test_convert_multipart_object() {
        let mut model = Model::new();
        for name in ["left", "right"] {
            let object = model.add_object();
            object.name = name.to_string();
            object.add_volume(cube(10.0));
        }
        model.objects[0].input_file = "plate.stl".to_string();
        model.objects[0].add_instance();

        model.convert_multipart_object(4);

        assert_eq!(model.objects.len(), 1);
        let object = &model.objects[0];
        assert_eq!(object.input_file, "plate.stl");
        assert_eq!(object.instances.len(), 1);
        assert_eq!(object.volumes.len(), 2);
        assert_eq!(object.volumes[0].name, "left");
        assert_eq!(object.volumes[1].name, "right");
        assert_eq!(object.volumes[0].config.get("extruder").unwrap(), "1");
        assert_eq!(object.volumes[1].config.get("extruder").unwrap(), "2");
    }

    #[test]
    fn test_convert_multipart_restarts_extruder_ids() {
        let mut model = Model::new();
        for _ in 0..2 {
            model.add_object().add_volume(cube(10.0));
        }
        model.convert_multipart_object(4);

        // Re-converting allocates fresh ids, not a continuation of the
        // previous conversion's sequence.
        model.add_object().add_volume(cube(10.0));
        model.convert_multipart_object(4);

        let ids: Vec<&str> = model.objects[0]
            .volumes
            .iter()
            .map(|v| v.config.get("extruder").unwrap().as_str())
            .collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn test_split_volume_in_place() {
        let mut model = Model::new();
        let object = model.add_object();
        let mut mesh = cube(10.0);
        let mut second = cube(10.0);
        second.translate(50.0, 0.0, 0.0);
        mesh.merge(&second);
        let volume = object.add_volume(mesh);
        volume.name = "bridge".to_string();
        volume.material_id = 2;

        model.split_volume(0, 0, 4).unwrap();

        let volumes = &model.objects[0].volumes;
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].name, "bridge_1");
        assert_eq!(volumes[1].name, "bridge_2");
        assert_eq!(volumes[0].material_id, 2);
        assert_eq!(volumes[0].config.get("extruder").unwrap(), "1");
        assert_eq!(volumes[1].config.get("extruder").unwrap(), "2");

        // Single-component volumes are left alone.
        model.split_volume(0, 0, 4).unwrap();
        assert_eq!(model.objects[0].volumes.len(), 2);
        assert_eq!(model.objects[0].volumes[0].name, "bridge_1");

        assert!(matches!(
            model.split_volume(5, 0, 4),
            Err(Error::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            model.split_volume(0, 9, 4),
            Err(Error::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_looks_like_multipart_object() {
        let mut model = Model::new();
        for dz in [0.0, 5.0] {
            let object = model.add_object();
            let mut mesh = cube(10.0);
            mesh.translate(0.0, 0.0, dz);
            object.add_volume(mesh);
            object.add_instance();
        }
        assert!(model.looks_like_multipart_object());

        // Same bottom height: probably genuinely separate objects.
        let mut flat = Model::new();
        for _ in 0..2 {
            let object = flat.add_object();
            object.add_volume(cube(10.0));
            object.add_instance();
        }
        assert!(!flat.looks_like_multipart_object());

        // A single object is never multipart.
        let single = one_cube_model(10.0);
        assert!(!single.looks_like_multipart_object());
    }

    #[test]
    fn test_print_volume_state() {
        let mut print_volume = BoundingBox3::new();
        print_volume.merge_point(Vertex::new(0.0, 0.0, 0.0));
        print_volume.merge_point(Vertex::new(100.0, 100.0, 100.0));

        let mut model = one_cube_model(10.0);
        {
            let object = &mut model.objects[0];
            object.add_instance().offset = Point2::new(95.0, 0.0);
            object.add_instance().offset = Point2::new(500.0, 0.0);
        }

        let all_inside = model.check_instances_print_volume_state(&print_volume);
        assert!(!all_inside);
        let states: Vec<PrintVolumeState> = model.objects[0]
            .instances
            .iter()
            .map(|i| i.print_volume_state)
            .collect();
        assert_eq!(
            states,
            vec![
                PrintVolumeState::Inside,
                PrintVolumeState::PartlyOutside,
                PrintVolumeState::FullyOutside,
            ]
        );
    }

    #[test]
    fn test_add_default_instances() {
        let mut model = Model::new();
        model.add_object().add_volume(cube(1.0));
        assert!(model.has_objects_with_no_instances());
        assert!(model.add_default_instances());
        assert!(!model.has_objects_with_no_instances());
        assert!(!model.add_default_instances());
    }

    #[test]
    fn test_center_instances_around_point() {
        let mut model = one_cube_model(10.0);
        model.center_instances_around_point(Point2::new(50.0, 50.0));
        let bb = model.bounding_box();
        assert!((bb.center().x - 50.0).abs() < 1e-9);
        assert!((bb.center().y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_align_instances_to_origin() {
        let mut model = one_cube_model(10.0);
        model.objects[0].instances[0].offset = Point2::new(-30.0, 17.0);
        model.align_instances_to_origin();
        let bb = model.bounding_box();
        assert!(bb.min.x.abs() < 1e-9);
        assert!(bb.min.y.abs() < 1e-9);
    }

    #[test]
    fn test_adjust_min_z() {
        let mut model = one_cube_model(10.0);
        model.objects[0].translate(0.0, 0.0, -4.0);
        model.adjust_min_z();
        assert!(model.bounding_box().min.z.abs() < 1e-9);
    }
}
