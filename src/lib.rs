//! # plater
//!
//! Print-preparation model handling: an entity graph of objects, volumes
//! and placed instances, with the geometry operations needed to get them
//! onto a build platform.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - Model / object / volume / instance entity graph with materials
//! - Mesh transforms, plane cuts, hole repair and component splitting
//! - No-fit-polygon arrangement of instances on the printable area
//! - Grid and free duplication of loaded models
//! - Pluggable file-format loaders
//!
//! ## Example
//!
//! ```
//! use plater::{BoundingBox2, Model, Point2};
//!
//! # fn main() -> plater::Result<()> {
//! let mut model = Model::new();
//! let object = model.add_object();
//! # let mesh = plater::TriangleMesh::new();
//! object.add_volume(mesh);
//! object.add_instance();
//!
//! let bed = BoundingBox2::from_corners(Point2::new(0.0, 0.0), Point2::new(200.0, 200.0));
//! match model.arrange_objects(6.0, Some(&bed), None) {
//!     Ok(all_on_bed) => println!("arranged, everything on the bed: {all_on_bed}"),
//!     Err(e) => println!("cannot arrange: {e}"),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod arrange;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod mesh;
pub mod model;

pub use arrange::{arrange_polygons, arrange_rectangles, ArrangedItem};
pub use error::{Error, Result};
pub use geometry::{convex_hull, BoundingBox2, BoundingBox3, Point2, Polygon, Vertex, EPSILON};
pub use loader::{LoaderRegistry, ModelLoader};
pub use mesh::{Axis, Triangle, TriangleMesh};
pub use model::{
    ExtruderIdAllocator, LayerHeightRange, MaterialId, Model, ModelInstance, ModelMaterial,
    ModelObject, ModelVolume, PrintVolumeState, MATERIAL_NONE,
};
