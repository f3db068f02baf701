//! Shared helpers for integration tests

use plater::{Model, Triangle, TriangleMesh, Vertex};

/// An axis-aligned cube mesh with the given edge length, minimum corner at
/// the origin
pub fn cube(edge: f64) -> TriangleMesh {
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
        Triangle::new(0, 2, 1),
        Triangle::new(0, 3, 2),
        Triangle::new(4, 5, 6),
        Triangle::new(4, 6, 7),
        Triangle::new(0, 1, 5),
        Triangle::new(0, 5, 4),
        Triangle::new(1, 2, 6),
        Triangle::new(1, 6, 5),
        Triangle::new(2, 3, 7),
        Triangle::new(2, 7, 6),
        Triangle::new(3, 0, 4),
        Triangle::new(3, 4, 7),
    ];
    TriangleMesh {
        vertices,
        triangles,
    }
}

/// A model holding `count` cube objects of the given edge length, each with
/// one default instance
pub fn cube_model(count: usize, edge: f64) -> Model {
    let mut model = Model::new();
    for i in 0..count {
        let object = model.add_object();
        object.name = format!("cube-{i}");
        object.add_volume(cube(edge));
        object.add_instance();
    }
    model
}
