//! PLY (Stanford polygon) format support.
//!
//! Faces are kept as n-gons. A face property named `sharp` (any integer
//! type, non-zero meaning sharp) sets the face's flat shading flag. A file
//! without faces loads as a point cloud.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use crate::error::{MeshError, Result};
use crate::mesh::PolyMesh;

/// Load a mesh from a PLY file.
///
/// # Example
///
/// ```no_run
/// use meshpair::io::ply;
///
/// let mesh = ply::load("model.ply").unwrap();
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<PolyMesh> {
    let path = path.as_ref();
    let file = File::open(path)?;
    read(&mut BufReader::new(file), path)
}

/// Read a PLY mesh from `reader`; `path` is only used in error messages.
pub fn read<R: BufRead>(reader: &mut R, path: &Path) -> Result<PolyMesh> {
    let load_error = |message: String| MeshError::LoadError {
        path: path.to_path_buf(),
        message,
    };

    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(reader)
        .map_err(|e| load_error(e.to_string()))?;

    let vertex_element = ply
        .payload
        .get("vertex")
        .ok_or_else(|| load_error("PLY file has no vertex element".to_string()))?;

    let mut positions: Vec<Point3<f64>> = Vec::with_capacity(vertex_element.len());
    for (i, vertex) in vertex_element.iter().enumerate() {
        let mut co = [0.0; 3];
        for (slot, name) in co.iter_mut().zip(["x", "y", "z"]) {
            *slot = get_float_property(vertex, name)
                .ok_or_else(|| load_error(format!("vertex {i} missing {name} coordinate")))?;
        }
        positions.push(Point3::from(co));
    }

    let face_element = match ply.payload.get("face") {
        Some(faces) if !faces.is_empty() => faces,
        _ => return Ok(PolyMesh::from_points(positions)),
    };

    let mut faces: Vec<Vec<usize>> = Vec::with_capacity(face_element.len());
    let mut sharp = Vec::with_capacity(face_element.len());
    for (i, face) in face_element.iter().enumerate() {
        let indices = get_list_property(face, "vertex_indices")
            .or_else(|| get_list_property(face, "vertex_index"))
            .ok_or_else(|| load_error(format!("face {i} missing vertex_indices property")))?;
        faces.push(indices);
        sharp.push(get_float_property(face, "sharp").is_some_and(|s| s != 0.0));
    }

    let mesh = PolyMesh::from_polygons(positions, &faces)?;
    if sharp.iter().any(|&s| s) {
        mesh.with_sharp_faces(sharp)
    } else {
        Ok(mesh)
    }
}

fn get_float_property(element: &DefaultElement, name: &str) -> Option<f64> {
    match element.get(name)? {
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        _ => None,
    }
}

/// Vertex index list; negative indices map past any valid vertex and are
/// rejected by the mesh builder.
fn get_list_property(element: &DefaultElement, name: &str) -> Option<Vec<usize>> {
    fn index<T: TryInto<usize>>(x: T) -> usize {
        x.try_into().unwrap_or(usize::MAX)
    }
    match element.get(name)? {
        Property::ListInt(v) => Some(v.iter().map(|&x| index(x)).collect()),
        Property::ListUInt(v) => Some(v.iter().map(|&x| index(x)).collect()),
        Property::ListShort(v) => Some(v.iter().map(|&x| index(x)).collect()),
        Property::ListUShort(v) => Some(v.iter().map(|&x| index(x)).collect()),
        Property::ListChar(v) => Some(v.iter().map(|&x| index(x)).collect()),
        Property::ListUChar(v) => Some(v.iter().map(|&x| index(x)).collect()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<PolyMesh> {
        read(&mut text.as_bytes(), Path::new("test.ply"))
    }

    const SQUARE_AND_TRIANGLE: &str = "ply
format ascii 1.0
element vertex 5
property float x
property float y
property float z
element face 2
property list uchar int vertex_indices
property uchar sharp
end_header
0 0 0
1 0 0
1 1 0
0 1 0
-1 0.5 0
4 0 1 2 3 0
3 0 3 4 1
";

    #[test]
    fn test_polygons_are_kept() {
        let mesh = parse(SQUARE_AND_TRIANGLE).unwrap();
        assert_eq!(mesh.num_vertices(), 5);
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.face_verts(0), &[0, 1, 2, 3]);
        assert_eq!(mesh.num_edges(), 6);
        assert_eq!(mesh.sharp_faces(), &[false, true]);
        assert_eq!(*mesh.position(4), Point3::new(-1.0, 0.5, 0.0));
    }

    #[test]
    fn test_point_cloud() {
        let text = "ply
format ascii 1.0
element vertex 2
property double x
property double y
property double z
end_header
0 0 0
2 3 4
";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.num_vertices(), 2);
        assert_eq!(mesh.num_faces(), 0);
    }

    #[test]
    fn test_bad_index_is_rejected() {
        let text = "ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
0 1 0
3 0 1 7
";
        assert!(matches!(
            parse(text).unwrap_err(),
            MeshError::InvalidVertexIndex { face: 0, vertex: 7 }
        ));
    }

    #[test]
    fn test_missing_vertex_element() {
        let text = "ply
format ascii 1.0
element point 0
property float x
end_header
";
        assert!(matches!(parse(text).unwrap_err(), MeshError::LoadError { .. }));
    }
}
