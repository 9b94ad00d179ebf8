//! STL (stereolithography) format support.
//!
//! STL stores three positions per triangle; vertices are welded back
//! together when their coordinates are bit-for-bit equal. Triangles that
//! collapse after welding are dropped.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::PolyMesh;

/// Load a mesh from an STL file.
///
/// Automatically detects binary vs ASCII format.
///
/// # Example
///
/// ```no_run
/// use meshpair::io::stl;
///
/// let mesh = stl::load("model.stl").unwrap();
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<PolyMesh> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    read(&mut file, path)
}

/// Read an STL mesh from `reader`; `path` is only used in error messages.
pub fn read<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<PolyMesh> {
    let stl = stl_io::read_stl(reader).map_err(|e| MeshError::LoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut welded: HashMap<[u32; 3], usize> = HashMap::new();
    let mut positions: Vec<Point3<f64>> = Vec::new();
    let mut weld = |v: &stl_io::Vertex| {
        let key = [v[0].to_bits(), v[1].to_bits(), v[2].to_bits()];
        *welded.entry(key).or_insert_with(|| {
            positions.push(Point3::new(v[0] as f64, v[1] as f64, v[2] as f64));
            positions.len() - 1
        })
    };

    let mut faces: Vec<[usize; 3]> = Vec::with_capacity(stl.faces.len());
    let mut dropped = 0;
    for tri in &stl.faces {
        let [i0, i1, i2] = tri.vertices.map(|i| weld(&stl.vertices[i]));
        if i0 != i1 && i1 != i2 && i0 != i2 {
            faces.push([i0, i1, i2]);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        log::debug!("{}: dropped {dropped} degenerate triangles", path.display());
    }

    if faces.is_empty() {
        return Err(MeshError::LoadError {
            path: path.to_path_buf(),
            message: "STL file contains no valid triangles".to_string(),
        });
    }

    PolyMesh::from_triangles(positions, &faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn triangle(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> stl_io::Triangle {
        stl_io::Triangle {
            normal: stl_io::Normal::new([0.0, 0.0, 1.0]),
            vertices: [
                stl_io::Vertex::new(a),
                stl_io::Vertex::new(b),
                stl_io::Vertex::new(c),
            ],
        }
    }

    fn binary(triangles: &[stl_io::Triangle]) -> Cursor<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        stl_io::write_stl(&mut bytes, triangles.iter()).unwrap();
        bytes.set_position(0);
        bytes
    }

    #[test]
    fn test_shared_corners_are_welded() {
        let mut data = binary(&[
            triangle([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]),
            triangle([0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]),
        ]);
        let mesh = read(&mut data, Path::new("quad.stl")).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.num_edges(), 5);
    }

    #[test]
    fn test_degenerate_triangles_are_dropped() {
        let mut data = binary(&[
            triangle([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            triangle([2.0, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 1.0, 0.0]),
        ]);
        let mesh = read(&mut data, Path::new("sliver.stl")).unwrap();
        assert_eq!(mesh.num_faces(), 1);

        let mut data = binary(&[triangle([0.0; 3], [0.0; 3], [0.0; 3])]);
        let err = read(&mut data, Path::new("empty.stl")).unwrap_err();
        assert!(matches!(err, MeshError::LoadError { .. }));
    }
}
