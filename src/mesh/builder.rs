//! Mesh construction utilities.
//!
//! This module builds [`PolyMesh`] values from face-vertex lists as commonly
//! found in mesh file formats. Edges are derived from the faces: every
//! unordered vertex pair used by consecutive corners becomes one edge, in the
//! order it is first seen.

use std::collections::HashMap;

use nalgebra::Point3;

use super::poly::PolyMesh;
use crate::error::{MeshError, Result};

/// Build a polygon mesh from vertices and n-gon faces.
///
/// # Arguments
/// * `positions` - List of vertex positions
/// * `faces` - List of faces, each as a list of at least three vertex indices
///
/// # Returns
/// A polygon mesh, or an error if the input is invalid.
///
/// # Example
/// ```
/// use meshpair::mesh::build_from_polygons;
/// use nalgebra::Point3;
///
/// let positions = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(-1.0, 0.5, 0.0),
/// ];
/// let faces = vec![vec![0, 1, 2, 3], vec![0, 3, 4]];
///
/// let mesh = build_from_polygons(positions, &faces).unwrap();
/// assert_eq!(mesh.num_faces(), 2);
/// assert_eq!(mesh.num_edges(), 6);
/// ```
pub fn build_from_polygons<F>(positions: Vec<Point3<f64>>, faces: &[F]) -> Result<PolyMesh>
where
    F: AsRef<[usize]>,
{
    if faces.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    let num_corners: usize = faces.iter().map(|f| f.as_ref().len()).sum();
    let mut face_offsets = Vec::with_capacity(faces.len() + 1);
    let mut corner_verts = Vec::with_capacity(num_corners);
    let mut corner_edges = Vec::with_capacity(num_corners);
    let mut edges: Vec<[usize; 2]> = Vec::new();

    // Undirected vertex pair to edge index
    let mut edge_map: HashMap<(usize, usize), usize> = HashMap::new();

    face_offsets.push(0);
    for (fi, face) in faces.iter().enumerate() {
        let face = face.as_ref();
        validate_face(fi, face, positions.len())?;

        let n = face.len();
        for i in 0..n {
            let v0 = face[i];
            let v1 = face[(i + 1) % n];
            let key = (v0.min(v1), v0.max(v1));
            let edge = *edge_map.entry(key).or_insert_with(|| {
                edges.push([v0, v1]);
                edges.len() - 1
            });
            corner_verts.push(v0);
            corner_edges.push(edge);
        }
        face_offsets.push(corner_verts.len());
    }

    Ok(PolyMesh::from_parts(
        positions,
        edges,
        face_offsets,
        corner_verts,
        corner_edges,
    ))
}

/// Build a polygon mesh from vertices and triangle faces.
pub fn build_from_triangles(positions: Vec<Point3<f64>>, faces: &[[usize; 3]]) -> Result<PolyMesh> {
    build_from_polygons(positions, faces)
}

/// Build a polygon mesh from vertices and quad faces.
///
/// # Arguments
/// * `positions` - List of vertex positions
/// * `faces` - List of quad faces, each as [v0, v1, v2, v3] indices (counter-clockwise)
pub fn build_from_quads(positions: Vec<Point3<f64>>, faces: &[[usize; 4]]) -> Result<PolyMesh> {
    build_from_polygons(positions, faces)
}

/// Build a face-less mesh from loose edges.
///
/// Duplicate edges are kept as given; only out-of-range and zero-length
/// (same vertex twice) edges are rejected.
pub fn build_from_edges(positions: Vec<Point3<f64>>, edges: &[[usize; 2]]) -> Result<PolyMesh> {
    for (ei, &[v0, v1]) in edges.iter().enumerate() {
        for v in [v0, v1] {
            if v >= positions.len() {
                return Err(MeshError::InvalidEdge { edge: ei, vertex: v });
            }
        }
        if v0 == v1 {
            return Err(MeshError::InvalidEdge { edge: ei, vertex: v0 });
        }
    }
    Ok(PolyMesh::from_parts(
        positions,
        edges.to_vec(),
        vec![0],
        Vec::new(),
        Vec::new(),
    ))
}

fn validate_face(fi: usize, face: &[usize], num_vertices: usize) -> Result<()> {
    if face.len() < 3 {
        return Err(MeshError::DegenerateFace { face: fi });
    }
    for &vi in face {
        if vi >= num_vertices {
            return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
        }
    }
    let n = face.len();
    if (0..n).any(|i| face[i] == face[(i + 1) % n]) {
        return Err(MeshError::DegenerateFace { face: fi });
    }
    Ok(())
}
