//! Error types for meshpair.
//!
//! This module defines all error types used throughout the library.

use std::path::PathBuf;
use thiserror::Error;

use crate::remap::ElementKind;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur while building meshes or computing correspondences.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has fewer than three corners or repeats a vertex on consecutive corners.
    #[error("face {face} is degenerate (fewer than 3 corners or duplicate consecutive vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// A loose edge references an invalid vertex or the same vertex twice.
    #[error("edge {edge} is degenerate or references invalid vertex index {vertex}")]
    InvalidEdge {
        /// The edge index.
        edge: usize,
        /// The offending vertex index.
        vertex: usize,
    },

    /// A per-element attribute array does not match the element count.
    #[error("attribute {name} has {found} values, expected {expected}")]
    InvalidAttributeLength {
        /// Attribute name.
        name: &'static str,
        /// Number of elements the mesh has.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },

    /// Topology mode requires equal element counts on both meshes.
    #[error("topology mapping needs matching {element} counts: source has {expected}, destination has {found}")]
    TopologyMismatch {
        /// Element kind being mapped.
        element: ElementKind,
        /// Element count of the source mesh.
        expected: usize,
        /// Element count of the destination mesh.
        found: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading mesh from file.
    #[error("failed to load mesh from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = MeshError::TopologyMismatch {
            element: ElementKind::Face,
            expected: 6,
            found: 5,
        };
        assert_eq!(
            err.to_string(),
            "topology mapping needs matching face counts: source has 6, destination has 5"
        );

        let err = MeshError::invalid_param("islands_precision", 1.5, "must be within [0, 1]");
        assert_eq!(
            err.to_string(),
            "invalid parameter: islands_precision = 1.5 (must be within [0, 1])"
        );
    }
}
