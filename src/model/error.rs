//! Error types for annotation model mutations.

use thiserror::Error;

use super::class_label::ClassId;
use super::geometry::Rect;
use super::image::BoxId;

/// Errors returned by [`Project`](super::Project) mutators.
///
/// A mutator that returns an error has not modified the project.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The rectangle is empty, inverted or non-finite after clamping.
    #[error("Invalid geometry: {rect:?} (clamped to {width}x{height} image)")]
    InvalidGeometry {
        /// The rectangle after clamping
        rect: Rect,
        /// Image width used for clamping
        width: u32,
        /// Image height used for clamping
        height: u32,
    },

    /// Another class already uses this name
    #[error("Duplicate class name: '{name}'")]
    DuplicateClassName {
        /// The conflicting name
        name: String,
    },

    /// Class names must contain a non-whitespace character
    #[error("Class name must not be empty")]
    EmptyClassName,

    /// No image with this path in the project
    #[error("Image not found: {image}")]
    UnknownImage {
        /// The requested image path
        image: String,
    },

    /// No box with this id in the image
    #[error("Box {id} not found in image {image}")]
    UnknownBox {
        /// The image that was searched
        image: String,
        /// The missing box id
        id: BoxId,
    },

    /// No class with this id
    #[error("Class not found: {id}")]
    UnknownClass {
        /// The missing class id
        id: ClassId,
    },

    /// Removal was blocked because boxes still reference the class
    #[error("Class {id} is still used by {count} boxes")]
    ClassInUse {
        /// The class that was to be removed
        id: ClassId,
        /// Number of boxes referencing it
        count: usize,
    },

    /// A restore position is past the end of the sequence
    #[error("Position {position} out of range (length {len})")]
    PositionOutOfRange {
        /// Requested position
        position: usize,
        /// Current sequence length
        len: usize,
    },

    /// A restored entity collides with an existing id
    #[error("Id {id} already exists")]
    DuplicateId {
        /// The colliding id
        id: u32,
    },
}
