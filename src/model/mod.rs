//! Annotation data model: geometry, classes, images and the project.

mod class_label;
mod error;
mod geometry;
mod image;
mod project;

pub use class_label::{ClassId, ClassLabel, default_color};
pub use error::ModelError;
pub use geometry::Rect;
pub use image::{BoundingBox, BoxId, ImageAnnotation};
pub use project::{BoxRef, BoxUpdate, Project, ProjectMetadata, RemovedBox, RemovedClass};
