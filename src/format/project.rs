//! Serialized form of a project (`project.json`).
//!
//! `ProjectDocument` mirrors [`Project`] with plain serde types. Conversion
//! back into a `Project` re-validates everything, so a hand-edited or
//! partially corrupt file still loads as far as it is consistent.
//!
//! # Versioning
//!
//! The document uses semantic versioning (MAJOR.MINOR.PATCH):
//!
//! - **Version 0.x.x**: Unstable development versions. Files from another
//!   0.x minor version are read on a best-effort basis with a warning.
//!
//! - **Version 1.x.x** (future): Breaking changes only in major version bumps.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::format::error::FormatError;
use crate::format::traits::FormatWarning;
use crate::model::{
    BoundingBox, BoxId, ClassId, ClassLabel, ImageAnnotation, ModelError, Project,
    ProjectMetadata, Rect, default_color,
};

/// Complete project document as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDocument {
    /// Format version for compatibility checking.
    pub version: String,

    /// Folder the images were scanned from.
    pub root_folder: PathBuf,

    /// Class definitions in list order.
    pub classes: Vec<ClassEntry>,

    /// Next class id to hand out.
    #[serde(default)]
    pub next_class_id: ClassId,

    /// Images in path order with their boxes.
    pub images: Vec<ImageEntry>,

    /// Creation/modification timestamps.
    #[serde(default)]
    pub metadata: ProjectMetadata,
}

/// A class definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntry {
    pub id: ClassId,
    pub name: String,
    /// RGB color; derived from the id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
}

/// An image with its boxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Path relative to the root folder, `/`-separated.
    pub path: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub boxes: Vec<BoxEntry>,
    /// Next box id to hand out.
    #[serde(default)]
    pub next_box_id: BoxId,
}

/// A bounding box in pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxEntry {
    pub id: BoxId,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    #[serde(default)]
    pub class_id: Option<ClassId>,
}

impl ProjectDocument {
    /// Current version of the project document format.
    pub const CURRENT_VERSION: &'static str = "0.1.0";

    /// Major version number for compatibility checking.
    pub const VERSION_MAJOR: u32 = 0;

    /// Minor version number.
    pub const VERSION_MINOR: u32 = 1;

    /// Snapshot a project.
    pub fn from_project(project: &Project) -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            root_folder: project.root_folder.clone(),
            classes: project
                .classes()
                .iter()
                .map(|c| ClassEntry {
                    id: c.id,
                    name: c.name.clone(),
                    color: Some(c.color),
                })
                .collect(),
            next_class_id: project.next_class_id(),
            images: project
                .images()
                .map(|image| ImageEntry {
                    path: image.image_path.clone(),
                    width: image.width,
                    height: image.height,
                    boxes: image
                        .boxes()
                        .iter()
                        .map(|b| BoxEntry {
                            id: b.id,
                            x_min: b.rect.x_min,
                            y_min: b.rect.y_min,
                            x_max: b.rect.x_max,
                            y_max: b.rect.y_max,
                            class_id: b.class_id,
                        })
                        .collect(),
                    next_box_id: image.next_box_id(),
                })
                .collect(),
            metadata: project.metadata.clone(),
        }
    }

    /// Parse a version string into (major, minor, patch) components.
    ///
    /// Returns None if the version string is invalid.
    pub fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
        let parts: Vec<&str> = version.split('.').collect();
        if parts.len() != 3 {
            return None;
        }
        let major = parts[0].parse().ok()?;
        let minor = parts[1].parse().ok()?;
        let patch = parts[2].parse().ok()?;
        Some((major, minor, patch))
    }

    /// Check if a version is compatible with the current version.
    ///
    /// For version 0.x.x (unstable), only exact minor version matches are compatible.
    /// For version 1.x.x+, any file with the same major version is compatible.
    pub fn is_version_compatible(file_version: &str) -> bool {
        let Some((file_major, file_minor, _)) = Self::parse_version(file_version) else {
            return false;
        };

        if Self::VERSION_MAJOR == 0 {
            // Unstable: require exact minor version match
            file_major == 0 && file_minor == Self::VERSION_MINOR
        } else {
            // Stable: same major version is compatible
            file_major == Self::VERSION_MAJOR
        }
    }

    /// Check if we can read a file but it might have compatibility issues.
    pub fn is_version_readable(file_version: &str) -> bool {
        let Some((file_major, _, _)) = Self::parse_version(file_version) else {
            return false;
        };
        file_major == 0 || file_major == Self::VERSION_MAJOR
    }

    /// Rebuild a project, repairing what can be repaired.
    ///
    /// Boxes with invalid geometry or duplicate ids are dropped, dangling
    /// class references become unassigned, and duplicate classes or images
    /// are dropped. Each repair is reported as a warning.
    pub fn into_project(self) -> Result<(Project, Vec<FormatWarning>), FormatError> {
        if !Self::is_version_readable(&self.version) {
            return Err(FormatError::VersionMismatch {
                expected: Self::CURRENT_VERSION.to_string(),
                found: self.version,
            });
        }

        let mut warnings = Vec::new();
        if !Self::is_version_compatible(&self.version) {
            warnings.push(FormatWarning::warning(format!(
                "Project version {} differs from {}, reading on a best-effort basis",
                self.version,
                Self::CURRENT_VERSION
            )));
        }

        let mut project = Project::new(self.root_folder);
        project.metadata = self.metadata;

        for entry in self.classes {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                warnings.push(FormatWarning::warning(format!(
                    "Dropped class {} with an empty name",
                    entry.id
                )));
                continue;
            }
            let class = ClassLabel {
                id: entry.id,
                color: entry.color.unwrap_or_else(|| default_color(entry.id)),
                name,
            };
            let position = project.classes().len();
            if let Err(e) = project.insert_class_at(position, class) {
                warnings.push(FormatWarning::warning(format!("Dropped class: {}", e)));
            }
        }
        project.set_next_class_id(self.next_class_id);

        let mut seen_images = HashSet::new();
        for entry in self.images {
            if !seen_images.insert(entry.path.clone()) {
                warnings.push(
                    FormatWarning::warning("Dropped duplicate image entry").with_image(&entry.path),
                );
                continue;
            }
            project.insert_image(ImageAnnotation::new(&entry.path, entry.width, entry.height));

            for b in entry.boxes {
                let class_id = match b.class_id {
                    Some(id) if project.class(id).is_none() => {
                        warnings.push(
                            FormatWarning::warning(format!(
                                "Box {} referenced unknown class {}, now unassigned",
                                b.id, id
                            ))
                            .with_image(&entry.path),
                        );
                        None
                    }
                    other => other,
                };
                let bbox = BoundingBox::new(
                    b.id,
                    Rect::new(b.x_min, b.y_min, b.x_max, b.y_max),
                    class_id,
                );
                let position = project.image(&entry.path).map_or(0, |i| i.len());
                match project.insert_box_at(&entry.path, position, bbox) {
                    Ok(()) => {}
                    Err(ModelError::InvalidGeometry { rect, .. }) => {
                        warnings.push(
                            FormatWarning::warning(format!(
                                "Dropped box {} with invalid geometry {:?}",
                                b.id, rect
                            ))
                            .with_image(&entry.path),
                        );
                    }
                    Err(e) => {
                        warnings.push(
                            FormatWarning::warning(format!("Dropped box {}: {}", b.id, e))
                                .with_image(&entry.path),
                        );
                    }
                }
            }

            if let Ok(image) = project.image_mut(&entry.path) {
                image.set_next_box_id(entry.next_box_id);
            }
        }

        Ok((project, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(json: &str) -> ProjectDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(ProjectDocument::parse_version("0.1.0"), Some((0, 1, 0)));
        assert_eq!(ProjectDocument::parse_version("1.2"), None);
        assert!(ProjectDocument::is_version_compatible("0.1.5"));
        assert!(!ProjectDocument::is_version_compatible("0.2.0"));
        assert!(ProjectDocument::is_version_readable("0.2.0"));
        assert!(!ProjectDocument::is_version_readable("2.0.0"));
    }

    #[test]
    fn test_newer_major_version_rejected() {
        let doc = document(
            r#"{"version": "3.0.0", "root_folder": "/x", "classes": [], "images": []}"#,
        );
        assert!(matches!(
            doc.into_project(),
            Err(FormatError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_dangling_class_becomes_unassigned() {
        let doc = document(
            r#"{
                "version": "0.1.0",
                "root_folder": "/x",
                "classes": [{"id": 0, "name": "cat"}],
                "images": [{
                    "path": "a.jpg", "width": 100, "height": 100,
                    "boxes": [
                        {"id": 1, "x_min": 1, "y_min": 1, "x_max": 5, "y_max": 5, "class_id": 0},
                        {"id": 2, "x_min": 1, "y_min": 1, "x_max": 5, "y_max": 5, "class_id": 7}
                    ]
                }]
            }"#,
        );
        let (project, warnings) = doc.into_project().unwrap();
        let image = project.image("a.jpg").unwrap();
        assert_eq!(image.get(1).unwrap().class_id, Some(0));
        assert_eq!(image.get(2).unwrap().class_id, None);
        assert_eq!(warnings.len(), 1);
        assert_eq!(project.class(0).unwrap().color, default_color(0));
    }

    #[test]
    fn test_invalid_boxes_and_duplicates_dropped() {
        let doc = document(
            r#"{
                "version": "0.1.0",
                "root_folder": "/x",
                "classes": [{"id": 0, "name": "cat"}, {"id": 1, "name": "cat"}, {"id": 0, "name": "dog"}],
                "next_class_id": 0,
                "images": [{
                    "path": "a.jpg", "width": 100, "height": 100,
                    "boxes": [
                        {"id": 1, "x_min": 5, "y_min": 5, "x_max": 5, "y_max": 9},
                        {"id": 2, "x_min": -5, "y_min": 0, "x_max": 50, "y_max": 200},
                        {"id": 2, "x_min": 0, "y_min": 0, "x_max": 1, "y_max": 1}
                    ],
                    "next_box_id": 1
                }]
            }"#,
        );
        let (project, warnings) = doc.into_project().unwrap();
        assert_eq!(project.classes().len(), 1);
        assert_eq!(project.next_class_id(), 1);

        let image = project.image("a.jpg").unwrap();
        assert_eq!(image.len(), 1);
        assert_eq!(image.get(2).unwrap().rect, Rect::new(0.0, 0.0, 50.0, 100.0));
        assert_eq!(image.next_box_id(), 3);
        assert_eq!(warnings.len(), 4);
    }
}
