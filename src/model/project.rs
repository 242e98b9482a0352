//! The project: classes plus per-image annotations, and every model mutator.
//!
//! Mutators are pure in-memory transforms. Each one either fails without
//! touching the project or succeeds and returns the prior state needed to
//! reverse it, which is what the command stack in [`crate::undo`] records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::class_label::{ClassId, ClassLabel};
use super::error::ModelError;
use super::geometry::Rect;
use super::image::{BoundingBox, BoxId, ImageAnnotation};

/// Reference to a box by image path and box id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRef {
    pub image: String,
    pub box_id: BoxId,
}

impl BoxRef {
    pub fn new(image: impl Into<String>, box_id: BoxId) -> Self {
        Self {
            image: image.into(),
            box_id,
        }
    }
}

/// A box removed from an image, with the position it occupied.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedBox {
    pub position: usize,
    pub bbox: BoundingBox,
}

/// Box state before and after an update.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxUpdate {
    pub old: BoundingBox,
    pub new: BoundingBox,
}

/// A removed class with its list position and the boxes it was unassigned from.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedClass {
    pub position: usize,
    pub class: ClassLabel,
    pub unassigned: Vec<BoxRef>,
}

/// Timestamps stored alongside the project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Creation timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Last modified timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

impl ProjectMetadata {
    /// Create new metadata with the current timestamp.
    pub fn new() -> Self {
        let now = current_timestamp();
        Self {
            created_at: Some(now.clone()),
            modified_at: Some(now),
        }
    }

    /// Update the modified timestamp.
    pub fn touch(&mut self) {
        self.modified_at = Some(current_timestamp());
    }
}

/// The full working state of an annotation session.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Folder the images were scanned from.
    pub root_folder: PathBuf,
    classes: Vec<ClassLabel>,
    images: BTreeMap<String, ImageAnnotation>,
    next_class_id: ClassId,
    pub metadata: ProjectMetadata,
}

impl Project {
    /// Create an empty project rooted at `root_folder`.
    pub fn new(root_folder: impl Into<PathBuf>) -> Self {
        Self {
            root_folder: root_folder.into(),
            classes: Vec::new(),
            images: BTreeMap::new(),
            next_class_id: 0,
            metadata: ProjectMetadata::new(),
        }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Classes in their stable display/export order.
    pub fn classes(&self) -> &[ClassLabel] {
        &self.classes
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassLabel> {
        self.classes.iter().find(|c| c.id == id)
    }

    pub fn class_by_name(&self, name: &str) -> Option<&ClassLabel> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Position of a class in the ordered class list.
    pub fn class_index(&self, id: ClassId) -> Option<usize> {
        self.classes.iter().position(|c| c.id == id)
    }

    /// Resolve a box's class reference, treating dangling ids as unassigned.
    pub fn resolve_class(&self, class_id: Option<ClassId>) -> Option<&ClassLabel> {
        class_id.and_then(|id| self.class(id))
    }

    pub fn next_class_id(&self) -> ClassId {
        self.next_class_id
    }

    pub fn image(&self, path: &str) -> Option<&ImageAnnotation> {
        self.images.get(path)
    }

    /// Images in path order.
    pub fn images(&self) -> impl Iterator<Item = &ImageAnnotation> {
        self.images.values()
    }

    pub fn image_paths(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(|k| k.as_str())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn total_boxes(&self) -> usize {
        self.images.values().map(|i| i.len()).sum()
    }

    /// Every box that references `class_id`, in image then box order.
    pub fn class_usages(&self, class_id: ClassId) -> Vec<BoxRef> {
        self.images
            .values()
            .flat_map(|image| {
                image
                    .boxes()
                    .iter()
                    .filter(move |b| b.class_id == Some(class_id))
                    .map(move |b| BoxRef::new(image.image_path.clone(), b.id))
            })
            .collect()
    }

    // ========================================================================
    // Image set
    // ========================================================================

    /// Add (or replace) an image entry.
    pub fn insert_image(&mut self, image: ImageAnnotation) {
        self.images.insert(image.image_path.clone(), image);
    }

    pub fn remove_image(&mut self, path: &str) -> Option<ImageAnnotation> {
        self.images.remove(path)
    }

    pub(crate) fn image_mut(&mut self, path: &str) -> Result<&mut ImageAnnotation, ModelError> {
        self.images
            .get_mut(path)
            .ok_or_else(|| ModelError::UnknownImage {
                image: path.to_string(),
            })
    }

    // ========================================================================
    // Box mutators
    // ========================================================================

    /// Add a box to an image and return its id.
    ///
    /// The rectangle is clamped to the image bounds before validation.
    pub fn add_box(
        &mut self,
        image: &str,
        rect: Rect,
        class_id: Option<ClassId>,
    ) -> Result<BoxId, ModelError> {
        self.check_class(class_id)?;
        let entry = self.image_mut(image)?;
        let rect = validated(entry, rect)?;
        let id = entry.allocate_id();
        entry.push(BoundingBox::new(id, rect, class_id));
        Ok(id)
    }

    /// Remove a box and return it with its former position.
    pub fn remove_box(&mut self, image: &str, box_id: BoxId) -> Result<RemovedBox, ModelError> {
        let entry = self.image_mut(image)?;
        let position = entry.position(box_id).ok_or_else(|| ModelError::UnknownBox {
            image: image.to_string(),
            id: box_id,
        })?;
        let bbox = entry.remove_at(position);
        Ok(RemovedBox { position, bbox })
    }

    /// Update a box's rectangle and/or class.
    ///
    /// `class_id` is `None` to leave the class alone and `Some(None)` to
    /// unassign it.
    pub fn update_box(
        &mut self,
        image: &str,
        box_id: BoxId,
        rect: Option<Rect>,
        class_id: Option<Option<ClassId>>,
    ) -> Result<BoxUpdate, ModelError> {
        if let Some(class_id) = class_id {
            self.check_class(class_id)?;
        }
        let entry = self.image_mut(image)?;
        let rect = rect.map(|r| validated(entry, r)).transpose()?;

        let bbox = entry.get_mut(box_id).ok_or_else(|| ModelError::UnknownBox {
            image: image.to_string(),
            id: box_id,
        })?;
        let old = bbox.clone();
        if let Some(rect) = rect {
            bbox.rect = rect;
        }
        if let Some(class_id) = class_id {
            bbox.class_id = class_id;
        }
        Ok(BoxUpdate {
            old,
            new: bbox.clone(),
        })
    }

    /// Reinsert a box at a given position, keeping its id.
    pub fn insert_box_at(
        &mut self,
        image: &str,
        position: usize,
        bbox: BoundingBox,
    ) -> Result<(), ModelError> {
        self.check_class(bbox.class_id)?;
        let entry = self.image_mut(image)?;
        if entry.get(bbox.id).is_some() {
            return Err(ModelError::DuplicateId { id: bbox.id });
        }
        if position > entry.len() {
            return Err(ModelError::PositionOutOfRange {
                position,
                len: entry.len(),
            });
        }
        let rect = validated(entry, bbox.rect)?;
        entry.insert(position, BoundingBox { rect, ..bbox });
        Ok(())
    }

    /// Overwrite a box's rectangle and class with a captured state.
    pub fn set_box(&mut self, image: &str, bbox: &BoundingBox) -> Result<(), ModelError> {
        self.update_box(image, bbox.id, Some(bbox.rect), Some(bbox.class_id))
            .map(|_| ())
    }

    // ========================================================================
    // Class mutators
    // ========================================================================

    /// Append a new class and return its id.
    pub fn add_class(&mut self, name: &str) -> Result<ClassId, ModelError> {
        let name = self.check_class_name(name, None)?;
        let id = self.next_class_id;
        self.next_class_id += 1;
        self.classes.push(ClassLabel::new(id, name));
        Ok(id)
    }

    /// Rename a class and return its previous name.
    pub fn rename_class(&mut self, class_id: ClassId, name: &str) -> Result<String, ModelError> {
        let name = self.check_class_name(name, Some(class_id))?;
        let class = self
            .classes
            .iter_mut()
            .find(|c| c.id == class_id)
            .ok_or(ModelError::UnknownClass { id: class_id })?;
        Ok(std::mem::replace(&mut class.name, name))
    }

    /// Remove a class.
    ///
    /// With `cascade == false` the removal is blocked while any box still
    /// references the class. With `cascade == true` those boxes become
    /// unassigned and are listed in the result.
    pub fn remove_class(
        &mut self,
        class_id: ClassId,
        cascade: bool,
    ) -> Result<RemovedClass, ModelError> {
        let position = self
            .class_index(class_id)
            .ok_or(ModelError::UnknownClass { id: class_id })?;
        let unassigned = self.class_usages(class_id);
        if !unassigned.is_empty() && !cascade {
            return Err(ModelError::ClassInUse {
                id: class_id,
                count: unassigned.len(),
            });
        }

        for image in self.images.values_mut() {
            for bbox in image.boxes_mut() {
                if bbox.class_id == Some(class_id) {
                    bbox.class_id = None;
                }
            }
        }
        let class = self.classes.remove(position);
        Ok(RemovedClass {
            position,
            class,
            unassigned,
        })
    }

    /// Reinsert a class at a list position, keeping its id.
    pub fn insert_class_at(
        &mut self,
        position: usize,
        class: ClassLabel,
    ) -> Result<(), ModelError> {
        if self.class(class.id).is_some() {
            return Err(ModelError::DuplicateId { id: class.id });
        }
        if self.class_by_name(&class.name).is_some() {
            return Err(ModelError::DuplicateClassName { name: class.name });
        }
        if position > self.classes.len() {
            return Err(ModelError::PositionOutOfRange {
                position,
                len: self.classes.len(),
            });
        }
        if class.id >= self.next_class_id {
            self.next_class_id = class.id + 1;
        }
        self.classes.insert(position, class);
        Ok(())
    }

    /// Restore the class id counter, keeping it above every existing id.
    pub(crate) fn set_next_class_id(&mut self, next: ClassId) {
        let floor = self.classes.iter().map(|c| c.id + 1).max().unwrap_or(0);
        self.next_class_id = next.max(floor);
    }

    /// Find a class by name or create it.
    pub(crate) fn get_or_create_class(&mut self, name: &str) -> Result<ClassId, ModelError> {
        match self.class_by_name(name.trim()) {
            Some(class) => Ok(class.id),
            None => self.add_class(name),
        }
    }

    fn check_class(&self, class_id: Option<ClassId>) -> Result<(), ModelError> {
        match class_id {
            Some(id) if self.class(id).is_none() => Err(ModelError::UnknownClass { id }),
            _ => Ok(()),
        }
    }

    fn check_class_name(&self, name: &str, except: Option<ClassId>) -> Result<String, ModelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelError::EmptyClassName);
        }
        let taken = self
            .classes
            .iter()
            .any(|c| c.name == name && Some(c.id) != except);
        if taken {
            return Err(ModelError::DuplicateClassName {
                name: name.to_string(),
            });
        }
        Ok(name.to_string())
    }
}

/// Clamp a rectangle into an image and check the geometry invariant.
fn validated(image: &ImageAnnotation, rect: Rect) -> Result<Rect, ModelError> {
    let clamped = image.clamp(rect);
    if clamped.is_valid() {
        Ok(clamped)
    } else {
        Err(ModelError::InvalidGeometry {
            rect: clamped,
            width: image.width,
            height: image.height,
        })
    }
}

/// Get the current timestamp as ISO 8601 string.
fn current_timestamp() -> String {
    let now = web_time::SystemTime::now();
    let duration = now
        .duration_since(web_time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();

    // Format: YYYY-MM-DDTHH:MM:SSZ (UTC)
    let days_since_epoch = secs / 86400;
    let secs_today = secs % 86400;
    let hours = secs_today / 3600;
    let mins = (secs_today % 3600) / 60;
    let secs_remaining = secs_today % 60;

    let (year, month, day) = days_to_ymd(days_since_epoch);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, mins, secs_remaining
    )
}

/// Convert days since Unix epoch to year/month/day.
fn days_to_ymd(days: u64) -> (u32, u32, u32) {
    let mut remaining_days = days as i64;
    let mut year = 1970i32;

    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let days_in_months: [i64; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1u32;
    for &days_in_month in &days_in_months {
        if remaining_days < days_in_month {
            break;
        }
        remaining_days -= days_in_month;
        month += 1;
    }

    (year as u32, month, remaining_days as u32 + 1)
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
