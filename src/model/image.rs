//! Per-image annotation storage.

use serde::{Deserialize, Serialize};

use super::class_label::ClassId;
use super::geometry::Rect;

/// Identifier of a box, unique within its image.
pub type BoxId = u32;

/// A bounding box annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Unique identifier within the owning image.
    pub id: BoxId,
    /// Box corners in image pixels.
    pub rect: Rect,
    /// Assigned class, if any. May be dangling; treat unknown ids as unassigned.
    pub class_id: Option<ClassId>,
}

impl BoundingBox {
    pub fn new(id: BoxId, rect: Rect, class_id: Option<ClassId>) -> Self {
        Self { id, rect, class_id }
    }
}

/// Annotations of a single image.
///
/// Boxes are kept in insertion order; exports iterate them in this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotation {
    /// Path of the image relative to the project root, `/`-separated.
    pub image_path: String,
    /// Image width in pixels, read once when the folder was scanned.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    boxes: Vec<BoundingBox>,
    /// Next box id to hand out. Ids are never reused.
    next_box_id: BoxId,
}

impl ImageAnnotation {
    pub fn new(image_path: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            image_path: image_path.into(),
            width,
            height,
            boxes: Vec::new(),
            next_box_id: 1,
        }
    }

    /// The file name component of the image path.
    pub fn file_name(&self) -> &str {
        self.image_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.image_path)
    }

    /// The file name without its extension, used to name per-image exports.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, id: BoxId) -> Option<&BoundingBox> {
        self.boxes.iter().find(|b| b.id == id)
    }

    /// Position of a box in the ordered sequence.
    pub fn position(&self, id: BoxId) -> Option<usize> {
        self.boxes.iter().position(|b| b.id == id)
    }

    pub fn next_box_id(&self) -> BoxId {
        self.next_box_id
    }

    /// Clamp a rectangle into this image's bounds.
    pub fn clamp(&self, rect: Rect) -> Rect {
        rect.clamped(self.width, self.height)
    }

    pub(crate) fn allocate_id(&mut self) -> BoxId {
        let id = self.next_box_id;
        self.next_box_id += 1;
        id
    }

    pub(crate) fn push(&mut self, bbox: BoundingBox) {
        self.bump_counter(bbox.id);
        self.boxes.push(bbox);
    }

    pub(crate) fn insert(&mut self, position: usize, bbox: BoundingBox) {
        self.bump_counter(bbox.id);
        self.boxes.insert(position, bbox);
    }

    pub(crate) fn remove_at(&mut self, position: usize) -> BoundingBox {
        self.boxes.remove(position)
    }

    pub(crate) fn get_mut(&mut self, id: BoxId) -> Option<&mut BoundingBox> {
        self.boxes.iter_mut().find(|b| b.id == id)
    }

    pub(crate) fn boxes_mut(&mut self) -> impl Iterator<Item = &mut BoundingBox> {
        self.boxes.iter_mut()
    }

    /// Restore the id counter, keeping it above every existing id.
    pub(crate) fn set_next_box_id(&mut self, next: BoxId) {
        let floor = self.boxes.iter().map(|b| b.id + 1).max().unwrap_or(1);
        self.next_box_id = next.max(floor);
    }

    fn bump_counter(&mut self, id: BoxId) {
        if id >= self.next_box_id {
            self.next_box_id = id + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_and_file_name() {
        let image = ImageAnnotation::new("train/cat.01.jpg", 10, 10);
        assert_eq!(image.file_name(), "cat.01.jpg");
        assert_eq!(image.stem(), "cat.01");

        let hidden = ImageAnnotation::new(".hidden", 10, 10);
        assert_eq!(hidden.stem(), ".hidden");
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut image = ImageAnnotation::new("a.png", 100, 100);
        let id1 = image.allocate_id();
        image.push(BoundingBox::new(id1, Rect::new(0.0, 0.0, 5.0, 5.0), None));
        image.remove_at(0);
        let id2 = image.allocate_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_set_next_box_id_respects_existing() {
        let mut image = ImageAnnotation::new("a.png", 100, 100);
        image.push(BoundingBox::new(7, Rect::new(0.0, 0.0, 5.0, 5.0), None));
        image.set_next_box_id(2);
        assert_eq!(image.next_box_id(), 8);
    }
}
