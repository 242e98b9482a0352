//! Format registry for discovering and accessing export formats.

use std::collections::HashMap;

use crate::format::formats::{CocoFormat, PascalVocFormat, YoloFormat};
use crate::format::traits::AnnotationFormat;

/// Order in which existing exports are tried when importing.
///
/// COCO holds the whole project in one file, so it goes first.
pub const IMPORT_ORDER: [&str; 3] = ["coco", "voc", "yolo"];

/// Order in which formats are written.
pub const EXPORT_ORDER: [&str; 3] = ["voc", "yolo", "coco"];

/// Registry of available export formats.
///
/// All built-in formats are registered automatically on creation.
pub struct FormatRegistry {
    formats: HashMap<&'static str, Box<dyn AnnotationFormat>>,
}

impl FormatRegistry {
    /// Create a new registry with all built-in formats registered.
    pub fn new() -> Self {
        let mut registry = Self {
            formats: HashMap::new(),
        };

        registry.register(Box::new(PascalVocFormat));
        registry.register(Box::new(YoloFormat));
        registry.register(Box::new(CocoFormat));

        registry
    }

    /// Create a registry with no formats.
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// Register a format implementation, replacing any with the same id.
    pub fn register(&mut self, format: Box<dyn AnnotationFormat>) {
        self.formats.insert(format.id(), format);
    }

    /// Get a format by its ID.
    pub fn get(&self, id: &str) -> Option<&dyn AnnotationFormat> {
        self.formats.get(id).map(|f| f.as_ref())
    }

    /// Formats in a fixed order: the listed ids first, then the rest by id.
    pub fn ordered(&self, order: &[&str]) -> Vec<&dyn AnnotationFormat> {
        let mut ids: Vec<&'static str> = self.formats.keys().copied().collect();
        ids.sort_by_key(|id| (order.iter().position(|o| o == id).unwrap_or(order.len()), *id));
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Get all format IDs, sorted.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.formats.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
