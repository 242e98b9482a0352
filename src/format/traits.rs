//! Trait definitions for export format implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::format::atomic::write_atomic;
use crate::format::error::FormatError;
use crate::model::Project;

/// Trait for export format implementations.
///
/// Each format (Pascal VOC, YOLO, COCO) renders a project snapshot into a set
/// of files relative to the exports directory, and can read those files back
/// into a project whose images have not been annotated yet.
pub trait AnnotationFormat: Send + Sync {
    /// Unique identifier for this format (e.g., "coco", "yolo", "voc").
    fn id(&self) -> &'static str;

    /// Human-readable name for display.
    fn display_name(&self) -> &'static str;

    /// Render the project into files keyed by path relative to the exports
    /// directory. No I/O happens here.
    fn render(&self, project: &Project, options: &ExportOptions)
    -> Result<RenderedExport, FormatError>;

    /// Render and write every file under `exports_dir`.
    ///
    /// Each file is written to a temporary sibling and renamed into place, so
    /// a reader never sees a partially written file.
    fn export(
        &self,
        project: &Project,
        exports_dir: &Path,
        options: &ExportOptions,
    ) -> Result<ExportResult, FormatError> {
        log::info!("Exporting {} annotations to {:?}", self.display_name(), exports_dir);

        let rendered = self.render(project, options)?;
        let mut files_created = Vec::with_capacity(rendered.files.len());
        for (relative, content) in &rendered.files {
            let path = exports_dir.join(relative);
            write_atomic(&path, content.as_bytes())?;
            files_created.push(path);
        }

        log::info!(
            "Exported {} images with {} annotations ({} warnings)",
            rendered.images_exported,
            rendered.annotations_exported,
            rendered.warnings.len()
        );

        Ok(ExportResult {
            images_exported: rendered.images_exported,
            annotations_exported: rendered.annotations_exported,
            warnings: rendered.warnings,
            files_created,
        })
    }

    /// Import previously exported annotations from `exports_dir`.
    ///
    /// Only images that currently have no boxes are filled. Classes are
    /// matched by name and created when missing.
    fn import(&self, project: &mut Project, exports_dir: &Path)
    -> Result<ImportResult, FormatError>;
}

/// What to do with boxes that have no (or a dangling) class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UnlabeledPolicy {
    /// Leave the box out of the export and emit a warning.
    #[default]
    Skip,
    /// Export the box under an extra class with this name.
    Placeholder {
        /// Name of the extra class
        name: String,
    },
}

/// Options for export operations.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Handling of boxes without a class.
    pub unlabeled: UnlabeledPolicy,

    /// Decimal places for normalized YOLO values.
    pub yolo_precision: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            unlabeled: UnlabeledPolicy::Skip,
            yolo_precision: 6,
        }
    }
}

impl ExportOptions {
    /// Create new export options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unlabeled-box policy.
    pub fn unlabeled(mut self, policy: UnlabeledPolicy) -> Self {
        self.unlabeled = policy;
        self
    }

    /// Export unlabeled boxes under a placeholder class.
    pub fn placeholder(self, name: impl Into<String>) -> Self {
        self.unlabeled(UnlabeledPolicy::Placeholder { name: name.into() })
    }

    /// Set the decimal precision of YOLO values.
    pub fn yolo_precision(mut self, precision: usize) -> Self {
        self.yolo_precision = precision;
        self
    }
}

/// Output of [`AnnotationFormat::render`].
#[derive(Debug, Default)]
pub struct RenderedExport {
    /// File contents keyed by path relative to the exports directory.
    pub files: BTreeMap<PathBuf, String>,

    /// Number of images rendered.
    pub images_exported: usize,

    /// Number of boxes rendered.
    pub annotations_exported: usize,

    /// Warnings generated while rendering (e.g., skipped boxes).
    pub warnings: Vec<FormatWarning>,
}

impl RenderedExport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a rendered file by its relative path.
    pub fn file(&self, relative: impl AsRef<Path>) -> Option<&str> {
        self.files.get(relative.as_ref()).map(String::as_str)
    }
}

/// Result of an export operation.
#[derive(Debug, Default)]
pub struct ExportResult {
    /// Number of images exported.
    pub images_exported: usize,

    /// Number of annotations exported.
    pub annotations_exported: usize,

    /// Warnings generated during export (e.g., skipped boxes).
    pub warnings: Vec<FormatWarning>,

    /// Files created during export.
    pub files_created: Vec<PathBuf>,
}

impl ExportResult {
    /// Create a new export result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there were any errors (severe warnings).
    pub fn has_errors(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w.severity, WarningSeverity::Error))
    }
}

/// Result of an import operation.
#[derive(Debug, Default)]
pub struct ImportResult {
    /// Format the annotations were read from.
    pub format: &'static str,

    /// Number of images that received boxes.
    pub images_updated: usize,

    /// Number of boxes added.
    pub boxes_imported: usize,

    /// Number of classes created by name.
    pub classes_created: usize,

    /// Problems encountered (e.g., invalid boxes, unmatched files).
    pub warnings: Vec<FormatWarning>,
}

impl ImportResult {
    pub fn new(format: &'static str) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Whether anything was imported.
    pub fn is_empty(&self) -> bool {
        self.boxes_imported == 0
    }
}

/// Warning generated during format conversion.
#[derive(Debug, Clone)]
pub struct FormatWarning {
    /// Path of the image this warning relates to (if applicable).
    pub image_path: Option<PathBuf>,

    /// Human-readable warning message.
    pub message: String,

    /// Severity level of the warning.
    pub severity: WarningSeverity,
}

impl FormatWarning {
    /// Create a new warning.
    pub fn new(message: impl Into<String>, severity: WarningSeverity) -> Self {
        Self {
            image_path: None,
            message: message.into(),
            severity,
        }
    }

    /// Create an info-level warning.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, WarningSeverity::Info)
    }

    /// Create a warning-level warning.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, WarningSeverity::Warning)
    }

    /// Create an error-level warning.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, WarningSeverity::Error)
    }

    /// Set the image path this warning relates to.
    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }
}

impl std::fmt::Display for FormatWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.image_path {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Severity level for format warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    /// Informational message, not a problem.
    Info,
    /// Warning that something was skipped or modified.
    Warning,
    /// Error that may affect data integrity.
    Error,
}
