//! Running every format at once.
//!
//! Formats run independently: one failing to write does not stop the others.

use std::path::{Path, PathBuf};

use crate::format::error::FormatError;
use crate::format::registry::{EXPORT_ORDER, FormatRegistry, IMPORT_ORDER};
use crate::format::traits::{ExportOptions, ExportResult, ImportResult};
use crate::model::Project;

/// Default name of the exports directory, next to `project.json`.
pub const EXPORTS_DIR_NAME: &str = "exports";

/// Outcome of one format within [`export_all`].
#[derive(Debug)]
pub struct FormatOutcome {
    pub format: &'static str,
    pub result: Result<ExportResult, FormatError>,
}

/// Outcome of exporting every registered format.
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub outcomes: Vec<FormatOutcome>,
}

impl ExportSummary {
    /// Whether every format was written.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// The formats that were written.
    pub fn succeeded(&self) -> impl Iterator<Item = (&'static str, &ExportResult)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|r| (o.format, r)))
    }

    /// The formats that failed, with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (&'static str, &FormatError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.format, e)))
    }

    /// Look up the outcome for one format.
    pub fn get(&self, format: &str) -> Option<&Result<ExportResult, FormatError>> {
        self.outcomes
            .iter()
            .find(|o| o.format == format)
            .map(|o| &o.result)
    }
}

/// The exports directory that belongs to a project file.
pub fn exports_dir_for(project_path: &Path, dir_name: &str) -> PathBuf {
    project_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(dir_name)
}

/// Export the project in every built-in format.
pub fn export_all(project: &Project, exports_dir: &Path, options: &ExportOptions) -> ExportSummary {
    export_with(&FormatRegistry::new(), project, exports_dir, options)
}

/// Export the project in every format of `registry`.
pub fn export_with(
    registry: &FormatRegistry,
    project: &Project,
    exports_dir: &Path,
    options: &ExportOptions,
) -> ExportSummary {
    let mut summary = ExportSummary::default();
    for format in registry.ordered(&EXPORT_ORDER) {
        let result = format.export(project, exports_dir, options);
        match &result {
            Ok(r) => {
                for warning in &r.warnings {
                    log::debug!("{} export: {}", format.id(), warning);
                }
            }
            Err(e) => log::warn!("{} export failed: {}", format.display_name(), e),
        }
        summary.outcomes.push(FormatOutcome {
            format: format.id(),
            result,
        });
    }
    summary
}

/// Fill unannotated images from exports written by an earlier session.
///
/// Formats are tried in [`IMPORT_ORDER`]; the first one that imports at
/// least one box wins. Unreadable exports are logged and skipped.
pub fn import_existing(project: &mut Project, exports_dir: &Path) -> Option<ImportResult> {
    if !exports_dir.is_dir() {
        return None;
    }
    let registry = FormatRegistry::new();
    for format in registry.ordered(&IMPORT_ORDER) {
        match format.import(project, exports_dir) {
            Ok(result) if !result.is_empty() => {
                log::info!(
                    "Imported annotations from {} format ({} boxes)",
                    format.display_name(),
                    result.boxes_imported
                );
                return Some(result);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Could not import {} exports: {}", format.display_name(), e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageAnnotation, Rect};

    fn sample_project() -> Project {
        let mut project = Project::new("/data/pets");
        project.insert_image(ImageAnnotation::new("cat.jpg", 800, 600));
        let cat = project.add_class("cat").unwrap();
        project
            .add_box("cat.jpg", Rect::new(100.0, 100.0, 300.0, 400.0), Some(cat))
            .unwrap();
        project
    }

    #[test]
    fn test_exports_dir_for() {
        assert_eq!(
            exports_dir_for(Path::new("/x/project.json"), EXPORTS_DIR_NAME),
            PathBuf::from("/x/exports")
        );
    }

    #[test]
    fn test_export_all_writes_every_format() {
        let dir = tempfile::tempdir().unwrap();
        let summary = export_all(&sample_project(), dir.path(), &ExportOptions::default());
        assert!(summary.is_complete());
        assert!(dir.path().join("voc/Annotations/cat.xml").is_file());
        assert!(dir.path().join("yolo/labels/cat.txt").is_file());
        assert!(dir.path().join("yolo/classes.txt").is_file());
        assert!(dir.path().join("coco/annotations.json").is_file());
    }

    #[test]
    fn test_one_failing_format_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the VOC directory should go
        std::fs::write(dir.path().join("voc"), "in the way").unwrap();

        let summary = export_all(&sample_project(), dir.path(), &ExportOptions::default());
        assert!(!summary.is_complete());
        let failed: Vec<_> = summary.failed().map(|(id, _)| id).collect();
        assert_eq!(failed, vec!["voc"]);
        assert!(summary.get("yolo").unwrap().is_ok());
        assert!(dir.path().join("yolo/labels/cat.txt").is_file());
        assert!(dir.path().join("coco/annotations.json").is_file());
    }

    #[test]
    fn test_import_existing_prefers_coco() {
        let dir = tempfile::tempdir().unwrap();
        export_all(&sample_project(), dir.path(), &ExportOptions::default());

        let mut fresh = Project::new("/data/pets");
        fresh.insert_image(ImageAnnotation::new("cat.jpg", 800, 600));
        let result = import_existing(&mut fresh, dir.path()).unwrap();
        assert_eq!(result.format, "coco");
        assert_eq!(result.boxes_imported, 1);
        assert_eq!(fresh.class_by_name("cat").map(|c| c.id), Some(0));

        // Nothing left to fill on a second pass
        assert!(import_existing(&mut fresh, dir.path()).is_none());
    }

    #[test]
    fn test_import_existing_without_exports() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = sample_project();
        assert!(import_existing(&mut project, &dir.path().join("missing")).is_none());
    }
}
