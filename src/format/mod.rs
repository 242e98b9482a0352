//! Persistence and export.
//!
//! The project itself is stored as `project.json` (see [`save`] and
//! [`load`]). After every save the same snapshot is projected into three
//! export formats through the `AnnotationFormat` trait:
//!
//! - **Pascal VOC XML**: `voc/Annotations/<stem>.xml`, one file per image
//! - **YOLO TXT**: `yolo/labels/<stem>.txt` plus a shared `yolo/classes.txt`
//! - **COCO JSON**: `coco/annotations.json` for the whole project
//!
//! ## Usage
//!
//! ```rust,ignore
//! use boxlabel::format::{self, ExportOptions};
//!
//! let report = format::save(&project, &path)?;
//! let summary = format::export_all(&project, &exports_dir, &ExportOptions::default());
//! ```

mod atomic;
mod auto_save;
mod error;
mod exporter;
pub mod formats;
mod project;
mod project_file;
mod registry;
mod traits;

pub use atomic::write_atomic;
pub use auto_save::AutoSaveManager;
pub use error::FormatError;
pub use exporter::{
    EXPORTS_DIR_NAME, ExportSummary, FormatOutcome, export_all, export_with, exports_dir_for,
    import_existing,
};
pub use project::{BoxEntry, ClassEntry, ImageEntry, ProjectDocument};
pub use project_file::{
    BackupOutcome, LoadReport, SaveReport, backup_path, load, load_or_backup, save,
};
pub use registry::{EXPORT_ORDER, FormatRegistry, IMPORT_ORDER};
pub use traits::{
    AnnotationFormat, ExportOptions, ExportResult, FormatWarning, ImportResult, RenderedExport,
    UnlabeledPolicy, WarningSeverity,
};
