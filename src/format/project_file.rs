//! Saving and loading `project.json`.
//!
//! Saving copies the current file to a `.bak` sibling first, then writes the
//! new document atomically. Loading validates the document and repairs what
//! it can; [`load_or_backup`] falls back to the `.bak` copy.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::format::atomic::write_atomic;
use crate::format::error::FormatError;
use crate::format::project::ProjectDocument;
use crate::format::traits::FormatWarning;
use crate::model::Project;

/// What happened to the previous file during a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// There was no previous file.
    NotNeeded,
    /// The previous file was copied here.
    Created(PathBuf),
    /// Copying failed; the save went ahead anyway.
    Failed(String),
}

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    /// File that was written.
    pub path: PathBuf,
    /// Backup of the previous version.
    pub backup: BackupOutcome,
    /// Size of the written document.
    pub bytes_written: usize,
}

/// Result of a successful load.
#[derive(Debug)]
pub struct LoadReport {
    /// The reconstructed project.
    pub project: Project,
    /// Repairs made while loading.
    pub warnings: Vec<FormatWarning>,
    /// File the project was actually read from.
    pub path: PathBuf,
    /// Whether the primary file failed and the `.bak` copy was used.
    pub recovered_from_backup: bool,
}

/// The backup sibling of a project file (`project.json` -> `project.json.bak`).
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Write the project to `path`.
///
/// An existing file is copied to [`backup_path`] first. A failed backup is
/// logged and reported in the result but does not stop the save.
pub fn save(project: &Project, path: &Path) -> Result<SaveReport, FormatError> {
    let document = ProjectDocument::from_project(project);
    let mut json = serde_json::to_string_pretty(&document)?;
    json.push('\n');

    let backup = backup_existing(path);
    write_atomic(path, json.as_bytes())?;

    log::info!(
        "Saved project: {} images, {} boxes, {} classes to {:?}",
        project.image_count(),
        project.total_boxes(),
        project.classes().len(),
        path
    );

    Ok(SaveReport {
        path: path.to_path_buf(),
        backup,
        bytes_written: json.len(),
    })
}

fn backup_existing(path: &Path) -> BackupOutcome {
    if !path.is_file() {
        return BackupOutcome::NotNeeded;
    }
    let backup = backup_path(path);
    match std::fs::copy(path, &backup) {
        Ok(_) => {
            log::debug!("Backed up {:?} to {:?}", path, backup);
            BackupOutcome::Created(backup)
        }
        Err(e) => {
            log::warn!("Failed to back up {:?}: {}", path, e);
            BackupOutcome::Failed(e.to_string())
        }
    }
}

/// Read and validate a project file.
pub fn load(path: &Path) -> Result<LoadReport, FormatError> {
    let json = std::fs::read_to_string(path)?;
    let document: ProjectDocument = serde_json::from_str(&json)?;
    let (project, warnings) = document.into_project()?;

    for warning in &warnings {
        log::warn!("{}", warning);
    }
    log::info!(
        "Loaded project: {} images, {} boxes, {} classes from {:?}",
        project.image_count(),
        project.total_boxes(),
        project.classes().len(),
        path
    );

    Ok(LoadReport {
        project,
        warnings,
        path: path.to_path_buf(),
        recovered_from_backup: false,
    })
}

/// Load `path`, falling back to its `.bak` sibling if the primary is
/// missing or corrupt. Returns the primary error if both fail.
pub fn load_or_backup(path: &Path) -> Result<LoadReport, FormatError> {
    let primary = match load(path) {
        Ok(report) => return Ok(report),
        Err(e) => e,
    };

    let backup = backup_path(path);
    if !backup.is_file() {
        return Err(primary);
    }
    log::warn!(
        "Failed to load {:?} ({}), trying backup {:?}",
        path,
        primary,
        backup
    );

    match load(&backup) {
        Ok(mut report) => {
            report.recovered_from_backup = true;
            Ok(report)
        }
        Err(e) => {
            log::warn!("Backup {:?} is unusable too: {}", backup, e);
            Err(primary)
        }
    }
}
