//! Image folder scanning.
//!
//! Image dimensions are read from file headers once, when an image first
//! enters the project, and cached in its [`ImageAnnotation`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{ImageAnnotation, Project};

/// Supported image file extensions (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// File name of the project document.
pub const PROJECT_FILE_NAME: &str = "project.json";

/// Check if a path has a supported image extension (case-insensitive).
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Errors from scanning an image folder.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The folder does not exist or is not a directory
    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    /// The folder contains no readable images
    #[error("No images found in {0:?}")]
    NoImages(PathBuf),

    /// Listing the folder failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An image found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedImage {
    /// Path relative to the scanned folder, `/`-separated.
    pub relative_path: String,
    pub width: u32,
    pub height: u32,
}

/// Images found in a folder, plus files that could not be read.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Readable images, sorted by path.
    pub images: Vec<ScannedImage>,
    /// Image files whose header could not be decoded, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Result of re-syncing a project against its folder.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Images new on disk and added to the project.
    pub added: Vec<String>,
    /// Images gone from disk and removed with their boxes.
    pub removed: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Default location of the project file for an image folder: next to the
/// folder, in its parent directory.
pub fn default_project_path(folder: &Path) -> PathBuf {
    folder
        .parent()
        .unwrap_or(folder)
        .join(PROJECT_FILE_NAME)
}

/// List the supported images directly inside `folder` and read their sizes.
pub fn scan_folder(folder: &Path) -> Result<ScanReport, ScanError> {
    scan_filtered(folder, |_| true)
}

fn scan_filtered(folder: &Path, wanted: impl Fn(&str) -> bool) -> Result<ScanReport, ScanError> {
    if !folder.is_dir() {
        return Err(ScanError::NotADirectory(folder.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    paths.sort();

    let mut report = ScanReport::default();
    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            report
                .skipped
                .push((path.clone(), "file name is not valid UTF-8".to_string()));
            continue;
        };
        if !wanted(name) {
            continue;
        }
        match image::image_dimensions(&path) {
            Ok((width, height)) => {
                log::debug!("Found image {} ({}x{})", name, width, height);
                report.images.push(ScannedImage {
                    relative_path: name.to_string(),
                    width,
                    height,
                });
            }
            Err(e) => {
                log::warn!("Skipping unreadable image {:?}: {}", path, e);
                report.skipped.push((path.clone(), e.to_string()));
            }
        }
    }

    log::info!(
        "Scanned {:?}: {} images, {} skipped",
        folder,
        report.images.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Create a project from an image folder with the given starting classes.
///
/// Fails if the folder holds no readable images.
pub fn create_project(
    folder: &Path,
    default_classes: &[String],
) -> Result<(Project, ScanReport), ScanError> {
    let report = scan_folder(folder)?;
    if report.images.is_empty() {
        return Err(ScanError::NoImages(folder.to_path_buf()));
    }

    let root = std::path::absolute(folder).unwrap_or_else(|_| folder.to_path_buf());
    let mut project = Project::new(root);
    for name in default_classes {
        if let Err(e) = project.add_class(name) {
            log::warn!("Ignoring default class '{}': {}", name, e);
        }
    }
    for image in &report.images {
        project.insert_image(ImageAnnotation::new(
            &image.relative_path,
            image.width,
            image.height,
        ));
    }
    Ok((project, report))
}

/// Bring the project's image list in line with its folder.
///
/// Images missing on disk are removed together with their boxes; new image
/// files are added. Existing entries keep their cached dimensions.
pub fn sync_images(project: &mut Project) -> Result<SyncReport, ScanError> {
    let root = project.root_folder().to_path_buf();
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root));
    }

    let mut report = SyncReport::default();
    let vanished: Vec<String> = project
        .image_paths()
        .filter(|p| !root.join(p).is_file())
        .map(str::to_string)
        .collect();
    for path in vanished {
        project.remove_image(&path);
        report.removed.push(path);
    }

    let known: HashSet<String> = project.image_paths().map(str::to_string).collect();
    let scanned = scan_filtered(&root, |name| !known.contains(name))?;
    for image in scanned.images {
        project.insert_image(ImageAnnotation::new(
            &image.relative_path,
            image.width,
            image.height,
        ));
        report.added.push(image.relative_path);
    }

    if !report.is_empty() {
        log::info!(
            "Synced image folder: {} added, {} removed",
            report.added.len(),
            report.removed.len()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        image::RgbImage::new(width, height)
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.jpg")));
        assert!(is_image_file(Path::new("B.JPEG")));
        assert!(is_image_file(Path::new("c.Tif")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("gif.gif")));
        assert!(!is_image_file(Path::new("noext")));
    }

    #[test]
    fn test_default_project_path() {
        assert_eq!(
            default_project_path(Path::new("/data/pets/images")),
            PathBuf::from("/data/pets/project.json")
        );
    }

    #[test]
    fn test_scan_reads_dimensions_and_skips_junk() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 8, 6);
        write_png(dir.path(), "a.png", 4, 3);
        std::fs::write(dir.path().join("broken.png"), b"not an image").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let report = scan_folder(dir.path()).unwrap();
        assert_eq!(
            report.images,
            vec![
                ScannedImage {
                    relative_path: "a.png".into(),
                    width: 4,
                    height: 3
                },
                ScannedImage {
                    relative_path: "b.png".into(),
                    width: 8,
                    height: 6
                },
            ]
        );
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_scan_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            scan_folder(&dir.path().join("nope")),
            Err(ScanError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_create_project() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            create_project(dir.path(), &[]),
            Err(ScanError::NoImages(_))
        ));

        write_png(dir.path(), "a.png", 4, 3);
        let (project, _) = create_project(dir.path(), &["object".to_string()]).unwrap();
        assert_eq!(project.classes()[0].name, "object");
        assert_eq!(project.image("a.png").unwrap().width, 4);
    }

    #[test]
    fn test_sync_adds_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", 4, 3);
        write_png(dir.path(), "b.png", 4, 3);
        let (mut project, _) = create_project(dir.path(), &[]).unwrap();
        project
            .add_box("a.png", Rect::new(0.0, 0.0, 2.0, 2.0), None)
            .unwrap();

        std::fs::remove_file(dir.path().join("b.png")).unwrap();
        write_png(dir.path(), "c.png", 10, 10);

        let report = sync_images(&mut project).unwrap();
        assert_eq!(report.added, vec!["c.png".to_string()]);
        assert_eq!(report.removed, vec!["b.png".to_string()]);
        assert_eq!(project.image("a.png").unwrap().len(), 1);
        assert_eq!(project.image("c.png").unwrap().width, 10);

        assert!(sync_images(&mut project).unwrap().is_empty());
    }
}
