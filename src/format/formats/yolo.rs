//! YOLO TXT format implementation.
//!
//! Implements the YOLO annotation format, which uses one text file per image
//! with normalized bounding box coordinates and a shared `classes.txt`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::format::error::FormatError;
use crate::format::formats::{
    Label, apply_boxes, extra_placeholder, find_empty_target, per_image_targets, resolve_label,
};
use crate::format::traits::{
    AnnotationFormat, ExportOptions, FormatWarning, ImportResult, RenderedExport,
};
use crate::model::{Project, Rect};

/// Directory of the per-image label files, relative to the exports directory.
pub const LABELS_DIR: &str = "yolo/labels";

/// Shared class list, relative to the exports directory.
pub const CLASSES_FILE: &str = "yolo/classes.txt";

/// YOLO TXT format.
///
/// Each line is `class_index center_x center_y width height`, normalized to
/// `[0, 1]`. `class_index` is the position of the class in `classes.txt`.
pub struct YoloFormat;

impl AnnotationFormat for YoloFormat {
    fn id(&self) -> &'static str {
        "yolo"
    }

    fn display_name(&self) -> &'static str {
        "YOLO (TXT)"
    }

    fn render(
        &self,
        project: &Project,
        options: &ExportOptions,
    ) -> Result<RenderedExport, FormatError> {
        let mut rendered = RenderedExport::new();
        let precision = options.yolo_precision;

        // Write classes.txt, with the placeholder appended when it is used
        let mut classes: String = project
            .classes()
            .iter()
            .map(|c| format!("{}\n", c.name))
            .collect();
        if let Some(name) = extra_placeholder(project, options) {
            classes.push_str(name);
            classes.push('\n');
        }
        rendered.files.insert(PathBuf::from(CLASSES_FILE), classes);
        let placeholder_index = project.classes().len();

        for image in per_image_targets(project, self.id(), &mut rendered.warnings) {
            let mut content = String::new();

            if image.width == 0 || image.height == 0 {
                rendered.warnings.push(
                    FormatWarning::error("Image has no dimensions, wrote an empty label file")
                        .with_image(&image.image_path),
                );
            } else {
                let width = f64::from(image.width);
                let height = f64::from(image.height);

                for bbox in image.boxes() {
                    let Some(label) =
                        resolve_label(project, image, bbox, options, &mut rendered.warnings)
                    else {
                        continue;
                    };
                    let class_index = match label {
                        Label::Class { index, .. } => index,
                        Label::Placeholder(_) => placeholder_index,
                    };

                    // YOLO uses center coordinates, normalized to [0, 1]
                    let rect = bbox.rect;
                    let cx =
                        normalized((f64::from(rect.x_min) + f64::from(rect.x_max)) / 2.0, width);
                    let cy =
                        normalized((f64::from(rect.y_min) + f64::from(rect.y_max)) / 2.0, height);
                    let nw = normalized(f64::from(rect.width()), width);
                    let nh = normalized(f64::from(rect.height()), height);

                    let _ = writeln!(
                        content,
                        "{} {:.p$} {:.p$} {:.p$} {:.p$}",
                        class_index,
                        cx,
                        cy,
                        nw,
                        nh,
                        p = precision
                    );
                    rendered.annotations_exported += 1;
                }
            }

            let path = Path::new(LABELS_DIR).join(format!("{}.txt", image.stem()));
            rendered.files.insert(path, content);
            rendered.images_exported += 1;
        }

        Ok(rendered)
    }

    fn import(
        &self,
        project: &mut Project,
        exports_dir: &Path,
    ) -> Result<ImportResult, FormatError> {
        let mut result = ImportResult::new(self.id());
        let labels_dir = exports_dir.join(LABELS_DIR);
        if !labels_dir.is_dir() {
            return Ok(result);
        }
        log::info!("Importing YOLO annotations from {:?}", labels_dir);

        // Read classes.txt
        let classes_path = exports_dir.join(CLASSES_FILE);
        let class_names: Vec<String> = if classes_path.exists() {
            std::fs::read_to_string(&classes_path)?
                .lines()
                .map(|line| line.trim().to_string())
                .collect()
        } else {
            Vec::new()
        };

        let mut txt_files: Vec<PathBuf> = std::fs::read_dir(&labels_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        txt_files.sort();

        for txt_path in txt_files {
            let stem = txt_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let Some(target) = find_empty_target(project, None, stem) else {
                continue;
            };
            let Some((width, height)) = project.image(&target).map(|i| (i.width, i.height)) else {
                continue;
            };

            let content = std::fs::read_to_string(&txt_path)?;
            let mut boxes = Vec::new();
            for (line_no, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_yolo_line(line, width, height) {
                    Some((index, rect)) => {
                        let name = class_names
                            .get(index)
                            .filter(|n| !n.is_empty())
                            .cloned()
                            .unwrap_or_else(|| format!("class_{}", index));
                        boxes.push((name, rect));
                    }
                    None => {
                        result.warnings.push(
                            FormatWarning::warning(format!(
                                "Skipped malformed line {}: '{}'",
                                line_no + 1,
                                line
                            ))
                            .with_image(&txt_path),
                        );
                    }
                }
            }
            apply_boxes(project, &target, boxes, &mut result);
        }

        log::info!(
            "Imported {} boxes into {} images from YOLO",
            result.boxes_imported,
            result.images_updated
        );
        Ok(result)
    }
}

/// Normalize a pixel value, clamped to [0, 1].
fn normalized(value: f64, extent: f64) -> f64 {
    (value / extent).clamp(0.0, 1.0)
}

/// Parse a single YOLO annotation line into a class index and a pixel rect.
fn parse_yolo_line(line: &str, width: u32, height: u32) -> Option<(usize, Rect)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }

    let class_index: usize = parts[0].parse().ok()?;
    let cx: f64 = parts[1].parse().ok()?;
    let cy: f64 = parts[2].parse().ok()?;
    let w: f64 = parts[3].parse().ok()?;
    let h: f64 = parts[4].parse().ok()?;

    let width = f64::from(width);
    let height = f64::from(height);
    let rect = Rect::new(
        ((cx - w / 2.0) * width) as f32,
        ((cy - h / 2.0) * height) as f32,
        ((cx + w / 2.0) * width) as f32,
        ((cy + h / 2.0) * height) as f32,
    );
    rect.is_finite().then_some((class_index, rect))
}
