//! Export format implementations and the helpers they share.

mod coco;
mod pascal_voc;
mod yolo;

#[cfg(test)]
mod tests;

use std::collections::HashSet;

pub use coco::CocoFormat;
pub use pascal_voc::PascalVocFormat;
pub use yolo::YoloFormat;

use crate::format::traits::{ExportOptions, FormatWarning, ImportResult, UnlabeledPolicy};
use crate::model::{BoundingBox, ClassLabel, ImageAnnotation, ModelError, Project, Rect};

/// How a box is labeled in an export.
pub(crate) enum Label<'a> {
    /// A known class, with its position in the ordered class list.
    Class { class: &'a ClassLabel, index: usize },
    /// The placeholder class for unlabeled boxes.
    Placeholder(&'a str),
}

/// Resolve a box's label under the export options.
///
/// Returns `None` (after recording a warning) when the box should be skipped.
pub(crate) fn resolve_label<'a>(
    project: &'a Project,
    image: &ImageAnnotation,
    bbox: &BoundingBox,
    options: &'a ExportOptions,
    warnings: &mut Vec<FormatWarning>,
) -> Option<Label<'a>> {
    if let Some(index) = bbox.class_id.and_then(|id| project.class_index(id)) {
        return Some(Label::Class {
            class: &project.classes()[index],
            index,
        });
    }
    match &options.unlabeled {
        UnlabeledPolicy::Placeholder { name } => {
            // A placeholder named like a real class folds into that class
            match project.classes().iter().position(|c| c.name == *name) {
                Some(index) => Some(Label::Class {
                    class: &project.classes()[index],
                    index,
                }),
                None => Some(Label::Placeholder(name)),
            }
        }
        UnlabeledPolicy::Skip => {
            warnings.push(
                FormatWarning::warning(format!("Skipped unlabeled box {}", bbox.id))
                    .with_image(&image.image_path),
            );
            None
        }
    }
}

/// Name of the extra class the export needs for unlabeled boxes, if any.
///
/// `None` when the policy skips them, when no box is unlabeled, or when the
/// placeholder names an existing class.
pub(crate) fn extra_placeholder<'a>(
    project: &Project,
    options: &'a ExportOptions,
) -> Option<&'a str> {
    let UnlabeledPolicy::Placeholder { name } = &options.unlabeled else {
        return None;
    };
    let unlabeled = project
        .images()
        .flat_map(|i| i.boxes())
        .any(|b| project.resolve_class(b.class_id).is_none());
    (unlabeled && project.class_by_name(name).is_none()).then_some(name.as_str())
}

/// Images that get their own file in a per-image format.
///
/// Two images with the same stem (e.g. `a.jpg` and `a.png`) would write the
/// same file; the first in path order wins and the rest are reported.
pub(crate) fn per_image_targets<'a>(
    project: &'a Project,
    format: &str,
    warnings: &mut Vec<FormatWarning>,
) -> Vec<&'a ImageAnnotation> {
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(project.image_count());
    for image in project.images() {
        if seen.insert(image.stem()) {
            targets.push(image);
        } else {
            warnings.push(
                FormatWarning::error(format!(
                    "Skipped in {} export: another image already uses the name '{}'",
                    format,
                    image.stem()
                ))
                .with_image(&image.image_path),
            );
        }
    }
    targets
}

/// Find the image an imported file belongs to, if it has no boxes yet.
///
/// Matches on the relative path, then the file name, then the stem.
pub(crate) fn find_empty_target(
    project: &Project,
    name: Option<&str>,
    stem: &str,
) -> Option<String> {
    let found = name
        .and_then(|name| {
            project
                .image(name)
                .or_else(|| project.images().find(|i| i.file_name() == name))
        })
        .or_else(|| project.images().find(|i| i.stem() == stem))?;
    found.is_empty().then(|| found.image_path.clone())
}

/// Add imported boxes to an image, creating classes by name.
///
/// Boxes are clamped into the image; boxes that are empty afterwards are
/// dropped with a warning.
pub(crate) fn apply_boxes(
    project: &mut Project,
    image_path: &str,
    boxes: Vec<(String, Rect)>,
    result: &mut ImportResult,
) {
    let mut added = 0;
    for (class_name, rect) in boxes {
        let existed = project.class_by_name(class_name.trim()).is_some();
        let class_id = match project.get_or_create_class(&class_name) {
            Ok(id) => id,
            Err(e) => {
                result.warnings.push(
                    FormatWarning::warning(format!(
                        "Skipped box with class '{}': {}",
                        class_name, e
                    ))
                    .with_image(image_path),
                );
                continue;
            }
        };
        if !existed {
            result.classes_created += 1;
        }

        match project.add_box(image_path, rect, Some(class_id)) {
            Ok(_) => added += 1,
            Err(ModelError::InvalidGeometry { rect, .. }) => {
                result.warnings.push(
                    FormatWarning::warning(format!("Dropped empty box {:?}", rect))
                        .with_image(image_path),
                );
            }
            Err(e) => {
                result
                    .warnings
                    .push(FormatWarning::error(e.to_string()).with_image(image_path));
            }
        }
    }

    if added > 0 {
        log::debug!("Imported {} boxes into {}", added, image_path);
        result.images_updated += 1;
        result.boxes_imported += added;
    }
}
