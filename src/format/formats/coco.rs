//! COCO JSON format implementation.
//!
//! Implements the COCO (Common Objects in Context) annotation format, a
//! single JSON document for the whole project at `coco/annotations.json`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::format::error::FormatError;
use crate::format::formats::{
    Label, apply_boxes, extra_placeholder, find_empty_target, resolve_label,
};
use crate::format::traits::{
    AnnotationFormat, ExportOptions, FormatWarning, ImportResult, RenderedExport,
};
use crate::model::{Project, Rect};

/// The JSON document, relative to the exports directory.
pub const ANNOTATIONS_FILE: &str = "coco/annotations.json";

/// COCO JSON format.
///
/// Image ids run 1..N in project order and annotation ids 1..M across the
/// whole project. Every image gets an entry, annotated or not.
pub struct CocoFormat;

impl AnnotationFormat for CocoFormat {
    fn id(&self) -> &'static str {
        "coco"
    }

    fn display_name(&self) -> &'static str {
        "COCO (JSON)"
    }

    fn render(
        &self,
        project: &Project,
        options: &ExportOptions,
    ) -> Result<RenderedExport, FormatError> {
        let mut rendered = RenderedExport::new();
        let mut coco = CocoDataset::new(project);

        // Convert categories
        for class in project.classes() {
            coco.categories.push(CocoCategory {
                id: class.id,
                name: class.name.clone(),
                supercategory: "none".into(),
            });
        }
        let placeholder_id = project.classes().iter().map(|c| c.id + 1).max().unwrap_or(0);
        if let Some(name) = extra_placeholder(project, options) {
            coco.categories.push(CocoCategory {
                id: placeholder_id,
                name: name.to_string(),
                supercategory: "none".into(),
            });
        }

        // Convert images and annotations
        let mut annotation_id = 1u64;
        for (image_id, image) in (1u64..).zip(project.images()) {
            coco.images.push(CocoImage {
                id: image_id,
                file_name: image.image_path.clone(),
                width: image.width,
                height: image.height,
            });

            for bbox in image.boxes() {
                let Some(label) =
                    resolve_label(project, image, bbox, options, &mut rendered.warnings)
                else {
                    continue;
                };
                let category_id = match label {
                    Label::Class { class, .. } => class.id,
                    Label::Placeholder(_) => placeholder_id,
                };

                let rect = bbox.rect;
                coco.annotations.push(CocoAnnotation {
                    id: annotation_id,
                    image_id,
                    category_id,
                    bbox: [rect.x_min, rect.y_min, rect.width(), rect.height()],
                    area: rect.area(),
                    segmentation: Vec::new(),
                    iscrowd: 0,
                });
                annotation_id += 1;
            }
        }

        rendered.images_exported = coco.images.len();
        rendered.annotations_exported = coco.annotations.len();

        let mut json = serde_json::to_string_pretty(&coco)?;
        json.push('\n');
        rendered.files.insert(PathBuf::from(ANNOTATIONS_FILE), json);
        Ok(rendered)
    }

    fn import(
        &self,
        project: &mut Project,
        exports_dir: &Path,
    ) -> Result<ImportResult, FormatError> {
        let mut result = ImportResult::new(self.id());
        let path = exports_dir.join(ANNOTATIONS_FILE);
        if !path.is_file() {
            return Ok(result);
        }
        log::info!("Importing COCO annotations from {:?}", path);

        let json = std::fs::read_to_string(&path)?;
        let coco: CocoDataset = serde_json::from_str(&json)?;

        let category_names: HashMap<u32, &str> = coco
            .categories
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .collect();

        // Group boxes by image, keeping annotation order
        let mut by_image: BTreeMap<u64, Vec<(String, Rect)>> = BTreeMap::new();
        for ann in &coco.annotations {
            let Some(name) = category_names.get(&ann.category_id) else {
                result.warnings.push(FormatWarning::warning(format!(
                    "Annotation {} references unknown category {}",
                    ann.id, ann.category_id
                )));
                continue;
            };
            let [x, y, w, h] = ann.bbox;
            by_image
                .entry(ann.image_id)
                .or_default()
                .push((name.to_string(), Rect::from_xywh(x, y, w, h)));
        }

        for image in &coco.images {
            let Some(boxes) = by_image.remove(&image.id) else {
                continue;
            };
            let stem = Path::new(&image.file_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&image.file_name);
            let Some(target) = find_empty_target(project, Some(&image.file_name), stem) else {
                continue;
            };
            apply_boxes(project, &target, boxes, &mut result);
        }

        log::info!(
            "Imported {} boxes into {} images from COCO",
            result.boxes_imported,
            result.images_updated
        );
        Ok(result)
    }
}

// COCO format structures

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CocoDataset {
    #[serde(default)]
    pub info: CocoInfo,
    #[serde(default)]
    pub licenses: Vec<CocoLicense>,
    pub images: Vec<CocoImage>,
    pub annotations: Vec<CocoAnnotation>,
    pub categories: Vec<CocoCategory>,
}

impl CocoDataset {
    fn new(project: &Project) -> Self {
        Self {
            info: CocoInfo {
                description: "boxlabel export".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                date_created: project
                    .metadata
                    .modified_at
                    .clone()
                    .or_else(|| project.metadata.created_at.clone())
                    .unwrap_or_default(),
            },
            licenses: Vec::new(),
            images: Vec::new(),
            annotations: Vec::new(),
            categories: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct CocoInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub date_created: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CocoLicense {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CocoImage {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CocoAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u32,
    pub bbox: [f32; 4],
    pub area: f32,
    #[serde(default)]
    pub segmentation: Vec<Vec<f32>>,
    #[serde(default)]
    pub iscrowd: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CocoCategory {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub supercategory: String,
}
