//! Export then import tests, and exports of loaded projects.

use super::{cat_project, mixed_project};
use crate::format::formats::{CocoFormat, PascalVocFormat, YoloFormat};
use crate::format::project::ProjectDocument;
use crate::format::traits::{AnnotationFormat, ExportOptions};
use crate::model::{ImageAnnotation, Project, Rect};

/// Same images as `source`, no classes and no boxes.
fn blank_copy(source: &Project) -> Project {
    let mut project = Project::new(source.root_folder());
    for image in source.images() {
        project.insert_image(ImageAnnotation::new(&image.image_path, image.width, image.height));
    }
    project
}

/// (class name, rect) of every box, in image then box order.
fn named_boxes(project: &Project) -> Vec<(String, String, Rect)> {
    project
        .images()
        .flat_map(|image| {
            image.boxes().iter().map(move |b| {
                let name = project
                    .resolve_class(b.class_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_default();
                (image.image_path.clone(), name, b.rect)
            })
        })
        .collect()
}

fn assert_close(a: &[(String, String, Rect)], b: &[(String, String, Rect)], tolerance: f32) {
    assert_eq!(a.len(), b.len());
    for ((ia, na, ra), (ib, nb, rb)) in a.iter().zip(b) {
        assert_eq!(ia, ib);
        assert_eq!(na, nb);
        for (x, y) in [
            (ra.x_min, rb.x_min),
            (ra.y_min, rb.y_min),
            (ra.x_max, rb.x_max),
            (ra.y_max, rb.y_max),
        ] {
            assert!((x - y).abs() <= tolerance, "{ra:?} vs {rb:?}");
        }
    }
}

fn round_trip(format: &dyn AnnotationFormat, source: &Project) -> Project {
    let dir = tempfile::tempdir().unwrap();
    format
        .export(source, dir.path(), &ExportOptions::default())
        .unwrap();

    let mut imported = blank_copy(source);
    let result = format.import(&mut imported, dir.path()).unwrap();
    assert_eq!(result.format, format.id());
    imported
}

/// Labeled boxes only, since unlabeled ones are skipped on export.
fn labeled(project: &Project) -> Vec<(String, String, Rect)> {
    named_boxes(project)
        .into_iter()
        .filter(|(_, name, _)| !name.is_empty())
        .collect()
}

#[test]
fn test_coco_round_trip() {
    let source = mixed_project();
    let imported = round_trip(&CocoFormat, &source);
    assert_close(&labeled(&imported), &labeled(&source), 1e-3);
}

#[test]
fn test_voc_round_trip_integer_pixels() {
    let source = mixed_project();
    let imported = round_trip(&PascalVocFormat, &source);
    assert_close(&labeled(&imported), &labeled(&source), 0.5);
}

#[test]
fn test_yolo_round_trip_within_precision() {
    let source = mixed_project();
    let imported = round_trip(&YoloFormat, &source);
    assert_close(&labeled(&imported), &labeled(&source), 1e-2);
}

#[test]
fn test_import_only_fills_empty_images() {
    let source = cat_project();
    let dir = tempfile::tempdir().unwrap();
    PascalVocFormat
        .export(&source, dir.path(), &ExportOptions::default())
        .unwrap();

    let mut target = blank_copy(&source);
    target
        .add_box("cat.jpg", Rect::new(1.0, 1.0, 2.0, 2.0), None)
        .unwrap();
    let result = PascalVocFormat.import(&mut target, dir.path()).unwrap();
    assert!(result.is_empty());
    assert_eq!(target.image("cat.jpg").unwrap().len(), 1);
    assert!(target.classes().is_empty());
}

#[test]
fn test_import_reuses_classes_by_name() {
    let source = mixed_project();
    let dir = tempfile::tempdir().unwrap();
    CocoFormat
        .export(&source, dir.path(), &ExportOptions::default())
        .unwrap();

    let mut target = blank_copy(&source);
    let car = target.add_class("car").unwrap();
    let result = CocoFormat.import(&mut target, dir.path()).unwrap();

    assert_eq!(result.classes_created, 2);
    assert_eq!(target.classes().len(), 3);
    assert_eq!(target.class_by_name("car").unwrap().id, car);
    assert_eq!(result.images_updated, 2);
    assert_eq!(result.boxes_imported, 3);
}

#[test]
fn test_yolo_import_unknown_index_gets_generic_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("yolo/labels")).unwrap();
    std::fs::write(dir.path().join("yolo/classes.txt"), "cat\n").unwrap();
    std::fs::write(
        dir.path().join("yolo/labels/cat.txt"),
        "0 0.25 0.416667 0.25 0.5\n4 0.5 0.5 0.1 0.1\nnot a line\n",
    )
    .unwrap();

    let mut target = blank_copy(&cat_project());
    let result = YoloFormat.import(&mut target, dir.path()).unwrap();
    assert_eq!(result.boxes_imported, 2);
    assert_eq!(result.warnings.len(), 1);
    assert!(target.class_by_name("cat").is_some());
    assert!(target.class_by_name("class_4").is_some());

    let image = target.image("cat.jpg").unwrap();
    let rect = image.boxes()[0].rect;
    assert!((rect.x_min - 100.0).abs() < 1e-2);
    assert!((rect.y_max - 400.0).abs() < 1e-2);
}

#[test]
fn test_dangling_class_on_load_is_skipped_in_export() {
    let mut document = ProjectDocument::from_project(&cat_project());
    document.images[0].boxes[0].class_id = Some(42);

    let (project, warnings) = document.into_project().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(project.image("cat.jpg").unwrap().boxes()[0].class_id, None);

    let rendered = YoloFormat
        .render(&project, &ExportOptions::default())
        .unwrap();
    assert_eq!(rendered.file("yolo/labels/cat.txt"), Some(""));
    assert_eq!(rendered.warnings.len(), 1);
}
