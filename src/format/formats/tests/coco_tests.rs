//! Tests for the COCO format.

use serde_json::Value;

use super::{cat_project, mixed_project};
use crate::format::formats::CocoFormat;
use crate::format::traits::{AnnotationFormat, ExportOptions};
use crate::model::{ImageAnnotation, Project};

fn render_json(project: &Project, options: &ExportOptions) -> Value {
    let rendered = CocoFormat.render(project, options).unwrap();
    serde_json::from_str(rendered.file("coco/annotations.json").unwrap()).unwrap()
}

#[test]
fn test_coco_format_metadata() {
    let format = CocoFormat;

    assert_eq!(format.id(), "coco");
    assert_eq!(format.display_name(), "COCO (JSON)");
}

#[test]
fn test_coco_cat_scenario() {
    let json = render_json(&cat_project(), &ExportOptions::default());

    assert_eq!(json["images"][0]["id"], 1);
    assert_eq!(json["images"][0]["file_name"], "cat.jpg");
    assert_eq!(json["images"][0]["width"], 800);
    assert_eq!(json["images"][0]["height"], 600);

    let ann = &json["annotations"][0];
    assert_eq!(ann["id"], 1);
    assert_eq!(ann["image_id"], 1);
    assert_eq!(ann["category_id"], 0);
    assert_eq!(ann["bbox"], serde_json::json!([100.0, 100.0, 200.0, 300.0]));
    assert_eq!(ann["area"], 60000.0);
    assert_eq!(ann["iscrowd"], 0);

    assert_eq!(
        json["categories"],
        serde_json::json!([{"id": 0, "name": "cat", "supercategory": "none"}])
    );
    assert!(json["info"].is_object());
    assert!(json["licenses"].as_array().unwrap().is_empty());
}

#[test]
fn test_coco_empty_project() {
    let mut project = Project::new("/data/empty");
    project.insert_image(ImageAnnotation::new("one.jpg", 10, 10));
    project.insert_image(ImageAnnotation::new("two.jpg", 20, 20));

    let json = render_json(&project, &ExportOptions::default());
    assert_eq!(json["annotations"], serde_json::json!([]));
    assert_eq!(json["categories"], serde_json::json!([]));
    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0]["id"], 1);
    assert_eq!(images[1]["id"], 2);
}

#[test]
fn test_coco_annotation_ids_unique_across_project() {
    let json = render_json(&mixed_project(), &ExportOptions::default());

    let annotations = json["annotations"].as_array().unwrap();
    let ids: Vec<u64> = annotations.iter().map(|a| a["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let image_ids: Vec<u64> = annotations
        .iter()
        .map(|a| a["image_id"].as_u64().unwrap())
        .collect();
    assert_eq!(image_ids, vec![1, 1, 2]);

    // Empty image still listed
    assert_eq!(json["images"].as_array().unwrap().len(), 3);
    assert_eq!(json["images"][2]["file_name"], "empty.png");
}

#[test]
fn test_coco_placeholder_category() {
    let mut project = mixed_project();
    // Gap in ids: placeholder goes after the largest
    let extra = project.add_class("truck").unwrap();
    project.remove_class(extra, false).unwrap();
    project.add_class("bus").unwrap();

    let json = render_json(&project, &ExportOptions::new().placeholder("unlabeled"));
    let categories = json["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 5);
    assert_eq!(categories[4]["id"], 5);
    assert_eq!(categories[4]["name"], "unlabeled");

    let annotations = json["annotations"].as_array().unwrap();
    assert_eq!(annotations.len(), 4);
    assert_eq!(annotations[2]["category_id"], 5);
}

#[test]
fn test_coco_placeholder_matching_a_class_reuses_it() {
    let project = mixed_project();
    let car = project.class_by_name("car").unwrap().id;

    let json = render_json(&project, &ExportOptions::new().placeholder("car"));
    let categories = json["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 3);
    let cars = categories.iter().filter(|c| c["name"] == "car").count();
    assert_eq!(cars, 1);

    let annotations = json["annotations"].as_array().unwrap();
    assert_eq!(annotations.len(), 4);
    assert_eq!(annotations[2]["category_id"], car);
}

#[test]
fn test_coco_skip_unlabeled() {
    let rendered = CocoFormat
        .render(&mixed_project(), &ExportOptions::default())
        .unwrap();
    assert_eq!(rendered.annotations_exported, 3);
    assert_eq!(rendered.warnings.len(), 1);
}

#[test]
fn test_coco_nested_paths_kept() {
    let mut project = cat_project();
    project.insert_image(ImageAnnotation::new("train/dog.jpg", 50, 50));
    let json = render_json(&project, &ExportOptions::default());
    assert_eq!(json["images"][1]["file_name"], "train/dog.jpg");
}
