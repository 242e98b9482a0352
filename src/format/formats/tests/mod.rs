//! Unit tests for export format implementations.
//!
//! These tests check the rendered output of each format against known
//! values, and that every format can read its own output back.

mod coco_tests;
mod roundtrip_tests;

use crate::model::{ImageAnnotation, Project, Rect};

/// One 800x600 image with one `cat` box at (100,100)-(300,400).
pub(super) fn cat_project() -> Project {
    let mut project = Project::new("/data/pets");
    project.insert_image(ImageAnnotation::new("cat.jpg", 800, 600));
    let cat = project.add_class("cat").unwrap();
    project
        .add_box("cat.jpg", Rect::new(100.0, 100.0, 300.0, 400.0), Some(cat))
        .unwrap();
    project
}

/// Three classes, three images (one empty), labeled and unlabeled boxes.
pub(super) fn mixed_project() -> Project {
    let mut project = Project::new("/data/street");
    project.insert_image(ImageAnnotation::new("a.jpg", 640, 480));
    project.insert_image(ImageAnnotation::new("b.jpg", 1920, 1080));
    project.insert_image(ImageAnnotation::new("empty.png", 100, 100));

    let person = project.add_class("person").unwrap();
    let car = project.add_class("car").unwrap();
    let bike = project.add_class("bicycle").unwrap();

    project
        .add_box("a.jpg", Rect::new(100.0, 120.0, 180.0, 320.0), Some(person))
        .unwrap();
    project
        .add_box("a.jpg", Rect::new(300.0, 200.0, 450.0, 300.0), Some(car))
        .unwrap();
    project
        .add_box("a.jpg", Rect::new(10.0, 10.0, 20.0, 20.0), None)
        .unwrap();
    project
        .add_box("b.jpg", Rect::new(12.5, 33.3, 777.7, 1000.1), Some(bike))
        .unwrap();
    project
}
