//! Pascal VOC XML format implementation.
//!
//! Implements the Pascal Visual Object Classes (VOC) annotation format,
//! which uses one XML file per image under `voc/Annotations/`.

use std::io::Write;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::format::error::FormatError;
use crate::format::formats::{
    Label, apply_boxes, find_empty_target, per_image_targets, resolve_label,
};
use crate::format::traits::{
    AnnotationFormat, ExportOptions, FormatWarning, ImportResult, RenderedExport,
};
use crate::model::{ImageAnnotation, Project, Rect};

/// Directory of the XML files, relative to the exports directory.
pub const ANNOTATIONS_DIR: &str = "voc/Annotations";

/// Pascal VOC XML format.
///
/// Coordinates are written as integer pixels, rounded to nearest. A box
/// thinner than a pixel is widened outwards instead so it never collapses.
/// Images without boxes still get a file with no `object` entries.
pub struct PascalVocFormat;

impl AnnotationFormat for PascalVocFormat {
    fn id(&self) -> &'static str {
        "voc"
    }

    fn display_name(&self) -> &'static str {
        "Pascal VOC (XML)"
    }

    fn render(
        &self,
        project: &Project,
        options: &ExportOptions,
    ) -> Result<RenderedExport, FormatError> {
        let mut rendered = RenderedExport::new();
        let folder = project
            .root_folder()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");

        for image in per_image_targets(project, self.id(), &mut rendered.warnings) {
            let xml = self.build_xml(project, folder, image, options, &mut rendered)?;
            let path = Path::new(ANNOTATIONS_DIR).join(format!("{}.xml", image.stem()));
            rendered.files.insert(path, xml);
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
        let dir = exports_dir.join(ANNOTATIONS_DIR);
        if !dir.is_dir() {
            return Ok(result);
        }
        log::info!("Importing Pascal VOC annotations from {:?}", dir);

        let mut xml_files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "xml"))
            .collect();
        xml_files.sort();

        for xml_path in xml_files {
            let document = match std::fs::read_to_string(&xml_path)
                .map_err(FormatError::from)
                .and_then(|content| parse_xml(&content))
            {
                Ok(document) => document,
                Err(e) => {
                    log::warn!("Failed to parse {:?}: {}", xml_path, e);
                    result.warnings.push(
                        FormatWarning::warning(format!("Unreadable VOC file: {}", e))
                            .with_image(&xml_path),
                    );
                    continue;
                }
            };

            let stem = xml_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let Some(target) = find_empty_target(project, document.filename.as_deref(), stem)
            else {
                continue;
            };
            apply_boxes(project, &target, document.objects, &mut result);
        }

        log::info!(
            "Imported {} boxes into {} images from Pascal VOC",
            result.boxes_imported,
            result.images_updated
        );
        Ok(result)
    }
}

impl PascalVocFormat {
    /// Build XML content for an image.
    fn build_xml(
        &self,
        project: &Project,
        folder: &str,
        image: &ImageAnnotation,
        options: &ExportOptions,
        rendered: &mut RenderedExport,
    ) -> Result<String, FormatError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        // XML declaration
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| FormatError::Xml(e.into()))?;

        // <annotation>
        writer
            .write_event(Event::Start(BytesStart::new("annotation")))
            .map_err(|e| FormatError::Xml(e.into()))?;

        write_text_element(&mut writer, "folder", folder)?;
        write_text_element(&mut writer, "filename", image.file_name())?;

        // <source>
        writer
            .write_event(Event::Start(BytesStart::new("source")))
            .map_err(|e| FormatError::Xml(e.into()))?;
        write_text_element(&mut writer, "database", "boxlabel")?;
        writer
            .write_event(Event::End(BytesEnd::new("source")))
            .map_err(|e| FormatError::Xml(e.into()))?;

        // <size>
        writer
            .write_event(Event::Start(BytesStart::new("size")))
            .map_err(|e| FormatError::Xml(e.into()))?;
        write_text_element(&mut writer, "width", &image.width.to_string())?;
        write_text_element(&mut writer, "height", &image.height.to_string())?;
        write_text_element(&mut writer, "depth", "3")?;
        writer
            .write_event(Event::End(BytesEnd::new("size")))
            .map_err(|e| FormatError::Xml(e.into()))?;

        write_text_element(&mut writer, "segmented", "0")?;

        // <object> elements
        for bbox in image.boxes() {
            let Some(label) = resolve_label(project, image, bbox, options, &mut rendered.warnings)
            else {
                continue;
            };
            let name = match label {
                Label::Class { class, .. } => class.name.as_str(),
                Label::Placeholder(name) => name,
            };

            writer
                .write_event(Event::Start(BytesStart::new("object")))
                .map_err(|e| FormatError::Xml(e.into()))?;

            write_text_element(&mut writer, "name", name)?;
            write_text_element(&mut writer, "pose", "Unspecified")?;
            write_text_element(&mut writer, "truncated", "0")?;
            write_text_element(&mut writer, "difficult", "0")?;

            // <bndbox>
            writer
                .write_event(Event::Start(BytesStart::new("bndbox")))
                .map_err(|e| FormatError::Xml(e.into()))?;
            let (xmin, xmax) = pixel_span(bbox.rect.x_min, bbox.rect.x_max);
            let (ymin, ymax) = pixel_span(bbox.rect.y_min, bbox.rect.y_max);
            write_text_element(&mut writer, "xmin", &xmin.to_string())?;
            write_text_element(&mut writer, "ymin", &ymin.to_string())?;
            write_text_element(&mut writer, "xmax", &xmax.to_string())?;
            write_text_element(&mut writer, "ymax", &ymax.to_string())?;
            writer
                .write_event(Event::End(BytesEnd::new("bndbox")))
                .map_err(|e| FormatError::Xml(e.into()))?;

            writer
                .write_event(Event::End(BytesEnd::new("object")))
                .map_err(|e| FormatError::Xml(e.into()))?;

            rendered.annotations_exported += 1;
        }

        // </annotation>
        writer
            .write_event(Event::End(BytesEnd::new("annotation")))
            .map_err(|e| FormatError::Xml(e.into()))?;

        let mut result = writer.into_inner();
        result.push(b'\n');
        String::from_utf8(result).map_err(|_| FormatError::invalid_format("Invalid UTF-8 in XML"))
    }
}

/// Integer pixel bounds of `min..max`, rounded to nearest.
///
/// When rounding would make the span empty the bounds are taken outwards
/// (floor and ceil), which keeps `min < max` for any non-empty span.
fn pixel_span(min: f32, max: f32) -> (i64, i64) {
    let (lo, hi) = (min.round(), max.round());
    if lo < hi {
        (lo as i64, hi as i64)
    } else {
        (min.floor() as i64, max.ceil() as i64)
    }
}

/// Write a simple text element.
fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), FormatError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|e| FormatError::Xml(e.into()))?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| FormatError::Xml(e.into()))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| FormatError::Xml(e.into()))?;
    Ok(())
}

/// The parts of a VOC document the importer needs.
#[derive(Debug, Default)]
pub(crate) struct VocDocument {
    pub filename: Option<String>,
    pub objects: Vec<(String, Rect)>,
}

/// Parse a Pascal VOC XML document.
///
/// Objects missing a name or a complete `bndbox` are ignored.
pub(crate) fn parse_xml(content: &str) -> Result<VocDocument, FormatError> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut document = VocDocument::default();

    // Current parsing state
    let mut current_element = String::new();
    let mut in_object = false;
    let mut in_bndbox = false;
    let mut depth = 0usize;

    // Current object data
    let mut obj_name = String::new();
    let mut coords: [Option<f32>; 4] = [None; 4];

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "object" => {
                        in_object = true;
                        obj_name.clear();
                        coords = [None; 4];
                    }
                    "bndbox" => in_bndbox = true,
                    _ => {}
                }
                current_element = name;
            }
            Ok(Event::End(ref e)) => {
                depth = depth.saturating_sub(1);
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "object" => {
                        if let ([Some(x_min), Some(y_min), Some(x_max), Some(y_max)], false) =
                            (coords, obj_name.is_empty())
                        {
                            document
                                .objects
                                .push((obj_name.clone(), Rect::new(x_min, y_min, x_max, y_max)));
                        }
                        in_object = false;
                    }
                    "bndbox" => in_bndbox = false,
                    _ => {}
                }
                current_element.clear();
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();

                if in_object {
                    if in_bndbox {
                        let slot = match current_element.as_str() {
                            "xmin" => Some(0),
                            "ymin" => Some(1),
                            "xmax" => Some(2),
                            "ymax" => Some(3),
                            _ => None,
                        };
                        if let Some(slot) = slot {
                            coords[slot] = text.trim().parse().ok();
                        }
                    } else if current_element == "name" {
                        obj_name = text;
                    }
                } else if current_element == "filename" && depth == 2 {
                    document.filename = Some(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FormatError::Xml(e));
            }
            _ => {}
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_span_rounds_to_nearest() {
        assert_eq!(pixel_span(100.0, 300.0), (100, 300));
        assert_eq!(pixel_span(10.4, 99.6), (10, 100));
    }

    #[test]
    fn test_pixel_span_never_collapses() {
        assert_eq!(pixel_span(10.2, 10.4), (10, 11));
        assert_eq!(pixel_span(10.6, 10.9), (10, 11));
        // Rounds to the same pixel from both sides
        assert_eq!(pixel_span(9.6, 10.4), (9, 11));
        assert_eq!(pixel_span(0.0, 0.3), (0, 1));
    }

    #[test]
    fn test_parse_ignores_incomplete_objects() {
        let xml = r#"<annotation>
            <filename>a.jpg</filename>
            <object><name>cat</name><bndbox><xmin>1</xmin><ymin>2</ymin><xmax>3</xmax></bndbox></object>
            <object><bndbox><xmin>1</xmin><ymin>2</ymin><xmax>3</xmax><ymax>4</ymax></bndbox></object>
            <object><name>dog</name><bndbox><xmin>1.5</xmin><ymin>2</ymin><xmax>30</xmax><ymax>40</ymax></bndbox></object>
        </annotation>"#;
        let document = parse_xml(xml).unwrap();
        assert_eq!(document.filename.as_deref(), Some("a.jpg"));
        assert_eq!(
            document.objects,
            vec![("dog".to_string(), Rect::new(1.5, 2.0, 30.0, 40.0))]
        );
    }

    #[test]
    fn test_format_metadata() {
        let format = PascalVocFormat;
        assert_eq!(format.id(), "voc");
    }
}
