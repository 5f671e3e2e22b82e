//! Office Open XML container extraction. Word and Excel files are ZIP
//! archives; text lives in well-known XML entries and embedded media under
//! `media/` directories. The archive handle is scoped to this module, so
//! callers only ever see the collected text and image bytes.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::error::ProcessError;

const WORD_DOCUMENT_ENTRY: &str = "word/document.xml";
const EXCEL_SHARED_STRINGS_ENTRY: &str = "xl/sharedStrings.xml";

/// Raster formats worth sending to image analysis. Vector art and metafiles
/// embedded by Office are skipped.
const IMAGE_EXTENSIONS: [(&str, &str); 6] = [
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
];

/// Which container layout to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeKind {
    Word,
    Excel,
}

impl OfficeKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(OfficeKind::Word)
            }
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(OfficeKind::Excel)
            }
            _ => None,
        }
    }

    fn text_entry(&self) -> &'static str {
        match self {
            OfficeKind::Word => WORD_DOCUMENT_ENTRY,
            OfficeKind::Excel => EXCEL_SHARED_STRINGS_ENTRY,
        }
    }
}

/// An image lifted out of the container, ready for visual analysis.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Everything extracted from one container in a single pass.
#[derive(Debug, Clone, Default)]
pub struct OfficeContent {
    pub text: String,
    pub images: Vec<EmbeddedImage>,
}

/// Opens the container, pulls the document text and every embedded raster
/// image, and closes the archive before returning.
pub fn extract_container(path: &Path, kind: OfficeKind) -> Result<OfficeContent, ProcessError> {
    let file = std::fs::File::open(path).map_err(|source| ProcessError::ReadDocument {
        path: path.to_path_buf(),
        source,
    })?;

    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ProcessError::OfficeProcessing(format!("failed to open container: {e}")))?;

    let text = extract_entry_text(&mut archive, kind)?;
    let images = collect_embedded_images(&mut archive);

    debug!(
        text_chars = text.chars().count(),
        images = images.len(),
        "office container extracted"
    );
    Ok(OfficeContent { text, images })
}

fn extract_entry_text<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    kind: OfficeKind,
) -> Result<String, ProcessError> {
    let entry = kind.text_entry();
    let mut xml_content = String::new();
    match archive.by_name(entry) {
        Ok(mut file) => {
            file.read_to_string(&mut xml_content).map_err(|e| {
                ProcessError::OfficeProcessing(format!("failed to read {entry}: {e}"))
            })?;
        }
        // A spreadsheet with no inline strings simply has no sharedStrings
        // part; that is empty text, not a corrupt file.
        Err(_) if kind == OfficeKind::Excel => return Ok(String::new()),
        Err(e) => {
            return Err(ProcessError::OfficeProcessing(format!(
                "container is missing {entry}: {e}"
            )));
        }
    }

    match kind {
        OfficeKind::Word => parse_word_xml(&xml_content),
        OfficeKind::Excel => parse_shared_strings(&xml_content),
    }
}

/// Text runs live in `<w:t>` elements; paragraph ends become newlines.
fn parse_word_xml(xml: &str) -> Result<String, ProcessError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut text = String::new();
    let mut in_text_element = false;
    let mut in_paragraph = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = true,
                b"p" => in_paragraph = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => {
                    if in_paragraph {
                        text.push('\n');
                        in_paragraph = false;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let decoded = e.unescape().unwrap_or_default();
                    text.push_str(&decoded);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessError::OfficeProcessing(format!(
                    "XML parsing error: {e}"
                )));
            }
            _ => {}
        }
    }

    Ok(text.trim().to_string())
}

/// Shared strings are `<t>` elements inside `<si>` items, one cell value per
/// item.
fn parse_shared_strings(xml: &str) -> Result<String, ProcessError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut values: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = true,
                b"si" => current.clear(),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"si" => {
                    if !current.trim().is_empty() {
                        values.push(current.trim().to_string());
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let decoded = e.unescape().unwrap_or_default();
                    current.push_str(&decoded);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessError::OfficeProcessing(format!(
                    "XML parsing error: {e}"
                )));
            }
            _ => {}
        }
    }

    Ok(values.join("\n"))
}

/// Collects every raster image under a `media/` directory. Unreadable
/// entries are skipped rather than failing the whole document.
fn collect_embedded_images<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Vec<EmbeddedImage> {
    let names: Vec<String> = archive
        .file_names()
        .filter(|name| name.contains("media/"))
        .map(str::to_string)
        .collect();

    let mut images = Vec::new();
    for name in names {
        let Some(media_type) = raster_media_type(&name) else {
            continue;
        };
        let mut data = Vec::new();
        match archive.by_name(&name) {
            Ok(mut entry) => {
                if entry.read_to_end(&mut data).is_err() {
                    debug!(entry = %name, "skipping unreadable embedded image");
                    continue;
                }
            }
            Err(_) => continue,
        }
        if data.is_empty() {
            continue;
        }
        images.push(EmbeddedImage {
            name,
            media_type: media_type.to_string(),
            data,
        });
    }
    images
}

fn raster_media_type(name: &str) -> Option<&'static str> {
    let extension = name.rsplit('.').next()?.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, media_type)| *media_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            for (name, data) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    fn write_archive(dir: &Path, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
        let path = dir.join("container.bin");
        std::fs::write(&path, build_archive(entries)).unwrap();
        path
    }

    #[test]
    fn test_parse_word_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
            <w:body>
                <w:p><w:r><w:t>First paragraph</w:t></w:r></w:p>
                <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
            </w:body>
        </w:document>"#;

        let text = parse_word_xml(xml).unwrap();
        assert_eq!(text, "First paragraph\nSecond paragraph");
    }

    #[test]
    fn test_parse_shared_strings() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
            <si><t>Invoice</t></si>
            <si><t xml:space="preserve">Total due</t></si>
            <si><t></t></si>
        </sst>"#;

        let text = parse_shared_strings(xml).unwrap();
        assert_eq!(text, "Invoice\nTotal due");
    }

    #[test]
    fn test_extract_word_container_with_images() {
        let dir = tempfile::tempdir().unwrap();
        let document_xml = br#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>Body text</w:t></w:r></w:p></w:body></w:document>"#;
        let path = write_archive(
            dir.path(),
            &[
                ("word/document.xml", document_xml.as_slice()),
                ("word/media/image1.png", &[1u8, 2, 3, 4]),
                ("word/media/drawing1.emf", &[9u8, 9]),
            ],
        );

        let content = extract_container(&path, OfficeKind::Word).unwrap();
        assert_eq!(content.text, "Body text");
        assert_eq!(content.images.len(), 1);
        assert_eq!(content.images[0].media_type, "image/png");
        assert_eq!(content.images[0].data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_excel_without_shared_strings_is_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), &[("xl/workbook.xml", b"<workbook/>".as_slice())]);

        let content = extract_container(&path, OfficeKind::Excel).unwrap();
        assert!(content.text.is_empty());
        assert!(content.images.is_empty());
    }

    #[test]
    fn test_not_a_zip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.docx");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let err = extract_container(&path, OfficeKind::Word).unwrap_err();
        assert!(matches!(err, ProcessError::OfficeProcessing(_)));
    }

    #[test]
    fn test_word_missing_document_xml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), &[("word/styles.xml", b"<styles/>".as_slice())]);

        let err = extract_container(&path, OfficeKind::Word).unwrap_err();
        assert!(matches!(err, ProcessError::OfficeProcessing(_)));
    }
}
