use crate::models::{Document, META_FILE_PATH, META_PAGE, META_SOURCE, META_TOTAL_PAGES};
use crate::IngestError;
use lopdf::{Document as PdfDocument, Object};
use std::path::Path;
use tracing::{debug, warn};

const INFO_KEYS: [&str; 6] = ["Title", "Author", "Subject", "Keywords", "Creator", "Producer"];

pub trait PdfLoader {
    /// Returns one [`Document`] per page, in page order.
    fn load(&self, path: &Path) -> Result<Vec<Document>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfLoader;

impl PdfLoader for LopdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
        let load_error = |reason: String| IngestError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let pdf = PdfDocument::load(path).map_err(|error| load_error(error.to_string()))?;
        let pages = pdf.get_pages();
        let total_pages = pages.len();
        let info = info_entries(&pdf);
        let path_text = path.to_string_lossy().to_string();

        let mut documents = Vec::with_capacity(total_pages);
        for (index, page_no) in pages.keys().enumerate() {
            let text = pdf
                .extract_text(&[*page_no])
                .map_err(|error| load_error(format!("page {page_no}: {error}")))?;

            let mut document = Document::new(text)
                .with_metadata(META_SOURCE, path_text.clone())
                .with_metadata(META_FILE_PATH, path_text.clone())
                .with_metadata(META_PAGE, index as u64)
                .with_metadata(META_TOTAL_PAGES, total_pages as u64);
            for (key, value) in &info {
                document = document.with_metadata(key.clone(), value.clone());
            }
            documents.push(document);
        }

        if documents.iter().all(|document| document.text.trim().is_empty()) {
            warn!(path = %path.display(), pages = total_pages, "pdf has no extractable text");
        }
        debug!(path = %path.display(), pages = total_pages, "loaded pdf");

        Ok(documents)
    }
}

pub fn load_pdf(path: &Path) -> Result<Vec<Document>, IngestError> {
    LopdfLoader.load(path)
}

fn info_entries(pdf: &PdfDocument) -> Vec<(String, String)> {
    let info = match pdf.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => pdf.get_object(*id).ok(),
        Ok(object) => Some(object),
        Err(_) => None,
    };
    let Some(dictionary) = info.and_then(|object| object.as_dict().ok()) else {
        return Vec::new();
    };

    INFO_KEYS
        .iter()
        .filter_map(|key| match dictionary.get(key.as_bytes()) {
            Ok(Object::String(bytes, _)) => {
                let value = decode_pdf_string(bytes);
                let value = value.trim();
                if value.is_empty() {
                    None
                } else {
                    Some((key.to_lowercase(), value.to_string()))
                }
            }
            _ => None,
        })
        .collect()
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};
    use tempfile::tempdir;

    /// Writes a minimal PDF with one Courier text line per page.
    pub(crate) fn write_sample_pdf(
        path: &Path,
        pages: &[&str],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut pdf = PdfDocument::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font_id = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = pdf.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = pdf.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = pdf.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = pdf.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = pdf.add_object(dictionary! {
            "Title" => Object::string_literal("Pump Manual"),
        });
        pdf.trailer.set("Root", catalog_id);
        pdf.trailer.set("Info", info_id);
        pdf.save(path)?;
        Ok(())
    }

    #[test]
    fn loads_one_document_per_page_with_page_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("manual.pdf");
        write_sample_pdf(&path, &["Hydraulic pump overview", "Maintenance schedule"])?;

        let documents = load_pdf(&path)?;

        assert_eq!(documents.len(), 2);
        assert!(documents[0].text.contains("Hydraulic"));
        assert!(documents[1].text.contains("Maintenance"));
        assert_eq!(documents[0].page(), Some(0));
        assert_eq!(documents[1].page(), Some(1));
        let source = path.to_string_lossy().to_string();
        assert_eq!(
            documents[1].metadata.get(META_SOURCE).and_then(|v| v.as_str()),
            Some(source.as_str())
        );
        assert_eq!(
            documents[0].metadata.get(META_TOTAL_PAGES).and_then(|v| v.as_u64()),
            Some(2)
        );
        assert_eq!(
            documents[0].metadata.get("title").and_then(|v| v.as_str()),
            Some("Pump Manual")
        );
        Ok(())
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let result = load_pdf(Path::new("/definitely/not/here.pdf"));
        assert!(matches!(result, Err(IngestError::Load { .. })));
    }

    #[test]
    fn garbage_bytes_are_a_load_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf at all")?;

        let result = load_pdf(&path);
        assert!(matches!(result, Err(IngestError::Load { .. })));
        Ok(())
    }

    #[test]
    fn utf16_info_strings_are_decoded() {
        let bytes = [0xFE, 0xFF, 0x00, 0x50, 0x00, 0x75, 0x00, 0x6D, 0x00, 0x70];
        assert_eq!(decode_pdf_string(&bytes), "Pump");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
    }
}
