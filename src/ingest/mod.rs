//! Submission ingestion: turning uploaded bytes into plain text and bounding it
//! before it is handed to a prompt.

mod bounds;

pub use bounds::bound_text;

use std::io::{Cursor, Read};

use quick_xml::{Reader as XmlReader, events::Event};
use thiserror::Error;
use zip::ZipArchive;

/// Reasons a submission could not be turned into usable text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Error reading PDF: {0}")]
    Pdf(String),

    #[error("Error reading DOCX: {0}")]
    Docx(String),

    #[error("File must be PDF, DOCX or text-based (UTF-8 encoded)")]
    NotText,

    #[error("No text could be extracted")]
    Empty,
}

/// Document formats recognised by extension; everything else is read as UTF-8.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Self {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => DocumentKind::Pdf,
            "docx" => DocumentKind::Docx,
            _ => DocumentKind::Text,
        }
    }

    /// Binary formats need a parser pass, which is CPU-bound.
    pub fn is_binary(&self) -> bool {
        !matches!(self, DocumentKind::Text)
    }
}

/// Plain text taken from a submission. Never empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText(String);

impl ExtractedText {
    /// Wraps text that arrived directly in a request body.
    pub fn from_text(text: &str) -> Result<Self, ExtractionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Converts an uploaded file into plain text, dispatching on its extension.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<ExtractedText, ExtractionError> {
    let raw = match DocumentKind::from_filename(filename) {
        DocumentKind::Pdf => extract_pdf_text(bytes)?,
        DocumentKind::Docx => extract_docx_text(bytes)?,
        DocumentKind::Text => std::str::from_utf8(bytes)
            .map_err(|_| ExtractionError::NotText)?
            .to_string(),
    };

    ExtractedText::from_text(&raw)
}

/// Runs [`extract_text`] on the blocking pool when the format needs parsing.
pub async fn extract_text_blocking(
    bytes: Vec<u8>,
    filename: String,
) -> Result<ExtractedText, ExtractionError> {
    let kind = DocumentKind::from_filename(&filename);
    if !kind.is_binary() {
        return extract_text(&bytes, &filename);
    }

    tokio::task::spawn_blocking(move || extract_text(&bytes, &filename))
        .await
        .map_err(|err| {
            let message = format!("extraction task failed: {err}");
            match kind {
                DocumentKind::Docx => ExtractionError::Docx(message),
                _ => ExtractionError::Pdf(message),
            }
        })?
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|err| ExtractionError::Pdf(err.to_string()))?;

    Ok(join_pages(pages))
}

// Pages without a text layer come back empty and still get their separator.
fn join_pages(pages: Vec<String>) -> String {
    let mut output = String::new();
    for page in pages {
        output.push_str(&page);
        output.push('\n');
    }
    output
}

fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ExtractionError::Docx(format!("not a DOCX archive: {err}")))?;

    let mut document = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractionError::Docx("missing word/document.xml".to_string()))?;

    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .map_err(|err| ExtractionError::Docx(format!("failed to read document XML: {err}")))?;

    let mut reader = XmlReader::from_str(&xml);
    let mut buf = Vec::new();
    let mut output = String::new();
    let mut in_text_node = false;
    // `w:tab` inside `w:tabs` defines a tab stop, not a tab character.
    let mut in_tab_stops = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => {
                    if !output.is_empty() {
                        output.push('\n');
                    }
                }
                b"w:tabs" => in_tab_stops = true,
                b"w:tab" if !in_tab_stops => output.push('\t'),
                b"w:br" => output.push('\n'),
                b"w:t" => in_text_node = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" if !in_tab_stops => output.push('\t'),
                b"w:br" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let value = e
                        .unescape()
                        .map_err(|err| ExtractionError::Docx(err.to_string()))?;
                    output.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = false,
                b"w:tabs" => in_tab_stops = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(ExtractionError::Docx(format!(
                    "failed to parse document XML: {err}"
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_docx(xml: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", SimpleFileOptions::default())
            .expect("zip start file");
        zip.write_all(xml.as_bytes()).expect("write xml");
        zip.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn kind_is_chosen_by_extension_case_insensitively() {
        assert_eq!(DocumentKind::from_filename("essay.PDF"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_filename("a.b.docx"), DocumentKind::Docx);
        assert_eq!(DocumentKind::from_filename("notes.md"), DocumentKind::Text);
        assert_eq!(DocumentKind::from_filename("README"), DocumentKind::Text);
    }

    #[test]
    fn utf8_text_is_trimmed() {
        let text = extract_text("  hello world \n".as_bytes(), "essay.txt").unwrap();
        assert_eq!(text.as_str(), "hello world");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = extract_text(&[0xff, 0xfe, 0x00, 0x80], "essay.txt").unwrap_err();
        assert!(matches!(err, ExtractionError::NotText));
    }

    #[test]
    fn whitespace_only_is_rejected() {
        let err = extract_text(b" \n\t ", "essay.txt").unwrap_err();
        assert!(matches!(err, ExtractionError::Empty));
    }

    #[test]
    fn garbage_pdf_is_an_extraction_error() {
        let err = extract_text(b"definitely not a pdf", "paper.pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }

    #[test]
    fn empty_pages_do_not_break_concatenation() {
        let joined = join_pages(vec!["one".into(), String::new(), "three".into()]);
        assert_eq!(joined, "one\n\nthree\n");
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello</w:t><w:tab/><w:t>there</w:t></w:r></w:p>
    <w:p><w:r><w:t>World &amp; more</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

        let text = extract_text(&build_docx(xml), "essay.docx").unwrap();
        assert_eq!(text.as_str(), "Hello\tthere\nWorld & more");
    }

    #[test]
    fn docx_without_document_part_is_rejected() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("other.xml", SimpleFileOptions::default())
            .expect("zip start file");
        zip.write_all(b"<x/>").expect("write");
        let bytes = zip.finish().expect("finish").into_inner();

        let err = extract_text(&bytes, "essay.docx").unwrap_err();
        assert!(matches!(err, ExtractionError::Docx(_)));
    }

    /// Minimal PDF with one Helvetica text line per page; `None` leaves a page blank.
    fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
        let kids = page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");

        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (page_id, text) in page_ids.iter().zip(pages) {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_id + 1
            ));
            let stream = text
                .map(|t| format!("BT /F1 24 Tf 72 700 Td ({t}) Tj ET"))
                .unwrap_or_default();
            objects.push(format!(
                "<< /Length {} >>\nstream\n{stream}\nendstream",
                stream.len()
            ));
        }

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (idx, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", idx + 1).as_bytes());
        }

        let xref_offset = pdf.len();
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            tail.push_str(&format!("{offset:010} 00000 n \n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        ));
        pdf.extend_from_slice(tail.as_bytes());
        pdf
    }

    #[test]
    fn pdf_pages_are_joined_and_blank_pages_tolerated() {
        let pdf = build_pdf(&[Some("First page"), None, Some("Third page")]);
        let text = extract_text(&pdf, "doc.PDF").unwrap();

        let lines: Vec<&str> = text
            .as_str()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        assert_eq!(lines, ["First page", "Third page"]);
        assert!(text.as_str().starts_with("First page"));
        assert!(text.as_str().ends_with("Third page"));
        assert!(text.as_str().matches('\n').count() >= 2);
    }

    #[test]
    fn pdf_without_any_text_is_empty() {
        let err = extract_text(&build_pdf(&[None]), "scan.pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Empty));
    }

    #[test]
    fn docx_tab_stop_definitions_are_not_tabs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Intro</w:t></w:r></w:p>
    <w:p>
      <w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/><w:tab w:val="right" w:pos="9360"/></w:tabs></w:pPr>
      <w:r><w:t>Name</w:t><w:tab/><w:t>Grade</w:t></w:r>
    </w:p>
  </w:body>
</w:document>"#;

        let text = extract_text(&build_docx(xml), "table.docx").unwrap();
        assert_eq!(text.as_str(), "Intro\nName\tGrade");
    }

    #[tokio::test]
    async fn blocking_extraction_parses_binary_formats_off_the_runtime() {
        let pdf = build_pdf(&[Some("Blocking pool")]);
        let text = extract_text_blocking(pdf, "paper.pdf".into()).await.unwrap();
        assert_eq!(text.as_str(), "Blocking pool");

        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>From docx</w:t></w:r></w:p></w:body></w:document>"#;
        let text = extract_text_blocking(build_docx(xml), "essay.docx".into())
            .await
            .unwrap();
        assert_eq!(text.into_string(), "From docx");

        let err = extract_text_blocking(b"not a pdf".to_vec(), "bad.pdf".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }

    #[tokio::test]
    async fn blocking_extraction_handles_text_inline() {
        let text = extract_text_blocking(b"inline".to_vec(), "a.txt".into())
            .await
            .unwrap();
        assert_eq!(text.into_string(), "inline");
    }
}
