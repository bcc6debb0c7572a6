use crate::chunking::split_paragraphs;
use crate::error::{RagError, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Supported document formats, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    /// Detect the format from the path's extension (case-insensitive)
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "txt" => Ok(DocumentFormat::Txt),
            "" => Err(RagError::UnsupportedFormat("(no extension)".to_string())),
            other => Err(RagError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// Represents a document with its content and metadata
#[derive(Debug, Clone)]
pub struct Document {
    /// The full text content of the document
    pub content: String,
    /// The document's file name
    pub file_name: String,
    pub format: DocumentFormat,
    /// The document's MIME type
    pub mime_type: String,
}

impl Document {
    /// Load a document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let format = DocumentFormat::from_path(path)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RagError::extraction(path, "invalid file name"))?
            .to_string();

        let mime_type = from_path(path).first_or_octet_stream().to_string();
        debug!("Detected MIME type: {}", mime_type);

        let content = read_document_content(path, format)?;

        Ok(Document {
            content,
            file_name,
            format,
            mime_type,
        })
    }

    /// Split the document into blank-line separated chunks
    pub fn paragraphs(&self) -> Vec<String> {
        split_paragraphs(&self.content)
    }
}

/// Extract a file into its ordered, non-empty text chunks
pub fn extract<P: AsRef<Path>>(file_path: P) -> Result<Vec<String>> {
    let document = Document::from_file(file_path)?;
    let chunks = document.paragraphs();
    debug!("Extracted {} chunks from {}", chunks.len(), document.file_name);
    Ok(chunks)
}

/// Read the full text of a document
pub fn read_document_content<P: AsRef<Path>>(file_path: P, format: DocumentFormat) -> Result<String> {
    let path = file_path.as_ref();

    match format {
        DocumentFormat::Pdf => {
            info!("Processing PDF document: {}", path.display());
            let content = read_pdf(path)?;

            if content.is_empty() {
                warn!("Extracted PDF content is empty or contains only whitespace");
            }

            Ok(content)
        }

        DocumentFormat::Docx => {
            info!("Processing DOCX document: {}", path.display());
            read_docx(path)
        }

        DocumentFormat::Txt => {
            info!("Processing text document: {}", path.display());
            let bytes = fs::read(path).map_err(|e| RagError::extraction(path, e))?;
            let content = String::from_utf8(bytes).map_err(|e| RagError::extraction(path, e))?;
            Ok(content.replace("\r\n", "\n"))
        }
    }
}

fn read_pdf(path: &Path) -> Result<String> {
    // pdf-extract panics on some malformed files instead of returning an error
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text(path))
        .map_err(|_| RagError::extraction(path, "PDF parser panicked"))?;

    let content = extracted.map_err(|e| RagError::extraction(path, e))?;

    // PDF extraction can sometimes include excessive whitespace
    Ok(normalize_whitespace(&content))
}

fn read_docx(path: &Path) -> Result<String> {
    let file = fs::File::open(path).map_err(|e| RagError::extraction(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| RagError::extraction(path, e))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| RagError::extraction(path, e))?
        .read_to_string(&mut xml)
        .map_err(|e| RagError::extraction(path, e))?;

    let paragraphs = docx_paragraphs(&xml).map_err(|e| RagError::extraction(path, e))?;

    // Each paragraph ends with a single newline; empty paragraphs become blank lines
    Ok(paragraphs.iter().map(|p| format!("{}\n", p)).collect())
}

/// Collect the plain text of every `w:p` element of a WordprocessingML body
fn docx_paragraphs(xml: &str) -> std::result::Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => current = Some(String::new()),
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:p" => {
                    if let Some(paragraph) = current.take() {
                        paragraphs.push(paragraph);
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => push_to(&mut current, "\t"),
                b"w:br" | b"w:cr" => push_to(&mut current, "\n"),
                _ => {}
            },
            Event::Text(t) if in_text => push_to(&mut current, &t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn push_to(paragraph: &mut Option<String>, text: &str) {
    if let Some(p) = paragraph.as_mut() {
        p.push_str(text);
    }
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    // Replace multiple consecutive newlines with double newlines (paragraph separator)
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
            continue;
        }

        if newline_count > 0 {
            push_newlines(&mut normalized, newline_count);
            newline_count = 0;
        }

        // Don't add consecutive spaces
        if !(c == ' ' && prev_char == ' ') {
            normalized.push(c);
        }

        prev_char = c;
    }

    if newline_count > 0 {
        push_newlines(&mut normalized, newline_count);
    }

    normalized.trim().to_string()
}

/// Add at most two newlines (paragraph break)
fn push_newlines(out: &mut String, count: usize) {
    if count >= 2 {
        out.push_str("\n\n");
    } else {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn write_docx(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let file = fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
        .unwrap();
        zip.finish().unwrap();
        path
    }

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[test]
    fn test_format_detection_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_path("a/b/report.PDF").unwrap(), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_path("notes.Docx").unwrap(), DocumentFormat::Docx);
        assert_eq!(DocumentFormat::from_path("readme.txt").unwrap(), DocumentFormat::Txt);
    }

    #[test]
    fn test_unsupported_extension_fails_without_reading() {
        // The file does not exist: the extension check must come first
        for name in ["slides.pptx", "data.csv", "archive.tar.gz", "no_extension"] {
            let err = extract(name).unwrap_err();
            assert!(
                matches!(err, RagError::UnsupportedFormat(_)),
                "{} gave {:?}",
                name,
                err
            );
        }
    }

    #[test]
    fn test_extract_txt_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "intro.txt", b"Intro line\n\nBody line");

        assert_eq!(extract(&path).unwrap(), vec!["Intro line", "Body line"]);
    }

    #[test]
    fn test_extract_txt_with_crlf_line_endings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "windows.txt", b"First\r\n\r\nSecond\r\nline\r\n");

        assert_eq!(extract(&path).unwrap(), vec!["First", "Second\nline"]);
    }

    #[test]
    fn test_extract_txt_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "binary.txt", &[0xff, 0xfe, 0x00, 0x41]);

        assert!(matches!(extract(&path), Err(RagError::Extraction { .. })));
    }

    #[test]
    fn test_missing_file_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        assert!(matches!(extract(&path), Err(RagError::Extraction { .. })));
    }

    #[test]
    fn test_extract_docx_keeps_adjacent_paragraphs_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_docx(
            &dir,
            "memo.docx",
            "<w:p><w:r><w:t>Paragraph 1</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Paragraph 2</w:t></w:r></w:p>\
             <w:p/>\
             <w:p><w:r><w:t xml:space=\"preserve\">Fish &amp; </w:t></w:r><w:r><w:t>chips</w:t><w:tab/><w:t>end</w:t></w:r></w:p>",
        );

        assert_eq!(
            extract(&path).unwrap(),
            vec!["Paragraph 1\nParagraph 2", "Fish & chips\tend"]
        );
    }

    #[test]
    fn test_corrupt_docx_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "broken.docx", b"this is not a zip archive");

        assert!(matches!(extract(&path), Err(RagError::Extraction { .. })));
    }

    #[test]
    fn test_corrupt_pdf_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "broken.pdf", b"not a pdf at all");

        assert!(matches!(extract(&path), Err(RagError::Extraction { .. })));
    }

    #[test]
    fn test_document_from_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "notes.txt", b"hello");

        let document = Document::from_file(&path).unwrap();

        assert_eq!(document.file_name, "notes.txt");
        assert_eq!(document.format, DocumentFormat::Txt);
        assert_eq!(document.mime_type, "text/plain");
        assert_eq!(document.content, "hello");
    }
}
