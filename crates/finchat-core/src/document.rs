//! Uploaded documents and turning them into raw text.
//!
//! [`FileExtractor`] reads every [`DocumentKind`]: PDF through `pdf-extract`,
//! DOCX by walking `word/document.xml` with `quick-xml`. Parsing runs on the
//! blocking pool.

use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
    Markdown,
}

impl DocumentKind {
    /// Guess the kind from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Text => "text",
            DocumentKind::Markdown => "markdown",
        };
        f.write_str(s)
    }
}

/// An uploaded file: name, declared kind and raw bytes.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, kind: DocumentKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            kind,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, taking its kind from the extension.
    pub fn read(path: &Path) -> Result<Self, ExtractError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DocumentKind::from_extension)
            .ok_or_else(|| ExtractError::UnsupportedFormat(name.clone()))?;
        let bytes = std::fs::read(path)
            .map_err(|e| ExtractError::ExtractionFailed(format!("{name}: {e}")))?;
        Ok(Self { name, kind, bytes })
    }
}

/// Converts a document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &Document) -> Result<String, ExtractError>;
}

/// Built-in extractor for PDF, DOCX, UTF-8 text and markdown. Markdown loses
/// its YAML frontmatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract(&self, document: &Document) -> Result<String, ExtractError> {
        let failed = |e: String| ExtractError::ExtractionFailed(format!("{}: {e}", document.name));
        let text = match document.kind {
            DocumentKind::Text | DocumentKind::Markdown => {
                let text = std::str::from_utf8(&document.bytes).map_err(|e| failed(e.to_string()))?;
                if document.kind == DocumentKind::Markdown {
                    strip_frontmatter(text)
                } else {
                    text.to_string()
                }
            }
            DocumentKind::Pdf | DocumentKind::Docx => {
                let kind = document.kind;
                let bytes = document.bytes.clone();
                tokio::task::spawn_blocking(move || match kind {
                    DocumentKind::Pdf => pdf_text(&bytes),
                    _ => docx_text(&bytes),
                })
                .await
                .map_err(|e| failed(format!("{kind} parser aborted: {e}")))?
                .map_err(failed)?
            }
        };
        debug!(name = %document.name, kind = %document.kind, len = text.len(), "extracted text");
        Ok(text)
    }
}

fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

/// Paragraph text of a DOCX package, one paragraph per line.
fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| e.to_string())?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;
    docx_xml_text(&xml).map_err(|e| e.to_string())
}

fn docx_xml_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" | b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => out.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Removes optional YAML frontmatter (lines between first --- and second ---).
fn strip_frontmatter(content: &str) -> String {
    let s = content.trim_start();
    if !s.starts_with("---") {
        return content.to_string();
    }
    let after_first = s.strip_prefix("---").unwrap_or(s).trim_start();
    if let Some(rest) = after_first.find("\n---") {
        after_first[rest + 4..].trim_start().to_string()
    } else {
        content.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),
}
