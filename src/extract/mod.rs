//! Loader dispatch: turn an uploaded file into plain UTF-8 text.
//!
//! The routine is chosen by [`DocumentFormat`], detected from the file
//! extension unless the caller overrides it. Unrecognized extensions are
//! decoded as plain text (UTF-8, then UTF-16 with a byte-order mark) and
//! rejected with [`RagError::UnsupportedFormat`] when neither works.
//!
//! | Format | Routine |
//! |--------|---------|
//! | txt, md | [`decode_text`] |
//! | html, htm | [`html::extract_html`] |
//! | pdf | `pdf-extract` |
//! | docx, pptx, xlsx | [`ooxml`] |
//! | csv, json | [`structured`] |
//! | doc, ppt, xls | [`convert`] to OOXML via LibreOffice, then [`ooxml`] |
//!
//! Everything here is synchronous and CPU-bound; async callers run it on
//! `tokio::task::spawn_blocking`.

pub mod convert;
pub mod html;
pub mod ooxml;
pub mod structured;

use std::path::PathBuf;
use std::time::Duration;

use askdocs_core::{RagError, Result};
use thiserror::Error;
use tracing::debug;

use crate::config::ExtractionConfig;

/// Extraction failure inside a recognized format. Converted to
/// [`RagError::Extraction`] once the filename is attached.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("markup extraction failed: {0}")]
    Markup(String),
    #[error("{0}")]
    Structured(String),
    #[error("conversion failed: {0}")]
    Convert(String),
    #[error("text is not valid UTF-8 or UTF-16")]
    Encoding,
}

/// File types with a dedicated extraction routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Html,
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Csv,
    Json,
    Doc,
    Ppt,
    Xls,
    /// Anything else: plain-text fallback.
    Unknown,
}

/// Extensions with a dedicated routine, used as the default ingest filter.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "html", "htm", "pdf", "docx", "doc", "ppt", "pptx", "csv", "xlsx", "xls", "json",
];

impl DocumentFormat {
    /// Format for a file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => DocumentFormat::Text,
            "md" | "markdown" => DocumentFormat::Markdown,
            "html" | "htm" => DocumentFormat::Html,
            "pdf" => DocumentFormat::Pdf,
            "docx" => DocumentFormat::Docx,
            "pptx" => DocumentFormat::Pptx,
            "xlsx" => DocumentFormat::Xlsx,
            "csv" => DocumentFormat::Csv,
            "json" => DocumentFormat::Json,
            "doc" => DocumentFormat::Doc,
            "ppt" => DocumentFormat::Ppt,
            "xls" => DocumentFormat::Xls,
            _ => DocumentFormat::Unknown,
        }
    }

    /// Format implied by the extension of `filename`.
    pub fn from_filename(filename: &str) -> Self {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| Self::from_extension(ext))
            .unwrap_or(DocumentFormat::Unknown)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DocumentFormat::Text => "txt",
            DocumentFormat::Markdown => "md",
            DocumentFormat::Html => "html",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Csv => "csv",
            DocumentFormat::Json => "json",
            DocumentFormat::Doc => "doc",
            DocumentFormat::Ppt => "ppt",
            DocumentFormat::Xls => "xls",
            DocumentFormat::Unknown => "unknown",
        }
    }
}

/// Text extracted from one upload.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    /// Filename the text is attributed to.
    pub source: String,
    pub format: DocumentFormat,
}

/// Settings the loaders need beyond the bytes themselves.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub soffice: String,
    pub convert_timeout: Duration,
    pub scratch_dir: Option<PathBuf>,
}

impl From<&ExtractionConfig> for LoaderOptions {
    fn from(cfg: &ExtractionConfig) -> Self {
        Self {
            soffice: cfg.soffice.clone(),
            convert_timeout: Duration::from_secs(cfg.convert_timeout_secs),
            scratch_dir: cfg.scratch_dir.clone(),
        }
    }
}

/// Extract plain text from `bytes`.
///
/// `format` overrides detection from `filename` when given.
pub fn load_document(
    bytes: &[u8],
    filename: &str,
    format: Option<DocumentFormat>,
    options: &LoaderOptions,
) -> Result<ExtractedText> {
    let format = format.unwrap_or_else(|| DocumentFormat::from_filename(filename));
    debug!(filename, format = format.name(), bytes = bytes.len(), "extracting");

    let extracted = match format {
        DocumentFormat::Text | DocumentFormat::Markdown => {
            decode_text(bytes).ok_or(ExtractError::Encoding)
        }
        DocumentFormat::Html => decode_text(bytes)
            .ok_or(ExtractError::Encoding)
            .map(|s| html::extract_html(&s)),
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => ooxml::extract_docx(bytes),
        DocumentFormat::Pptx => ooxml::extract_pptx(bytes),
        DocumentFormat::Xlsx => ooxml::extract_xlsx(bytes),
        DocumentFormat::Csv => decode_text(bytes)
            .ok_or(ExtractError::Encoding)
            .and_then(|s| structured::extract_csv(&s)),
        DocumentFormat::Json => decode_text(bytes)
            .ok_or(ExtractError::Encoding)
            .and_then(|s| structured::extract_json(&s)),
        DocumentFormat::Doc => convert::convert_legacy(bytes, "doc", "docx", options)
            .and_then(|b| ooxml::extract_docx(&b)),
        DocumentFormat::Ppt => convert::convert_legacy(bytes, "ppt", "pptx", options)
            .and_then(|b| ooxml::extract_pptx(&b)),
        DocumentFormat::Xls => convert::convert_legacy(bytes, "xls", "xlsx", options)
            .and_then(|b| ooxml::extract_xlsx(&b)),
        DocumentFormat::Unknown => {
            return decode_text(bytes)
                .map(|text| ExtractedText {
                    text,
                    source: filename.to_string(),
                    format,
                })
                .ok_or_else(|| RagError::UnsupportedFormat {
                    filename: filename.to_string(),
                    attempted: vec!["utf-8".to_string(), "utf-16".to_string()],
                });
        }
    };

    extracted
        .map(|text| ExtractedText {
            text,
            source: filename.to_string(),
            format,
        })
        .map_err(|e| RagError::Extraction {
            filename: filename.to_string(),
            message: e.to_string(),
        })
}

/// Decode text bytes: UTF-8 (BOM stripped), or UTF-16 when a byte-order
/// mark says so. `None` when neither applies.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(rest.to_vec()).ok();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    std::str::from_utf8(bytes).ok().map(str::to_string)
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| unit([c[0], c[1]])).collect();
    String::from_utf16(&units).ok()
}

fn extract_pdf(bytes: &[u8]) -> std::result::Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> LoaderOptions {
        LoaderOptions::from(&ExtractionConfig::default())
    }

    #[test]
    fn format_detection() {
        assert_eq!(DocumentFormat::from_filename("a.PDF"), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_filename("notes.md"), DocumentFormat::Markdown);
        assert_eq!(DocumentFormat::from_filename("x.tar.xyz"), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::from_filename("README"), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::from_filename("page.htm"), DocumentFormat::Html);
    }

    #[test]
    fn empty_txt_is_empty_text() {
        let out = load_document(b"", "empty.txt", None, &opts()).unwrap();
        assert_eq!(out.text, "");
        assert_eq!(out.source, "empty.txt");
    }

    #[test]
    fn utf8_bom_stripped_and_utf16_decoded() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFhi").as_deref(), Some("hi"));
        let mut le = vec![0xFF, 0xFE];
        for u in "héllo".encode_utf16() {
            le.extend_from_slice(&u.to_le_bytes());
        }
        assert_eq!(decode_text(&le).as_deref(), Some("héllo"));
        let mut be = vec![0xFE, 0xFF];
        for u in "ok".encode_utf16() {
            be.extend_from_slice(&u.to_be_bytes());
        }
        assert_eq!(decode_text(&be).as_deref(), Some("ok"));
    }

    #[test]
    fn unknown_extension_with_utf8_is_text() {
        let out = load_document("plain words".as_bytes(), "data.xyz", None, &opts()).unwrap();
        assert_eq!(out.text, "plain words");
        assert_eq!(out.format, DocumentFormat::Unknown);
    }

    #[test]
    fn unknown_extension_with_binary_is_unsupported() {
        let err = load_document(&[0xC3, 0x28, 0xFF, 0x00, 0x9F], "blob.xyz", None, &opts())
            .unwrap_err();
        match err {
            RagError::UnsupportedFormat { filename, attempted } => {
                assert_eq!(filename, "blob.xyz");
                assert_eq!(attempted, vec!["utf-8", "utf-16"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_pdf_is_extraction_error() {
        let err = load_document(b"not a pdf", "broken.pdf", None, &opts()).unwrap_err();
        assert!(matches!(err, RagError::Extraction { ref filename, .. } if filename == "broken.pdf"));
    }

    #[test]
    fn invalid_zip_is_extraction_error() {
        let err = load_document(b"not a zip", "broken.docx", None, &opts()).unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }

    #[test]
    fn override_beats_extension() {
        let out = load_document(
            b"<p>Hi &amp; bye</p>",
            "page.txt",
            Some(DocumentFormat::Html),
            &opts(),
        )
        .unwrap();
        assert_eq!(out.text, "Hi & bye");
    }
}
