// Text extraction module
// Turns PDF, TXT and DOCX files into plain text for indexing


mod docx;

use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unsupported file type {extension:?}: {}", path.display())]
    Unsupported { path: PathBuf, extension: String },
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to extract PDF text from {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },
    #[error("Failed to extract DOCX text from {}: {message}", path.display())]
    Docx { path: PathBuf, message: String },
}

/// Produces plain text from a file on disk
pub trait TextExtractor {
    fn process(&self, path: &Path) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Txt,
    Docx,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 3] = [Self::Pdf, Self::Txt, Self::Docx];

    /// Detect the format from a file extension, ignoring case
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentFormat {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// Extractor for the formats in [`DocumentFormat`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FileProcessor;

impl FileProcessor {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    #[inline]
    pub fn is_supported(path: &Path) -> bool {
        DocumentFormat::from_path(path).is_some()
    }
}

impl TextExtractor for FileProcessor {
    fn process(&self, path: &Path) -> Result<String, ExtractionError> {
        if !path.exists() {
            return Err(ExtractionError::NotFound(path.to_path_buf()));
        }

        let format =
            DocumentFormat::from_path(path).ok_or_else(|| ExtractionError::Unsupported {
                path: path.to_path_buf(),
                extension: path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            })?;

        let bytes = fs::read(path).map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(
            "Extracting {} ({} bytes) as {}",
            path.display(),
            bytes.len(),
            format
        );

        match format {
            DocumentFormat::Pdf => extract_pdf(path, &bytes),
            DocumentFormat::Txt => Ok(decode_text(path, bytes)),
            DocumentFormat::Docx => docx::extract(&bytes).map_err(|message| ExtractionError::Docx {
                path: path.to_path_buf(),
                message,
            }),
        }
    }
}

fn extract_pdf(path: &Path, bytes: &[u8]) -> Result<String, ExtractionError> {
    // The PDF parser panics on some malformed inputs
    let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    let pages = match extracted {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            return Err(ExtractionError::Pdf {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
        }
        Err(_) => {
            return Err(ExtractionError::Pdf {
                path: path.to_path_buf(),
                message: "parser panicked on malformed input".to_string(),
            });
        }
    };

    Ok(normalize_pdf_pages(&pages))
}

/// One line per page: all whitespace in a page, line breaks included,
/// collapses to single spaces and blank pages are dropped
fn normalize_pdf_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|page| page.as_ref().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode as UTF-8, falling back to Latin-1 which accepts every byte sequence
fn decode_text(path: &Path, bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "{} is not valid UTF-8 ({}), decoding as Latin-1",
                path.display(),
                e.utf8_error()
            );
            e.into_bytes().into_iter().map(char::from).collect()
        }
    }
}
