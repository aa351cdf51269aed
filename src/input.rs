//! Request input: uploaded files and their validation.
//!
//! Validation happens before any hashing or rendering so a bad request costs
//! nothing. The declared content type is trusted when it names a supported
//! kind; otherwise (missing, `application/octet-stream`, ...) the first bytes
//! decide, the same way the PDF magic check guards the renderer.

use crate::error::VerifyError;
use std::fmt;
use tracing::debug;

/// Minimum number of files per request.
pub const MIN_FILES: usize = 1;

/// Maximum number of files per request.
pub const MAX_FILES: usize = 2;

/// Kind of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentKind {
    /// Map a declared content type to a kind.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "image/png" => Some(DocumentKind::Png),
            "image/jpeg" | "image/jpg" => Some(DocumentKind::Jpeg),
            _ => None,
        }
    }

    /// Detect a kind from leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"%PDF") {
            Some(DocumentKind::Pdf)
        } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(DocumentKind::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(DocumentKind::Jpeg)
        } else {
            None
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Png => "image/png",
            DocumentKind::Jpeg => "image/jpeg",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, DocumentKind::Pdf)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// One uploaded file.
#[derive(Clone)]
pub struct InputFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl InputFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: Option<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            data: data.into(),
        }
    }

    /// Resolve the document kind: declared type first, magic bytes second.
    pub fn kind(&self) -> Option<DocumentKind> {
        self.content_type
            .as_deref()
            .and_then(DocumentKind::from_content_type)
            .or_else(|| DocumentKind::sniff(&self.data))
    }
}

/// A validated, ordered set of one or two documents.
#[derive(Debug, Clone)]
pub struct InputFileSet {
    files: Vec<(InputFile, DocumentKind)>,
}

impl InputFileSet {
    /// Validate file count and types.
    ///
    /// # Errors
    /// [`VerifyError::InvalidRequest`] when fewer than [`MIN_FILES`] or more
    /// than [`MAX_FILES`] files are given, or when a file is neither a PDF
    /// nor a PNG/JPEG image.
    pub fn new(files: Vec<InputFile>) -> Result<Self, VerifyError> {
        if files.len() < MIN_FILES {
            return Err(VerifyError::InvalidRequest(
                "Please upload at least one PDF file.".into(),
            ));
        }
        if files.len() > MAX_FILES {
            return Err(VerifyError::InvalidRequest(format!(
                "You can upload up to {MAX_FILES} files only (got {}).",
                files.len()
            )));
        }

        let mut validated = Vec::with_capacity(files.len());
        for file in files {
            if file.data.is_empty() {
                return Err(VerifyError::InvalidRequest(format!(
                    "File '{}' is empty",
                    file.filename
                )));
            }
            let kind = file.kind().ok_or_else(|| {
                VerifyError::InvalidRequest(format!(
                    "Unsupported file type for '{}': {}",
                    file.filename,
                    file.content_type.as_deref().unwrap_or("unknown")
                ))
            })?;
            debug!(
                "Accepted '{}' as {} ({} bytes)",
                file.filename,
                kind,
                file.data.len()
            );
            validated.push((file, kind));
        }

        Ok(Self { files: validated })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InputFile, DocumentKind)> {
        self.files.iter().map(|(f, k)| (f, *k))
    }

    /// True when at least one file must go through the rasterizer.
    pub fn needs_rasterization(&self) -> bool {
        self.files.iter().any(|(_, k)| *k == DocumentKind::Pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str) -> InputFile {
        InputFile::new(name, Some("application/pdf".into()), b"%PDF-1.7 body".to_vec())
    }

    #[test]
    fn rejects_empty_request() {
        let err = InputFileSet::new(vec![]).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_three_files() {
        let err = InputFileSet::new(vec![pdf("a"), pdf("b"), pdf("c")]).unwrap_err();
        assert!(err.to_string().contains("up to 2"), "got: {err}");
    }

    #[test]
    fn accepts_one_or_two() {
        assert_eq!(InputFileSet::new(vec![pdf("a")]).unwrap().len(), 1);
        assert_eq!(InputFileSet::new(vec![pdf("a"), pdf("b")]).unwrap().len(), 2);
    }

    #[test]
    fn rejects_unsupported_type() {
        let f = InputFile::new("notes.txt", Some("text/plain".into()), b"hello".to_vec());
        let err = InputFileSet::new(vec![f]).unwrap_err();
        assert!(err.to_string().contains("notes.txt"));
    }

    #[test]
    fn sniffs_octet_stream() {
        let f = InputFile::new(
            "scan",
            Some("application/octet-stream".into()),
            vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00],
        );
        assert_eq!(f.kind(), Some(DocumentKind::Jpeg));
    }

    #[test]
    fn content_type_parameters_ignored() {
        assert_eq!(
            DocumentKind::from_content_type("Application/PDF; charset=binary"),
            Some(DocumentKind::Pdf)
        );
    }

    #[test]
    fn needs_rasterization_only_for_pdf() {
        let png = InputFile::new(
            "p.png",
            None,
            vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0],
        );
        let set = InputFileSet::new(vec![png]).unwrap();
        assert!(!set.needs_rasterization());
        assert!(InputFileSet::new(vec![pdf("a")]).unwrap().needs_rasterization());
    }
}
