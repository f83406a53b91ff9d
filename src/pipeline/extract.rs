//! PDF text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is synchronous and
//! CPU-bound on large documents. [`extract_pages`] moves the work onto the
//! blocking thread pool so Tokio worker threads keep serving other requests
//! while a big upload is parsed.
//!
//! ## Why a trait?
//!
//! Extraction sits behind [`TextExtractor`] so the rest of the pipeline can
//! be exercised with canned page text. Tests never need libpdfium.

use crate::error::QuizError;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns PDF bytes into one string per page, in page order.
///
/// Pages without a text layer yield an empty string rather than an error.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<String>, QuizError>;
}

/// Run `extractor` on the blocking pool.
pub async fn extract_pages(
    extractor: Arc<dyn TextExtractor>,
    bytes: Vec<u8>,
) -> Result<Vec<String>, QuizError> {
    tokio::task::spawn_blocking(move || extractor.extract(&bytes))
        .await
        .map_err(|e| QuizError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// [`TextExtractor`] backed by a dynamically loaded libpdfium.
///
/// The library is looked up, in order, in `library_dir` (or
/// `PDFIUM_LIB_PATH` via [`PdfiumExtractor::from_env`]), the current
/// working directory, and finally the system loader path.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_dir: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Honour `PDFIUM_LIB_PATH` when set.
    pub fn from_env() -> Self {
        let library_dir = std::env::var_os("PDFIUM_LIB_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            library_dir,
            password: None,
        }
    }

    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = Some(dir.into());
        self
    }

    /// Password for encrypted documents.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn bind(&self) -> Result<Pdfium, QuizError> {
        if let Some(ref dir) = self.library_dir {
            // PDFIUM_LIB_PATH may point at the library file itself or its directory.
            let path = if dir.is_file() {
                dir.clone()
            } else {
                Pdfium::pdfium_platform_library_name_at_path(dir.as_path())
            };
            let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
                QuizError::PdfiumBindingFailed(format!("{}: {:?}", path.display(), e))
            })?;
            return Ok(Pdfium::new(bindings));
        }

        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| QuizError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl TextExtractor for PdfiumExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<String>, QuizError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, self.password.as_deref())
            .map_err(|e| QuizError::CorruptPdf {
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut texts = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            match page.text() {
                Ok(text) => {
                    let content = text.all();
                    debug!("Page {}: {} chars of text", idx + 1, content.chars().count());
                    texts.push(content);
                }
                Err(e) => {
                    warn!("Page {}: no text layer ({:?})", idx + 1, e);
                    texts.push(String::new());
                }
            }
        }

        Ok(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Vec<&'static str>);

    impl TextExtractor for Canned {
        fn extract(&self, _bytes: &[u8]) -> Result<Vec<String>, QuizError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Broken;

    impl TextExtractor for Broken {
        fn extract(&self, _bytes: &[u8]) -> Result<Vec<String>, QuizError> {
            Err(QuizError::CorruptPdf {
                detail: "xref table missing".into(),
            })
        }
    }

    #[tokio::test]
    async fn runs_extractor_off_the_runtime() {
        let pages = extract_pages(Arc::new(Canned(vec!["one", "", "three"])), vec![])
            .await
            .unwrap();
        assert_eq!(pages, vec!["one", "", "three"]);
    }

    #[tokio::test]
    async fn propagates_extractor_error() {
        let err = extract_pages(Arc::new(Broken), b"%PDF-1.7".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::CorruptPdf { .. }));
    }

    #[test]
    fn builder_sets_library_dir_and_password() {
        let e = PdfiumExtractor::new()
            .with_library_dir("/opt/pdfium/lib")
            .with_password("hunter2");
        assert_eq!(e.library_dir.as_deref(), Some(std::path::Path::new("/opt/pdfium/lib")));
        assert_eq!(e.password.as_deref(), Some("hunter2"));
    }
}
