//! Input resolution: validate uploads and load a path or URL into memory.
//!
//! pdfium reads PDFs straight from a byte slice, so both local files and
//! downloads end up as an in-memory [`LoadedInput`]. The PDF magic bytes
//! (`%PDF`) are checked before returning so callers get a meaningful error
//! rather than a pdfium failure.

use crate::error::QuizError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8] = b"%PDF";

/// A document loaded into memory, with a display name for logs and errors.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Accept only filenames ending in `.pdf` (case-insensitive).
pub fn validate_filename(filename: &str) -> Result<(), QuizError> {
    let is_pdf = Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        Ok(())
    } else {
        Err(QuizError::UnsupportedFileType {
            filename: filename.to_string(),
        })
    }
}

/// Check the `%PDF` signature.
pub fn check_magic(name: &str, bytes: &[u8]) -> Result<(), QuizError> {
    if bytes.starts_with(PDF_MAGIC) {
        Ok(())
    } else {
        Err(QuizError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local path or download a URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, QuizError> {
    let loaded = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_magic(&loaded.name, &loaded.bytes)?;
    Ok(loaded)
}

async fn read_local(path_str: &str) -> Result<LoadedInput, QuizError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => QuizError::PermissionDenied { path: path.clone() },
        _ => QuizError::FileNotFound { path: path.clone() },
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    Ok(LoadedInput { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, QuizError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| QuizError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            QuizError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            QuizError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_err)?;

    if !response.status().is_success() {
        return Err(QuizError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(LoadedInput {
        name: filename_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of the URL when it looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_suffix_is_case_insensitive() {
        assert!(validate_filename("lecture.pdf").is_ok());
        assert!(validate_filename("LECTURE.PDF").is_ok());
        assert!(validate_filename("notes.Pdf").is_ok());
        assert!(matches!(
            validate_filename("notes.txt"),
            Err(QuizError::UnsupportedFileType { .. })
        ));
        assert!(validate_filename("pdf").is_err());
        assert!(validate_filename("").is_err());
    }

    #[test]
    fn magic_bytes() {
        assert!(check_magic("a.pdf", b"%PDF-1.7\n...").is_ok());
        match check_magic("a.pdf", b"PK\x03\x04zip") {
            Err(QuizError::NotAPdf { magic, .. }) => assert_eq!(magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(check_magic("empty.pdf", b"").is_err());
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/papers/attention.pdf"), "attention.pdf");
        assert_eq!(filename_from_url("https://arxiv.org/pdf/1706"), "downloaded.pdf");
        assert_eq!(filename_from_url("not a url"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn loads_local_pdf() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"%PDF-1.4\n%fake").unwrap();
        let loaded = load_input(file.path().to_str().unwrap(), 5).await.unwrap();
        assert!(loaded.name.ends_with(".pdf"));
        assert_eq!(&loaded.bytes[..4], b"%PDF");
    }

    #[tokio::test]
    async fn rejects_local_non_pdf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        let err = load_input(file.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, QuizError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.pdf");
        let err = load_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, QuizError::FileNotFound { .. }));
    }
}
