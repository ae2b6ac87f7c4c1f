//! Plain-text extraction for uploaded files.
//!
//! Dispatches on the file extension (case-insensitive). Only `.txt` and
//! `.pdf` are accepted; everything works on the in-memory upload.

use thiserror::Error;

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("text extraction task failed: {0}")]
    Task(String),
}

/// Lower-cased extension of `filename`, if any.
fn extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// True for `.pdf` and `.txt` files.
pub fn is_supported(filename: &str) -> bool {
    extension(filename)
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Extracts plain text from an uploaded file.
///
/// PDF parsing runs on a blocking thread. A PDF that cannot be parsed
/// yields empty text rather than an error; callers treat empty text as
/// "nothing to index".
pub async fn extract_text(filename: &str, bytes: Vec<u8>) -> Result<String, ExtractError> {
    match extension(filename).as_deref() {
        Some("txt") => Ok(decode_text(&bytes)),
        Some("pdf") => {
            let name = filename.to_string();
            tokio::task::spawn_blocking(move || extract_pdf(&name, &bytes))
                .await
                .map_err(|e| ExtractError::Task(e.to_string()))
        }
        _ => Err(ExtractError::UnsupportedFileType(filename.to_string())),
    }
}

/// UTF-8 decode, silently dropping invalid sequences.
fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

/// The PDF parser panics on some malformed inputs; those are treated like
/// any other parse failure.
fn extract_pdf(filename: &str, bytes: &[u8]) -> String {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!(file = filename, error = %e, "PDF extraction failed");
            String::new()
        }
        Err(_) => {
            tracing::warn!(file = filename, "PDF parser panicked");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        assert!(is_supported("notes.txt"));
        assert!(is_supported("Report.PDF"));
        assert!(!is_supported("slides.pptx"));
        assert!(!is_supported("README"));
        assert!(!is_supported("archive.txt.zip"));
    }

    #[tokio::test]
    async fn test_txt_roundtrip() {
        let text = extract_text("a.txt", b"hello\n\nworld".to_vec())
            .await
            .unwrap();
        assert_eq!(text, "hello\n\nworld");
    }

    #[tokio::test]
    async fn test_txt_invalid_utf8_dropped() {
        let bytes = vec![b'o', b'k', 0xff, 0xfe, b'!'];
        let text = extract_text("a.TXT", bytes).await.unwrap();
        assert_eq!(text, "ok!");
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let err = extract_text("a.docx", vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFileType(_)));
    }

    #[tokio::test]
    async fn test_garbage_pdf_yields_empty_text() {
        let text = extract_text("broken.pdf", b"not a pdf".to_vec())
            .await
            .unwrap();
        assert!(text.is_empty());
    }
}
