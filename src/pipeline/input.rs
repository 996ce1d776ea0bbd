//! Input validation: make sure the input is a readable PDF before any
//! external tool runs.
//!
//! Checking the `%PDF` magic bytes up front turns "pdftoppm exited with code
//! 1" into a message that names the actual problem.

use crate::error::OcrPdfError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` exists, is readable, and starts like a PDF.
///
/// Returns the path unchanged on success.
pub fn resolve_local(path: &Path) -> Result<PathBuf, OcrPdfError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(OcrPdfError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            let mut read = 0;
            while read < magic.len() {
                match f.read(&mut magic[read..]) {
                    Ok(0) => break,
                    Ok(n) => read += n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(_) => break,
                }
            }
            // Shorter than the magic itself counts as not a PDF.
            if read < magic.len() || &magic != b"%PDF" {
                return Err(OcrPdfError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(OcrPdfError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(OcrPdfError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file() {
        let err = resolve_local(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, OcrPdfError::FileNotFound { .. }));
    }

    #[test]
    fn directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_local(dir.path()).unwrap_err();
        assert!(matches!(err, OcrPdfError::FileNotFound { .. }));
    }

    #[test]
    fn rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"\x89PNG rest").unwrap();
        match resolve_local(&path).unwrap_err() {
            OcrPdfError::NotAPdf { magic, .. } => assert_eq!(&magic, b"\x89PNG"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn accepts_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_local(&path).unwrap(), path);
    }

    #[test]
    fn truncated_file_is_not_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        for (name, bytes) in [("empty.pdf", &b""[..]), ("short.pdf", &b"%PD"[..])] {
            let path = dir.path().join(name);
            std::fs::write(&path, bytes).unwrap();
            let err = resolve_local(&path).unwrap_err();
            assert!(matches!(err, OcrPdfError::NotAPdf { .. }), "{name}: {err:?}");
        }
    }
}
