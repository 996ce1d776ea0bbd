//! The scoped working directory of one pipeline run.
//!
//! Page images, fragments and merge chunks all live under a single
//! [`tempfile::TempDir`]. [`WorkDir`] owns it and removes it on drop, which
//! covers every exit path: success, `?` early returns, panics, and a caller
//! dropping the run future on Ctrl-C. With `keep_temp` the directory is
//! released to the caller instead.

use crate::error::OcrPdfError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PAGES_DIR: &str = "pages";
const FRAGMENTS_DIR: &str = "fragments";
const CHUNKS_DIR: &str = "chunks";

/// Owner of the run's temporary files.
#[derive(Debug)]
pub struct WorkDir {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Create the directory and its stage subdirectories.
    ///
    /// `root` overrides the system temp directory; `keep` retains the files
    /// when the `WorkDir` is dropped.
    pub fn create(root: Option<&Path>, keep: bool) -> Result<Self, OcrPdfError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ocrpdf-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(OcrPdfError::WorkDir)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(OcrPdfError::WorkDir)?;

        let path = dir.path().to_path_buf();
        for sub in [PAGES_DIR, FRAGMENTS_DIR, CHUNKS_DIR] {
            std::fs::create_dir(path.join(sub)).map_err(OcrPdfError::WorkDir)?;
        }
        debug!("Working directory: {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the rasterizer writes page images.
    pub fn pages_dir(&self) -> PathBuf {
        self.path.join(PAGES_DIR)
    }

    /// Where OCR workers write page fragments.
    pub fn fragments_dir(&self) -> PathBuf {
        self.path.join(FRAGMENTS_DIR)
    }

    /// Where the reassembler writes intermediate merge chunks.
    pub fn chunks_dir(&self) -> PathBuf {
        self.path.join(CHUNKS_DIR)
    }

    /// Whether intermediate files should be left in place.
    pub fn keeps_files(&self) -> bool {
        self.keep
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if self.keep {
                let kept = dir.keep();
                info!("Temporary files kept in {}", kept.display());
            } else if let Err(e) = dir.close() {
                debug!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}
