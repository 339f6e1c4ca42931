use std::io::{self, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tracing::debug;

const SCRATCH_PREFIX: &str = "soar-gate-";

#[derive(Debug, Error)]
pub enum ScratchError {
    #[error("unable to create temporary file: {0}")]
    Create(#[source] io::Error),
    #[error("unable to write temporary file: {0}")]
    Write(#[source] io::Error),
}

/// Request-scoped temporary file handed to `soar` by path.
///
/// The file is removed when the value is dropped, so it never outlives the
/// request that created it, whichever way that request ends.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    /// Create an empty scratch file in `dir`, or the system temp dir when `None`.
    pub fn empty(dir: Option<&Path>) -> Result<Self, ScratchError> {
        let mut builder = Builder::new();
        builder.prefix(SCRATCH_PREFIX);

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(ScratchError::Create)?;

        debug!(path = %file.path().display(), "Created scratch file");
        Ok(Self { file })
    }

    /// Create a scratch file holding exactly `content`.
    pub fn with_content(dir: Option<&Path>, content: &[u8]) -> Result<Self, ScratchError> {
        let mut scratch = Self::empty(dir)?;
        scratch
            .file
            .write_all(content)
            .and_then(|_| scratch.file.flush())
            .map_err(ScratchError::Write)?;
        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Path rendered for a `-flag=<path>` token.
    pub fn arg_path(&self) -> String {
        self.path().display().to_string()
    }

    /// Read the file back from disk by path.
    ///
    /// The child process may have replaced the file rather than written into
    /// our handle, so this goes through the path instead of the open descriptor.
    pub fn read_back(&self) -> io::Result<Vec<u8>> {
        std::fs::read(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_with_content_writes_exact_bytes() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchFile::with_content(Some(dir.path()), b"SELECT 1").unwrap();
        assert_eq!(std::fs::read(scratch.path()).unwrap(), b"SELECT 1");
        assert!(scratch
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(SCRATCH_PREFIX));
    }

    #[test]
    fn test_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = {
            let scratch = ScratchFile::empty(Some(dir.path())).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_read_back_sees_replaced_file() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchFile::empty(Some(dir.path())).unwrap();
        std::fs::write(scratch.path(), "log line\n").unwrap();
        assert_eq!(scratch.read_back().unwrap(), b"log line\n");
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let result = ScratchFile::empty(Some(Path::new("/nonexistent/scratch/dir")));
        assert!(matches!(result, Err(ScratchError::Create(_))));
    }
}
