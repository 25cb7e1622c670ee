//! Masked test file guard
//!
//! While a task is in flight the test file on disk holds the masked
//! content: the test method with its assertion replaced by the
//! placeholder. Candidates are swapped in only for the duration of a test
//! run. `restore` puts the original back and is safe to call twice; a
//! guard dropped without `restore` makes a best-effort restore.

use crate::errors::{AgentError, Result};
use crate::syntax::replace_lines;
use crate::types::CodeFragment;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

#[derive(Debug)]
pub struct MaskedFile {
    path: PathBuf,
    original: String,
    masked: String,
    placeholder: String,
    restored: bool,
}

fn with_trailing_newline(original: &str, content: String) -> String {
    if original.ends_with('\n') && !content.ends_with('\n') {
        content + "\n"
    } else {
        content
    }
}

impl MaskedFile {
    /// Replace `prefix`'s line span of `path` with its text and write it
    pub fn apply(path: &Path, prefix: &CodeFragment, placeholder: &str) -> Result<Self> {
        let original = fs::read_to_string(path)?;
        let masked = with_trailing_newline(
            &original,
            replace_lines(&original, &prefix.text, prefix.start_line, prefix.end_line),
        );
        fs::write(path, &masked)?;
        debug!(path = %path.display(), "test file masked");

        Ok(Self {
            path: path.to_path_buf(),
            original,
            masked,
            placeholder: placeholder.to_string(),
            restored: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn masked(&self) -> &str {
        &self.masked
    }

    /// Masked content with the placeholder replaced by `assert_code`
    pub fn with_candidate(&self, assert_code: &str) -> String {
        self.masked.replace(&self.placeholder, assert_code)
    }

    /// Write the masked content with `assert_code` in place of the placeholder
    pub fn write_candidate(&self, assert_code: &str) -> Result<()> {
        fs::write(&self.path, self.with_candidate(assert_code))?;
        Ok(())
    }

    /// Put the masked content back after a test run
    pub fn remask(&self) -> Result<()> {
        fs::write(&self.path, &self.masked)?;
        Ok(())
    }

    /// Write the original content back; a no-op once it succeeded
    pub fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        fs::write(&self.path, &self.original).map_err(|e| AgentError::RestoreFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        self.restored = true;
        debug!(path = %self.path.display(), "test file restored");
        Ok(())
    }
}

impl Drop for MaskedFile {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            error!(error = %e, "restore on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ORIGINAL: &str = "import calc\n\ndef test_add():\n    c = calc.Calc()\n    assert c.add(1, 1) == 2\n";

    fn prefix() -> CodeFragment {
        CodeFragment::new(
            "def test_add():\n    c = calc.Calc()\n    ... # <AssertPlaceHolder>",
            3,
            5,
        )
    }

    #[test]
    fn test_mask_candidate_restore() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_calc.py");
        fs::write(&path, ORIGINAL).unwrap();

        let mut masked = MaskedFile::apply(&path, &prefix(), "... # <AssertPlaceHolder>").unwrap();
        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("... # <AssertPlaceHolder>"));
        assert!(on_disk.ends_with('\n'));
        assert!(!on_disk.contains("assert c.add"));

        masked.write_candidate("assert c.add(2, 2) == 4").unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("    assert c.add(2, 2) == 4"));

        masked.remask().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), masked.masked());

        masked.restore().unwrap();
        masked.restore().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), ORIGINAL);
    }

    #[test]
    fn test_drop_restores() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_calc.py");
        fs::write(&path, ORIGINAL).unwrap();

        {
            let _masked = MaskedFile::apply(&path, &prefix(), "... # <AssertPlaceHolder>").unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), ORIGINAL);
    }

    #[test]
    fn test_restore_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_calc.py");
        fs::write(&path, ORIGINAL).unwrap();

        let mut masked = MaskedFile::apply(&path, &prefix(), "... # <AssertPlaceHolder>").unwrap();
        let moved = dir.path().join("gone");
        fs::create_dir(&moved).unwrap();
        masked.path = moved.clone();

        match masked.restore() {
            Err(AgentError::RestoreFailed { path, .. }) => assert_eq!(path, moved),
            other => panic!("expected RestoreFailed, got {:?}", other),
        }
        masked.path = path;
    }
}
