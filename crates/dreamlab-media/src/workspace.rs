//! Scoped scratch directory for composition runs.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::MediaResult;

/// A temp directory that lives for one composition and is removed on
/// drop, success or failure alike.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> MediaResult<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("dreamlab-stitch-").tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a named scratch file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_is_removed_on_drop() {
        let path;
        {
            let ws = Workspace::create().unwrap();
            path = ws.path().to_path_buf();
            std::fs::write(ws.file("scratch.txt"), "x").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
