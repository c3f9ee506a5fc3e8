//! Helpers shared by unit tests and the integration suite.
//!
//! `tests/integration/test_utils.rs` includes this file by path, so it must
//! only depend on std.

use std::path::{Path, PathBuf};

/// A fresh directory under the system temp dir, removed on drop.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// `name` must be unique across the tests of one test binary; the crate
    /// name and process id are added.
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "{}_{}_{}",
            env!("CARGO_CRATE_NAME"),
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let dir = ScratchDir::new("scratch_drop");
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(env!("CARGO_CRATE_NAME")));

        std::fs::write(path.join("leftover.txt"), b"x").unwrap();
        drop(dir);
        assert!(!path.exists());
    }
}
