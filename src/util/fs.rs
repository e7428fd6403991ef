//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Remove a directory and all its contents, if it exists.
///
/// Returns whether anything was removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(path)
        .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    Ok(true)
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Canonicalize a path, but don't fail if it doesn't exist yet.
/// Returns the path as-is if canonicalization fails.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Walk up from `start` looking for `file_name`.
pub fn find_upwards(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".comake/config.toml");

        write_string(&path, "[build]\n").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "[build]\n");
    }

    #[test]
    fn test_remove_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("build");

        assert!(!remove_dir_all_if_exists(&out).unwrap());
        ensure_dir(&out.join("nested")).unwrap();
        assert!(remove_dir_all_if_exists(&out).unwrap());
        assert!(!out.exists());
    }

    #[test]
    fn test_find_upwards() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("src/daemon");
        fs::create_dir_all(&nested).unwrap();
        fs::write(tmp.path().join("Comake.toml"), "").unwrap();

        assert_eq!(
            find_upwards(&nested, "Comake.toml"),
            Some(tmp.path().join("Comake.toml"))
        );
        assert_eq!(find_upwards(&nested, "Missing.toml"), None);
    }
}
