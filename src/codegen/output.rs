//! Writing generated files
//!
//! Regeneration is destructive: every file with the target extension at the
//! top level of the output directory is removed before the new files are
//! written. Each file is written to a temporary sibling and renamed into
//! place, so a file is either fully written or absent. A failure stops the
//! run; files written before it stay on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::DtoGenError;

const TEMP_SUFFIX: &str = "tmp";

/// Remove previously generated files, then write `files` (name, contents)
pub fn replace_generated(
    dir: &Path,
    extension: &str,
    files: &[(String, String)],
) -> Result<Vec<PathBuf>, DtoGenError> {
    fs::create_dir_all(dir)?;

    let removed = remove_generated(dir, extension)?;
    info!(path = ?dir, removed = ?removed, "Removed previously generated files");

    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        written.push(write_file(dir, name, contents)?);
    }
    Ok(written)
}

/// Delete every `*.<extension>` file directly inside `dir`, along with
/// `*.<extension>.tmp` files left behind by an interrupted run
pub fn remove_generated(dir: &Path, extension: &str) -> Result<usize, DtoGenError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_generated(&path, extension) {
            debug!(path = ?path, "Removing generated file");
            fs::remove_file(&path).map_err(|e| {
                error!(path = ?path, error = ?e, "Failed to remove generated file");
                e
            })?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn is_generated(path: &Path, extension: &str) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let name = name
        .strip_suffix(TEMP_SUFFIX)
        .and_then(|stem| stem.strip_suffix('.'))
        .unwrap_or(name);
    Path::new(name).extension().is_some_and(|ext| ext == extension)
}

/// Write one file through a temporary sibling and an atomic rename
pub fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, DtoGenError> {
    let path = dir.join(name);
    let temp = dir.join(format!("{}.{}", name, TEMP_SUFFIX));

    fs::write(&temp, contents).map_err(|e| {
        error!(path = ?temp, error = ?e, "Failed to write generated file");
        e
    })?;
    if let Err(e) = fs::rename(&temp, &path) {
        error!(path = ?path, error = ?e, "Failed to move generated file into place");
        // best effort: the temp file is not part of the output
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }

    debug!(path = ?path, bytes = ?contents.len(), "Generated file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_generated_clears_only_extension() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();
        fs::write(dir.join("stale.go"), "package stale\n").unwrap();
        fs::write(dir.join("db.json"), "{}").unwrap();
        fs::write(dir.join("custom_queries.conf"), "").unwrap();
        fs::create_dir_all(dir.join("nested.go")).unwrap();

        let files = vec![("users.go".to_string(), "package shop\n".to_string())];
        let written = replace_generated(dir, "go", &files).unwrap();

        assert_eq!(written, vec![dir.join("users.go")]);
        assert!(!dir.join("stale.go").exists());
        assert!(dir.join("db.json").exists());
        assert!(dir.join("custom_queries.conf").exists());
        assert!(dir.join("nested.go").is_dir());
        assert!(!dir.join("users.go.tmp").exists());
        assert_eq!(fs::read_to_string(dir.join("users.go")).unwrap(), "package shop\n");
    }

    #[test]
    fn test_remove_generated_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();
        fs::write(dir.join("a.py"), "").unwrap();
        fs::write(dir.join("b.py"), "").unwrap();
        fs::write(dir.join("c.go"), "").unwrap();

        assert_eq!(remove_generated(dir, "py").unwrap(), 2);
        assert!(dir.join("c.go").exists());
    }

    #[test]
    fn test_remove_generated_clears_interrupted_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();
        fs::write(dir.join("orders.go.tmp"), "package shop").unwrap();
        fs::write(dir.join("orders.py.tmp"), "").unwrap();
        fs::write(dir.join("notes.tmp"), "").unwrap();

        assert_eq!(remove_generated(dir, "go").unwrap(), 1);
        assert!(!dir.join("orders.go.tmp").exists());
        assert!(dir.join("orders.py.tmp").exists());
        assert!(dir.join("notes.tmp").exists());
    }

    #[test]
    fn test_write_file_fails_for_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("missing").join("deeper");
        let err = write_file(&dir, "users.go", "").unwrap_err();
        assert!(matches!(err, DtoGenError::Output(_)));
    }
}
