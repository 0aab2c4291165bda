//! File operations shared by render and extract.
//!
//! - Atomic writes: write to temp file, sync to disk, then rename
//! - Modification times in Unix milliseconds, comparable to model timestamps
//! - Model paths: `/`-separated, relative to the source root

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{Error, Result};
use crate::model::Language;

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file (same path with `.tmp` appended)
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let mut temp_name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Write to temp file
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        // Sync to disk before rename
        writer.get_ref().sync_all()?;
    }

    // Atomic rename
    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Modification time of `path` in Unix milliseconds.
///
/// # Errors
///
/// Returns an error if the metadata cannot be read.
pub fn modified_millis(path: &Path) -> Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    let millis = match modified.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    };
    Ok(millis)
}

/// Model path for a file under `src`: relative, `/`-separated.
///
/// Returns `None` if `path` is not below `src` or is not valid UTF-8.
#[must_use]
pub fn model_path(src: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(src).ok()?;
    let segments = relative
        .components()
        .map(|c| match c {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Validate a caller-supplied model path and give it the language suffix.
///
/// Backslashes are treated as separators; absolute paths and `..`
/// segments are rejected.
///
/// # Errors
///
/// Returns `InvalidArgument` for empty, absolute, or escaping paths.
pub fn normalize_model_path(raw: &str, language: Language) -> Result<String> {
    let unified = raw.trim().replace('\\', "/");
    if unified.is_empty() {
        return Err(Error::InvalidArgument("file path must not be empty".to_string()));
    }
    if unified.starts_with('/') || Path::new(&unified).has_root() {
        return Err(Error::InvalidArgument(format!(
            "file path must be relative to the source root: {raw}"
        )));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(Error::InvalidArgument(format!(
                    "file path must not leave the source root: {raw}"
                )));
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(Error::InvalidArgument(format!("not a file path: {raw}")));
    }

    Ok(language.with_suffix(&segments.join("/")))
}

/// On-disk location of a model path below `dir`.
#[must_use]
pub fn disk_path(dir: &Path, model_path: &str) -> PathBuf {
    model_path
        .split('/')
        .fold(dir.to_path_buf(), |acc, segment| acc.join(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("main.py");

        atomic_write(&path, "import os\n").unwrap();
        atomic_write(&path, "import sys\n").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "import sys\n");
        assert!(!temp_dir.path().join("nested").join("main.py.tmp").exists());
    }

    #[test]
    fn test_modified_millis_tracks_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.py");
        fs::write(&path, "").unwrap();

        let mtime = filetime::FileTime::from_unix_time(1_700_000_000, 250_000_000);
        filetime::set_file_mtime(&path, mtime).unwrap();
        assert_eq!(modified_millis(&path).unwrap(), 1_700_000_000_250);
    }

    #[test]
    fn test_model_path() {
        let src = Path::new("/proj/src");
        assert_eq!(
            model_path(src, Path::new("/proj/src/utils/helpers.py")).as_deref(),
            Some("utils/helpers.py")
        );
        assert_eq!(model_path(src, Path::new("/proj/other.py")), None);
        assert_eq!(model_path(src, src), None);
    }

    #[test]
    fn test_normalize_model_path() {
        assert_eq!(normalize_model_path("utils/helpers", Language::Python).unwrap(), "utils/helpers.py");
        assert_eq!(normalize_model_path("./main.py", Language::Python).unwrap(), "main.py");
        assert_eq!(normalize_model_path("pkg\\mod", Language::Python).unwrap(), "pkg/mod.py");
        assert!(normalize_model_path("../escape.py", Language::Python).is_err());
        assert!(normalize_model_path("/abs/main.py", Language::Python).is_err());
        assert!(normalize_model_path("  ", Language::Python).is_err());
    }

    #[test]
    fn test_disk_path() {
        let path = disk_path(Path::new("/proj/src"), "utils/helpers.py");
        assert_eq!(path, Path::new("/proj/src/utils/helpers.py"));
    }
}
