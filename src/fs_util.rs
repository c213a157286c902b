use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;
use tracing::warn;

use crate::error::BidsError;

pub fn ensure_dir(path: &Utf8Path) -> Result<(), BidsError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| BidsError::Filesystem(format!("create {path}: {err}")))
}

/// Writes `content` to a temporary file next to `path` and renames it over `path`.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), BidsError> {
    let parent = path
        .parent()
        .ok_or_else(|| BidsError::Filesystem(format!("invalid destination path {path}")))?;
    let mut temp = Builder::new()
        .prefix(".bids-tree")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BidsError::Filesystem(format!("create temp in {parent}: {err}")))?;
    temp.write_all(content)
        .map_err(|err| BidsError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| BidsError::Filesystem(format!("persist {path}: {}", err.error)))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), BidsError> {
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| BidsError::Filesystem(err.to_string()))?;
    write_bytes_atomic(path, &content)
}

pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), BidsError> {
    let parent = dest
        .parent()
        .ok_or_else(|| BidsError::Filesystem(format!("invalid destination path {dest}")))?;
    ensure_dir(parent)?;
    let temp = Builder::new()
        .prefix(".bids-tree-file")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BidsError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| BidsError::Filesystem(format!("copy {source}: {err}")))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| BidsError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(())
}

fn list_entries(path: &Utf8Path, want_dirs: bool) -> Result<Vec<Utf8PathBuf>, BidsError> {
    let entries = fs::read_dir(path.as_std_path())
        .map_err(|err| BidsError::Filesystem(format!("read {path}: {err}")))?;
    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| BidsError::Filesystem(err.to_string()))?;
        let file_type = entry
            .file_type()
            .map_err(|err| BidsError::Filesystem(err.to_string()))?;
        if file_type.is_dir() != want_dirs || (!want_dirs && !file_type.is_file()) {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(item) => items.push(item),
            Err(raw) => warn!(path = %raw.display(), "skipping non UTF-8 entry"),
        }
    }
    items.sort();
    Ok(items)
}

/// Immediate subdirectories, sorted by name.
pub fn list_dirs(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BidsError> {
    list_entries(path, true)
}

/// Immediate regular files, sorted by name.
pub fn list_files(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BidsError> {
    list_entries(path, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let target = root.join("value.json");
        write_json_atomic(&target, &serde_json::json!({"a": 1})).unwrap();
        write_json_atomic(&target, &serde_json::json!({"a": 2})).unwrap();
        let raw = fs::read_to_string(target.as_std_path()).unwrap();
        assert!(raw.contains('2'));
        assert_eq!(list_files(&root).unwrap(), vec![target]);
    }
}
