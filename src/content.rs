use std::collections::BTreeMap;
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tracing::debug;

use crate::domain::Mode;
use crate::error::BidsError;
use crate::fs_util::write_json_atomic;

/// Opaque key/value storage engine hosted by a content-store component.
pub trait ContentStore: Send + Sync + fmt::Debug {
    /// Opens the store named `logical_name` under `root`. With `create` set a missing
    /// store is initialised, otherwise it is an error.
    fn open_or_create(
        &self,
        root: &Utf8Path,
        logical_name: &str,
        mode: Mode,
        create: bool,
    ) -> Result<Box<dyn ContentHandle>, BidsError>;
}

pub trait ContentHandle: Send + Sync + fmt::Debug {
    fn path(&self) -> &Utf8Path;
    fn get(&self, key: &str) -> Option<&Value>;
    fn insert(&mut self, key: &str, value: Value) -> Result<(), BidsError>;
    fn keys(&self) -> Vec<String>;
}

/// Reference engine: one pretty-printed JSON object per store, rewritten atomically on insert.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonContentStore;

impl ContentStore for JsonContentStore {
    fn open_or_create(
        &self,
        root: &Utf8Path,
        logical_name: &str,
        mode: Mode,
        create: bool,
    ) -> Result<Box<dyn ContentHandle>, BidsError> {
        let path = root.join(logical_name);
        let entries = if path.as_std_path().is_file() {
            let raw = fs::read_to_string(path.as_std_path())
                .map_err(|err| BidsError::ContentStore(format!("read {path}: {err}")))?;
            serde_json::from_str(&raw)
                .map_err(|err| BidsError::ContentStore(format!("parse {path}: {err}")))?
        } else if create {
            if !mode.is_writable() {
                return Err(BidsError::PermissionDenied(path));
            }
            let entries = BTreeMap::new();
            write_json_atomic(&path, &entries)?;
            debug!(path = %path, "created content store");
            entries
        } else {
            return Err(BidsError::ContentStore(format!("store {path} does not exist")));
        };
        Ok(Box::new(JsonContentHandle {
            path,
            mode,
            entries,
        }))
    }
}

#[derive(Debug)]
struct JsonContentHandle {
    path: Utf8PathBuf,
    mode: Mode,
    entries: BTreeMap<String, Value>,
}

impl ContentHandle for JsonContentHandle {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: &str, value: Value) -> Result<(), BidsError> {
        if !self.mode.is_writable() {
            return Err(BidsError::PermissionDenied(self.path.clone()));
        }
        self.entries.insert(key.to_string(), value);
        write_json_atomic(&self.path, &self.entries)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn build_then_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let err = JsonContentStore
            .open_or_create(&root, "c.json", Mode::Write, false)
            .unwrap_err();
        assert_matches!(err, BidsError::ContentStore(_));

        let mut handle = JsonContentStore
            .open_or_create(&root, "c.json", Mode::Write, true)
            .unwrap();
        handle.insert("channels", serde_json::json!(64)).unwrap();

        let mut reopened = JsonContentStore
            .open_or_create(&root, "c.json", Mode::Read, false)
            .unwrap();
        assert_eq!(reopened.get("channels"), Some(&serde_json::json!(64)));
        assert_matches!(
            reopened.insert("x", Value::Null),
            Err(BidsError::PermissionDenied(_))
        );
    }
}
