use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Kwargs, NodeKind, TypeKey, full_name, meta_file_name};
use crate::error::BidsError;
use crate::fs_util::write_json_atomic;
use crate::node::Directory;

pub const META_VERSION: &str = "0.1.0";

/// Sidecar document stored as `<full_name>_meta.json` inside every node directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaInformation {
    #[serde(rename = "Type")]
    pub kind: NodeKind,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "TypeDescriptor", alias = "Python")]
    pub type_descriptor: TypeDescriptor,
    #[serde(flatten)]
    pub extra: Kwargs,
}

impl MetaInformation {
    pub fn new(kind: NodeKind, type_descriptor: TypeDescriptor) -> Self {
        Self {
            kind,
            version: META_VERSION.to_string(),
            type_descriptor,
            extra: Kwargs::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    #[serde(rename = "Module", default)]
    pub module: String,
    #[serde(rename = "ClassNamespace", default)]
    pub namespace: String,
    #[serde(rename = "Class", default)]
    pub class: String,
    #[serde(rename = "ComponentTypes", default)]
    pub component_types: BTreeMap<String, ComponentDescriptor>,
}

impl TypeDescriptor {
    pub fn key(&self) -> TypeKey {
        TypeKey::new(&self.namespace, &self.class)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    #[serde(rename = "Module", default)]
    pub module: String,
    #[serde(rename = "Namespace", default)]
    pub namespace: String,
    #[serde(rename = "Class", default)]
    pub class: String,
    #[serde(rename = "Kwargs", default)]
    pub kwargs: Kwargs,
}

impl ComponentDescriptor {
    pub fn key(&self) -> TypeKey {
        TypeKey::new(&self.namespace, &self.class)
    }
}

pub struct MetaStore;

impl MetaStore {
    pub fn path_for(kind: NodeKind, node_path: &Utf8Path) -> Utf8PathBuf {
        node_path.join(meta_file_name(&full_name(kind, node_path)))
    }

    pub fn exists(path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    pub fn read(path: &Utf8Path) -> Result<MetaInformation, BidsError> {
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BidsError::MetadataNotFound(path.to_path_buf()));
            }
            Err(err) => return Err(BidsError::Filesystem(format!("read {path}: {err}"))),
        };
        serde_json::from_str(&content).map_err(|err| BidsError::MetadataParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Writes through a temporary file in the same directory and renames it into place,
    /// so readers see either the old or the new sidecar.
    pub fn write(path: &Utf8Path, meta: &MetaInformation) -> Result<(), BidsError> {
        write_json_atomic(path, meta)?;
        debug!(path = %path, "wrote metadata sidecar");
        Ok(())
    }

    /// Replaces the node's in-memory metadata with the sidecar on disk.
    pub fn load_into(directory: &mut Directory) -> Result<(), BidsError> {
        let path = directory.meta_path();
        let meta = Self::read(&path)?;
        directory.set_meta_information(meta);
        Ok(())
    }

    pub fn save(directory: &Directory) -> Result<(), BidsError> {
        let path = directory.meta_path();
        if !directory.mode().is_writable() {
            return Err(BidsError::PermissionDenied(path));
        }
        Self::write(&path, directory.meta_information())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_schema() {
        let mut descriptor = TypeDescriptor {
            module: "bids.subjects".to_string(),
            namespace: "bids".to_string(),
            class: "Subject".to_string(),
            component_types: BTreeMap::new(),
        };
        descriptor.component_types.insert(
            "contents".to_string(),
            ComponentDescriptor {
                module: "bids.content".to_string(),
                namespace: "bids".to_string(),
                class: "ContentStore".to_string(),
                kwargs: Kwargs::new(),
            },
        );
        let meta = MetaInformation::new(NodeKind::Subject, descriptor);
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["Type"], "Subject");
        assert_eq!(value["Version"], META_VERSION);
        assert_eq!(value["TypeDescriptor"]["ClassNamespace"], "bids");
        assert_eq!(
            value["TypeDescriptor"]["ComponentTypes"]["contents"]["Class"],
            "ContentStore"
        );
    }

    #[test]
    fn legacy_block_name_is_accepted() {
        let raw = r#"{"Type": "Session", "Version": "0.1.0",
            "Python": {"Module": "ucsfbids.sessions", "ClassNamespace": "ucsfbids", "Class": "Session",
                       "ComponentTypes": {}}}"#;
        let meta: MetaInformation = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.kind, NodeKind::Session);
        assert_eq!(meta.type_descriptor.key(), TypeKey::new("ucsfbids", "Session"));
    }

    #[test]
    fn sidecar_path() {
        let path = MetaStore::path_for(NodeKind::Session, Utf8Path::new("/d/sub-01/ses-02"));
        assert_eq!(path, Utf8PathBuf::from("/d/sub-01/ses-02/sub-01_ses-02_meta.json"));
    }
}
