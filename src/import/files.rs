use std::sync::Arc;

use camino::Utf8Path;
use tracing::debug;

use crate::component::{Component, ContentStoreComponent};
use crate::error::BidsError;
use crate::fs_util::copy_file_atomic;
use crate::node::Directory;
use crate::tabular::TableReader;

/// Ingests one external file into the node currently being imported.
pub trait FileImport: Send + Sync {
    fn describe(&self) -> String;

    /// Fails when `source` cannot be read. Existing content is kept unless
    /// `override_existing` is set.
    fn import_file(
        &self,
        source: &Utf8Path,
        node: &mut Directory,
        override_existing: bool,
    ) -> Result<(), BidsError>;
}

/// Copies the source file into the node directory. `target` may use the
/// `{full_name}` and `{name}` placeholders and defaults to the source file name.
#[derive(Debug, Clone, Default)]
pub struct CopyFile {
    pub target: Option<String>,
}

impl CopyFile {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }

    fn target_name(&self, source: &Utf8Path, node: &Directory) -> Result<String, BidsError> {
        match &self.target {
            Some(template) => Ok(template
                .replace("{full_name}", &node.full_name())
                .replace("{name}", node.name())),
            None => source
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| BidsError::Filesystem(format!("{source} has no file name"))),
        }
    }
}

impl FileImport for CopyFile {
    fn describe(&self) -> String {
        match &self.target {
            Some(target) => format!("copy -> {target}"),
            None => "copy".to_string(),
        }
    }

    fn import_file(
        &self,
        source: &Utf8Path,
        node: &mut Directory,
        override_existing: bool,
    ) -> Result<(), BidsError> {
        if !source.as_std_path().is_file() {
            return Err(BidsError::Filesystem(format!(
                "source {source} is not a readable file"
            )));
        }
        let dest = node.path().join(self.target_name(source, node)?);
        if dest.as_std_path().exists() && !override_existing {
            debug!(dest = %dest, "destination exists, keeping it");
            return Ok(());
        }
        if !node.mode().is_writable() {
            return Err(BidsError::PermissionDenied(dest));
        }
        copy_file_atomic(source, &dest)
    }
}

/// Reads a table and stores its rows under `key` in a content-store component.
pub struct TableIntoContents {
    pub reader: Arc<dyn TableReader>,
    pub component: String,
    pub key: String,
}

impl FileImport for TableIntoContents {
    fn describe(&self) -> String {
        format!("table -> {}[{}]", self.component, self.key)
    }

    fn import_file(
        &self,
        source: &Utf8Path,
        node: &mut Directory,
        override_existing: bool,
    ) -> Result<(), BidsError> {
        let table = self.reader.read_table(source)?;
        node.with_component_mut::<ContentStoreComponent, _>(&self.component, |store, host| {
            if store.handle().is_none() {
                store.build(host)?;
            }
            let handle = store.handle_mut().ok_or_else(|| {
                BidsError::ContentStore(format!("store of {} is not open", host.full_name))
            })?;
            if handle.get(&self.key).is_some() && !override_existing {
                debug!(key = %self.key, "content key exists, keeping it");
                return Ok(());
            }
            handle.insert(&self.key, table.to_records())
        })
    }
}
