//! Export of a typed hierarchy into an external layout.
//!
//! The engine walks the loaded hierarchy (never a descriptor list) and asks each
//! node's exporter to emit that node into the destination chosen for it; the
//! returned directory becomes the destination root of the node's children.
//! Exporters only read the source nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{Kwargs, NodeKind, TypeKey, merge_kwargs};
use crate::error::BidsError;
use crate::fs_util::{copy_file_atomic, ensure_dir, list_files};
use crate::node::Node;
use crate::registry::TypeRegistry;

pub const DEFAULT_EXPORTER_TAG: &str = "BIDS";
pub const COPY_EXPORTER_NAMESPACE: &str = "bids";
pub const COPY_EXPORTER_CLASS: &str = "Copy";

pub trait Exporter: fmt::Debug {
    /// Emits `node` (not its children) under `destination` and returns the
    /// directory its children should be exported into.
    fn export_node(
        &self,
        node: &dyn Node,
        destination: &Utf8Path,
        report: &mut ExportReport,
    ) -> Result<Utf8PathBuf, BidsError>;
}

pub type ExporterFactory =
    Arc<dyn Fn(&Kwargs) -> Result<Box<dyn Exporter>, BidsError> + Send + Sync>;

#[derive(Clone)]
pub struct ExporterSpec {
    pub label: String,
    pub factory: ExporterFactory,
    pub kwargs: Kwargs,
}

impl ExporterSpec {
    pub fn new(label: impl Into<String>, factory: ExporterFactory, kwargs: Kwargs) -> Self {
        Self {
            label: label.into(),
            factory,
            kwargs,
        }
    }

    pub fn registered(
        registry: &TypeRegistry,
        key: &TypeKey,
        kwargs: Kwargs,
    ) -> Result<Self, BidsError> {
        let factory = registry
            .exporter(key)
            .ok_or_else(|| BidsError::UnknownExporter(key.to_string()))?;
        Ok(Self::new(key.to_string(), factory, kwargs))
    }

    pub fn instantiate(&self, overrides: &Kwargs) -> Result<Box<dyn Exporter>, BidsError> {
        (self.factory)(&merge_kwargs(&self.kwargs, overrides))
    }
}

impl fmt::Debug for ExporterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterSpec")
            .field("label", &self.label)
            .field("kwargs", &self.kwargs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub tool: String,
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub nodes: usize,
    pub files: Vec<Utf8PathBuf>,
}

impl ExportReport {
    pub fn start(source: &Utf8Path, destination: &Utf8Path) -> Self {
        Self {
            tool: format!("bids-tree/{}", env!("CARGO_PKG_VERSION")),
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            nodes: 0,
            files: Vec::new(),
        }
    }

    fn finish(&mut self) {
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

/// Recursive driver. Each node's exporter is looked up under `tag` in the
/// node's exporter table, falling back to `fallback` when the tag is absent.
#[derive(Debug, Clone)]
pub struct ExportEngine {
    tag: String,
    fallback: Option<ExporterSpec>,
    kwargs: Kwargs,
}

impl Default for ExportEngine {
    fn default() -> Self {
        Self::new(DEFAULT_EXPORTER_TAG)
    }
}

impl ExportEngine {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fallback: None,
            kwargs: Kwargs::new(),
        }
    }

    pub fn with_fallback(mut self, spec: ExporterSpec) -> Self {
        self.fallback = Some(spec);
        self
    }

    /// Kwargs passed to every exporter instantiated during the walk.
    pub fn with_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn execute_export(
        &self,
        node: &dyn Node,
        destination: &Utf8Path,
    ) -> Result<ExportReport, BidsError> {
        let mut report = ExportReport::start(node.path(), destination);
        info!(source = %node.path(), destination = %destination, tag = %self.tag, "starting export");
        self.export_tree(node, destination, &mut report)?;
        report.finish();
        info!(nodes = report.nodes, files = report.files.len(), "export finished");
        Ok(report)
    }

    fn export_tree(
        &self,
        node: &dyn Node,
        destination: &Utf8Path,
        report: &mut ExportReport,
    ) -> Result<(), BidsError> {
        let exporter = self.exporter_for(node)?;
        let node_destination = exporter.export_node(node, destination, report)?;
        report.nodes += 1;
        for child in node.children() {
            self.export_tree(child, &node_destination, report)?;
        }
        Ok(())
    }

    fn exporter_for(&self, node: &dyn Node) -> Result<Box<dyn Exporter>, BidsError> {
        let directory = node.directory();
        match directory.exporters().get(&self.tag) {
            Some(spec) => spec.instantiate(&self.kwargs),
            None => match &self.fallback {
                Some(spec) => spec.instantiate(&self.kwargs),
                None => Err(BidsError::UnknownExporter(format!(
                    "{} on {}",
                    self.tag,
                    directory.full_name()
                ))),
            },
        }
    }
}

/// Copies every node's files into a BIDS-shaped destination, optionally renaming subjects.
#[derive(Debug, Clone, Default)]
pub struct CopyExporter {
    name_map: BTreeMap<String, String>,
    include_meta: bool,
}

impl CopyExporter {
    pub fn new(name_map: BTreeMap<String, String>, include_meta: bool) -> Self {
        Self {
            name_map,
            include_meta,
        }
    }

    pub fn type_key() -> TypeKey {
        TypeKey::new(COPY_EXPORTER_NAMESPACE, COPY_EXPORTER_CLASS)
    }

    /// Accepts `name_map` (object of strings) and `include_meta` (bool).
    pub fn from_kwargs(kwargs: &Kwargs) -> Result<Self, BidsError> {
        let mut name_map = BTreeMap::new();
        if let Some(value) = kwargs.get("name_map") {
            let entries = value.as_object().ok_or_else(|| {
                BidsError::InvalidKwargs(format!("name_map must be an object, got {value}"))
            })?;
            for (old, new) in entries {
                let new = new.as_str().ok_or_else(|| {
                    BidsError::InvalidKwargs(format!("name_map.{old} must be a string"))
                })?;
                name_map.insert(old.clone(), new.to_string());
            }
        }
        let include_meta = match kwargs.get("include_meta") {
            None => false,
            Some(value) => value.as_bool().ok_or_else(|| {
                BidsError::InvalidKwargs(format!("include_meta must be a bool, got {value}"))
            })?,
        };
        Ok(Self::new(name_map, include_meta))
    }

    pub fn factory() -> ExporterFactory {
        Arc::new(|kwargs: &Kwargs| -> Result<Box<dyn Exporter>, BidsError> {
            Ok(Box::new(CopyExporter::from_kwargs(kwargs)?) as Box<dyn Exporter>)
        })
    }

    pub fn spec(kwargs: Kwargs) -> ExporterSpec {
        ExporterSpec::new(Self::type_key().to_string(), Self::factory(), kwargs)
    }

    fn subject_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.name_map.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Rewrites a leading `sub-<old>` segment of a file name.
    fn rename(&self, file_name: &str) -> String {
        for (old, new) in &self.name_map {
            let prefix = format!("sub-{old}");
            if let Some(rest) = file_name.strip_prefix(&prefix)
                && (rest.is_empty() || rest.starts_with(['_', '.']))
            {
                return format!("sub-{new}{rest}");
            }
        }
        file_name.to_string()
    }
}

impl Exporter for CopyExporter {
    fn export_node(
        &self,
        node: &dyn Node,
        destination: &Utf8Path,
        report: &mut ExportReport,
    ) -> Result<Utf8PathBuf, BidsError> {
        let directory = node.directory();
        let target = match directory.kind() {
            NodeKind::Dataset => destination.to_path_buf(),
            NodeKind::Subject => destination.join(
                NodeKind::Subject.directory_name(self.subject_name(directory.name())),
            ),
            kind => destination.join(kind.directory_name(directory.name())),
        };
        ensure_dir(&target)?;

        let meta_path = directory.meta_path();
        for file in list_files(directory.path())? {
            let Some(file_name) = file.file_name() else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if file == meta_path && !self.include_meta {
                continue;
            }
            let dest = target.join(self.rename(file_name));
            copy_file_atomic(&file, &dest)?;
            debug!(source = %file, dest = %dest, "exported file");
            report.files.push(dest);
        }
        info!(node = %directory.full_name(), target = %target, "exported node");
        Ok(target)
    }
}
