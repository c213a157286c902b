//! Recursive import of an external dataset tree into the typed hierarchy.
//!
//! Importers are driven by explicit descriptor lists rather than by scanning the
//! source tree: [`FileMap`]s ingest files into the node being imported, and
//! [`InnerMap`]s materialise child nodes and run an importer against a sub-path of
//! the source for each of them.

pub mod files;

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::config::ConfigLoader;
use crate::domain::{Kwargs, TypeKey, merge_kwargs};
use crate::error::BidsError;
use crate::meta::MetaStore;
use crate::node::{Node, NodeArgs};
use crate::registry::TypeRegistry;

pub use files::{CopyFile, FileImport, TableIntoContents};

/// Importer-table tag used by the built-in classes.
pub const DEFAULT_IMPORTER_TAG: &str = "BIDS";
pub const STRUCTURED_IMPORTER_NAMESPACE: &str = "bids";
pub const STRUCTURED_IMPORTER_CLASS: &str = "Structured";

pub trait Importer: fmt::Debug {
    fn execute_import(
        &self,
        node: &mut dyn Node,
        path: &Utf8Path,
        options: &ImportOptions,
    ) -> Result<(), BidsError>;
}

pub type ImporterFactory =
    Arc<dyn Fn(&TypeRegistry, &Kwargs) -> Result<Box<dyn Importer>, BidsError> + Send + Sync>;

/// An importer type together with its default kwargs.
#[derive(Clone)]
pub struct ImporterSpec {
    pub label: String,
    pub factory: ImporterFactory,
    pub kwargs: Kwargs,
}

impl ImporterSpec {
    pub fn new(label: impl Into<String>, factory: ImporterFactory, kwargs: Kwargs) -> Self {
        Self {
            label: label.into(),
            factory,
            kwargs,
        }
    }

    /// Spec for an importer registered under `key`.
    pub fn registered(
        registry: &TypeRegistry,
        key: &TypeKey,
        kwargs: Kwargs,
    ) -> Result<Self, BidsError> {
        let factory = registry
            .importer(key)
            .ok_or_else(|| BidsError::UnknownImporter(key.to_string()))?;
        Ok(Self::new(key.to_string(), factory, kwargs))
    }

    pub fn instantiate(
        &self,
        registry: &TypeRegistry,
        overrides: &Kwargs,
    ) -> Result<Box<dyn Importer>, BidsError> {
        (self.factory)(registry, &merge_kwargs(&self.kwargs, overrides))
    }
}

impl fmt::Debug for ImporterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImporterSpec")
            .field("label", &self.label)
            .field("kwargs", &self.kwargs)
            .finish_non_exhaustive()
    }
}

/// A single external file and the operation that ingests it.
#[derive(Clone)]
pub struct FileMap {
    /// Path fragment relative to the import source root.
    pub source: Utf8PathBuf,
    pub operation: Arc<dyn FileImport>,
}

impl fmt::Debug for FileMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMap")
            .field("source", &self.source)
            .field("operation", &self.operation.describe())
            .finish()
    }
}

/// How to materialise one child node and which importer to run for it.
#[derive(Debug, Clone)]
pub struct InnerMap {
    /// Child name; the child kind's directory prefix is stripped if present.
    pub name: String,
    /// Class hint used when the child has to be created.
    pub class: Option<TypeKey>,
    pub kwargs: Kwargs,
    /// Tag looked up in the child's importer table when no importer is given.
    pub inner_name: String,
    /// Source sub-path for the child, defaults to `name`.
    pub stem: Option<String>,
    pub importer: Option<ImporterSpec>,
    pub importer_kwargs: Kwargs,
    pub override_existing: bool,
}

impl InnerMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: None,
            kwargs: Kwargs::new(),
            inner_name: DEFAULT_IMPORTER_TAG.to_string(),
            stem: None,
            importer: None,
            importer_kwargs: Kwargs::new(),
            override_existing: false,
        }
    }

    pub fn with_class(mut self, class: TypeKey) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = Some(stem.into());
        self
    }

    pub fn with_importer(mut self, importer: ImporterSpec) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn with_importer_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.importer_kwargs = kwargs;
        self
    }

    pub fn overriding(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    fn source_path(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join(self.stem.as_deref().unwrap_or(&self.name))
    }
}

/// Which descriptor list a phase runs with.
#[derive(Debug, Clone)]
pub enum MapSelection<T> {
    /// The importer's registered defaults.
    Default,
    /// Skip the phase.
    Skip,
    Explicit(Vec<T>),
}

impl<T> Default for MapSelection<T> {
    fn default() -> Self {
        MapSelection::Default
    }
}

impl<T> From<bool> for MapSelection<T> {
    fn from(value: bool) -> Self {
        if value {
            MapSelection::Default
        } else {
            MapSelection::Skip
        }
    }
}

impl<T> From<Vec<T>> for MapSelection<T> {
    fn from(value: Vec<T>) -> Self {
        MapSelection::Explicit(value)
    }
}

impl<T> MapSelection<T> {
    fn select<'a>(&'a self, defaults: &'a [T]) -> &'a [T] {
        match self {
            MapSelection::Default => defaults,
            MapSelection::Skip => &[],
            MapSelection::Explicit(items) => items,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub file_maps: MapSelection<FileMap>,
    pub inner_maps: MapSelection<InnerMap>,
    /// Caller override; when unset each inner map's own flag applies.
    pub override_existing: Option<bool>,
}

impl ImportOptions {
    pub fn overriding(override_existing: bool) -> Self {
        Self {
            override_existing: Some(override_existing),
            ..Self::default()
        }
    }
}

/// The generic walker shared by every importer.
#[derive(Debug, Clone)]
pub struct ImportEngine {
    default_inner: ImporterSpec,
}

impl ImportEngine {
    pub fn new(default_inner: ImporterSpec) -> Self {
        Self { default_inner }
    }

    pub fn default_inner(&self) -> &ImporterSpec {
        &self.default_inner
    }

    /// Makes sure the node directory and its own sidecar exist, without building children.
    pub fn ensure_shell(node: &mut dyn Node) -> Result<(), BidsError> {
        node.create(false)?;
        if !MetaStore::exists(&node.directory().meta_path()) {
            node.directory_mut().build_self()?;
        }
        Ok(())
    }

    pub fn import_files(
        node: &mut dyn Node,
        path: &Utf8Path,
        file_maps: &[FileMap],
        override_existing: bool,
    ) -> Result<(), BidsError> {
        for map in file_maps {
            let source = path.join(&map.source);
            debug!(node = %node.directory().full_name(), source = %source,
                operation = %map.operation.describe(), "importing file");
            map.operation
                .import_file(&source, node.directory_mut(), override_existing)
                .map_err(|err| BidsError::import_item(map.source.as_str(), &source, err))?;
        }
        Ok(())
    }

    pub fn import_children(
        &self,
        node: &mut dyn Node,
        path: &Utf8Path,
        inner_maps: &[InnerMap],
        override_existing: Option<bool>,
    ) -> Result<(), BidsError> {
        if inner_maps.is_empty() {
            return Ok(());
        }
        let kind = node.directory().kind();
        let child_kind = kind.child_kind().ok_or_else(|| {
            BidsError::Configuration(format!("{kind} nodes cannot hold imported children"))
        })?;
        let registry = node.directory().registry().clone();

        for map in inner_maps {
            let name = child_kind.normalize_name(&map.name).to_string();
            let source = map.source_path(path);

            if !node.has_child(&name) {
                let mut args = NodeArgs::child().with_kwargs(map.kwargs.clone());
                if let Some(class) = &map.class {
                    args = args.with_class(class.clone());
                }
                node.create_child(Some(&name), args)
                    .map_err(|err| BidsError::import_item(&map.name, &source, err))?;
            }
            let child = node.child_mut(&name).ok_or_else(|| {
                BidsError::import_item(
                    &map.name,
                    &source,
                    BidsError::Configuration(format!("child `{name}` missing after creation")),
                )
            })?;

            let spec = match &map.importer {
                Some(spec) => spec.clone(),
                None => child
                    .directory()
                    .importers()
                    .get(&map.inner_name)
                    .cloned()
                    .unwrap_or_else(|| self.default_inner.clone()),
            };
            let importer = spec
                .instantiate(&registry, &map.importer_kwargs)
                .map_err(|err| BidsError::import_item(&map.name, &source, err))?;

            let effective = override_existing.unwrap_or(map.override_existing);
            info!(child = %name, importer = %spec.label, source = %source, override_existing = effective,
                "importing child");
            importer
                .execute_import(child, &source, &ImportOptions::overriding(effective))
                .map_err(|err| BidsError::import_item(&map.name, &source, err))?;
        }
        Ok(())
    }

    /// Node shell first, then the node's own files, then its children.
    pub fn execute_import(
        &self,
        node: &mut dyn Node,
        path: &Utf8Path,
        file_maps: &[FileMap],
        inner_maps: &[InnerMap],
        override_existing: Option<bool>,
    ) -> Result<(), BidsError> {
        Self::ensure_shell(node)?;
        Self::import_files(node, path, file_maps, override_existing.unwrap_or(false))?;
        self.import_children(node, path, inner_maps, override_existing)
    }
}

/// Importer whose default descriptor lists come from an import plan (see [`crate::config`]).
#[derive(Debug, Clone)]
pub struct StructuredImporter {
    file_maps: Vec<FileMap>,
    inner_maps: Vec<InnerMap>,
    override_existing: Option<bool>,
    engine: ImportEngine,
}

impl StructuredImporter {
    pub fn new(file_maps: Vec<FileMap>, inner_maps: Vec<InnerMap>) -> Self {
        Self {
            file_maps,
            inner_maps,
            override_existing: None,
            engine: ImportEngine::new(Self::spec(Kwargs::new())),
        }
    }

    pub fn type_key() -> TypeKey {
        TypeKey::new(STRUCTURED_IMPORTER_NAMESPACE, STRUCTURED_IMPORTER_CLASS)
    }

    pub fn factory() -> ImporterFactory {
        Arc::new(|registry: &TypeRegistry, kwargs: &Kwargs| -> Result<Box<dyn Importer>, BidsError> {
            Ok(Box::new(StructuredImporter::from_kwargs(registry, kwargs)?) as Box<dyn Importer>)
        })
    }

    pub fn spec(kwargs: Kwargs) -> ImporterSpec {
        ImporterSpec::new(Self::type_key().to_string(), Self::factory(), kwargs)
    }

    /// Kwargs follow the import plan schema.
    pub fn from_kwargs(registry: &TypeRegistry, kwargs: &Kwargs) -> Result<Self, BidsError> {
        let plan = ConfigLoader::plan_from_kwargs(kwargs)?;
        let resolved = ConfigLoader::resolve_plan(plan, registry)?;
        Ok(Self {
            file_maps: resolved.file_maps,
            inner_maps: resolved.inner_maps,
            override_existing: resolved.override_existing,
            engine: ImportEngine::new(Self::spec(Kwargs::new())),
        })
    }

    pub fn with_engine(mut self, engine: ImportEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn file_maps(&self) -> &[FileMap] {
        &self.file_maps
    }

    pub fn inner_maps(&self) -> &[InnerMap] {
        &self.inner_maps
    }
}

impl Importer for StructuredImporter {
    fn execute_import(
        &self,
        node: &mut dyn Node,
        path: &Utf8Path,
        options: &ImportOptions,
    ) -> Result<(), BidsError> {
        let file_maps = options.file_maps.select(&self.file_maps);
        let inner_maps = options.inner_maps.select(&self.inner_maps);
        let override_existing = options.override_existing.or(self.override_existing);
        self.engine
            .execute_import(node, path, file_maps, inner_maps, override_existing)
    }
}

/// Runs the importer registered under `tag` on `node`.
pub fn import_with(
    node: &mut dyn Node,
    tag: &str,
    path: &Utf8Path,
    options: &ImportOptions,
) -> Result<(), BidsError> {
    let importer = node.directory().create_importer(tag, &Kwargs::new())?;
    info!(node = %node.directory().full_name(), tag, source = %path, "starting import");
    importer.execute_import(node, path, options)
}
