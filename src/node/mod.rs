//! Typed directory nodes: dataset, subject, session and modality.
//!
//! Every node wraps a [`Directory`], the kind-independent core that owns the
//! path, mode, sidecar metadata, components and importer/exporter tables.
//! The concrete class of a node is looked up in the [`TypeRegistry`] from its
//! sidecar when one exists, so callers only name the kind they expect.

mod any;
mod dataset;
mod modality;
mod session;
mod subject;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, warn};

use crate::builtin;
use crate::component::{Component, ComponentHost, ComponentType};
use crate::domain::{
    Kwargs, Mode, NodeKind, NodeLocation, TypeKey, full_name, merge_kwargs, resolve_location,
};
use crate::error::BidsError;
use crate::export::{Exporter, ExporterSpec};
use crate::fs_util::{ensure_dir, list_dirs};
use crate::import::{Importer, ImporterSpec};
use crate::layered::LayeredTable;
use crate::meta::{MetaInformation, MetaStore, TypeDescriptor};
use crate::registry::{NodeClass, NodeEntry, TypeRegistry};

pub use any::AnyNode;
pub use dataset::Dataset;
pub use modality::Modality;
pub use session::Session;
pub use subject::Subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeState {
    /// Path resolved, nothing verified on disk.
    Bound,
    /// Metadata and children read from disk.
    Loaded,
    /// Directory and metadata written, children built.
    Built,
}

/// Construction arguments shared by every node kind.
#[derive(Debug, Clone)]
pub struct NodeArgs {
    pub path: Option<Utf8PathBuf>,
    pub name: Option<String>,
    pub parent_path: Option<Utf8PathBuf>,
    /// Class used when no sidecar exists yet.
    pub class: Option<TypeKey>,
    /// Defaults to read-only, or to the parent's mode for children.
    pub mode: Option<Mode>,
    pub create: bool,
    pub build: bool,
    pub load: bool,
    pub children_to_load: Option<Vec<String>>,
    pub kwargs: Kwargs,
    pub component_kwargs: BTreeMap<String, Kwargs>,
    pub component_types: BTreeMap<String, ComponentType>,
}

impl Default for NodeArgs {
    fn default() -> Self {
        Self {
            path: None,
            name: None,
            parent_path: None,
            class: None,
            mode: None,
            create: false,
            build: true,
            load: true,
            children_to_load: None,
            kwargs: Kwargs::new(),
            component_kwargs: BTreeMap::new(),
            component_types: BTreeMap::new(),
        }
    }
}

impl NodeArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn named(parent_path: impl Into<Utf8PathBuf>, name: impl Into<String>) -> Self {
        Self {
            parent_path: Some(parent_path.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Defaults for a new child: create and build it, do not scan for grandchildren.
    pub fn child() -> Self {
        Self {
            create: true,
            load: false,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn creating(mut self) -> Self {
        self.create = true;
        self
    }

    pub fn with_build(mut self, build: bool) -> Self {
        self.build = build;
        self
    }

    pub fn with_load(mut self, load: bool) -> Self {
        self.load = load;
        self
    }

    pub fn with_class(mut self, class: TypeKey) -> Self {
        self.class = Some(class);
        self
    }

    pub fn only_children(mut self, names: Vec<String>) -> Self {
        self.children_to_load = Some(names);
        self
    }

    pub fn with_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_component_kwargs(mut self, name: &str, kwargs: Kwargs) -> Self {
        self.component_kwargs.insert(name.to_string(), kwargs);
        self
    }

    pub fn with_component_type(mut self, name: &str, component_type: ComponentType) -> Self {
        self.component_types.insert(name.to_string(), component_type);
        self
    }

    pub fn location(&self, kind: NodeKind) -> Result<NodeLocation, BidsError> {
        resolve_location(
            kind,
            self.path.as_deref(),
            self.name.as_deref(),
            self.parent_path.as_deref(),
        )
    }

    fn for_child_of(mut self, parent: &Directory, name: &str) -> Self {
        self.path = None;
        self.name = Some(name.to_string());
        self.parent_path = Some(parent.path().to_path_buf());
        if self.mode.is_none() {
            self.mode = Some(parent.mode());
        }
        self
    }
}

/// The kind-independent part of every node.
#[derive(Debug)]
pub struct Directory {
    class: Arc<NodeClass>,
    registry: Arc<TypeRegistry>,
    path: Utf8PathBuf,
    name: String,
    mode: Mode,
    kwargs: Kwargs,
    meta: MetaInformation,
    component_types: BTreeMap<String, ComponentType>,
    /// Caller-supplied component kwargs, the only kwargs persisted to `ComponentTypes`.
    component_kwargs: BTreeMap<String, Kwargs>,
    components: BTreeMap<String, Box<dyn Component>>,
    importers: LayeredTable<ImporterSpec>,
    exporters: LayeredTable<ExporterSpec>,
    state: NodeState,
}

impl Directory {
    pub fn new(
        registry: Arc<TypeRegistry>,
        entry: NodeEntry,
        location: NodeLocation,
        mode: Mode,
        kwargs: &Kwargs,
    ) -> Self {
        let class = entry.class;
        Self {
            meta: class.default_meta(),
            importers: LayeredTable::new(class.importers().clone()),
            exporters: LayeredTable::new(class.exporters().clone()),
            kwargs: merge_kwargs(&entry.kwargs, kwargs),
            class,
            registry,
            path: location.path,
            name: location.name,
            mode,
            component_types: BTreeMap::new(),
            component_kwargs: BTreeMap::new(),
            components: BTreeMap::new(),
            state: NodeState::Bound,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.class.kind()
    }

    pub fn class(&self) -> &Arc<NodeClass> {
        &self.class
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> String {
        full_name(self.kind(), &self.path)
    }

    pub fn meta_path(&self) -> Utf8PathBuf {
        MetaStore::path_for(self.kind(), &self.path)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, NodeState::Loaded | NodeState::Built)
    }

    pub fn exists(&self) -> bool {
        self.path.as_std_path().is_dir()
    }

    pub fn meta_information(&self) -> &MetaInformation {
        &self.meta
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.meta.type_descriptor
    }

    pub(crate) fn set_meta_information(&mut self, meta: MetaInformation) {
        self.meta = meta;
    }

    pub fn save(&self) -> Result<(), BidsError> {
        MetaStore::save(self)
    }

    // Components

    pub fn components(&self) -> &BTreeMap<String, Box<dyn Component>> {
        &self.components
    }

    pub fn component_types(&self) -> &BTreeMap<String, ComponentType> {
        &self.component_types
    }

    pub fn component<T: Component + 'static>(&self, name: &str) -> Option<&T> {
        self.components.get(name)?.as_any().downcast_ref()
    }

    pub fn component_mut<T: Component + 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.components.get_mut(name)?.as_any_mut().downcast_mut()
    }

    /// Runs `f` with a component and the host view of this node.
    pub fn with_component_mut<T: Component + 'static, R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut T, &ComponentHost<'_>) -> Result<R, BidsError>,
    ) -> Result<R, BidsError> {
        let full_name = self.full_name();
        let host = ComponentHost {
            path: &self.path,
            full_name: &full_name,
            mode: self.mode,
        };
        let component = self
            .components
            .get_mut(name)
            .and_then(|component| component.as_any_mut().downcast_mut::<T>())
            .ok_or_else(|| {
                BidsError::Configuration(format!("{full_name} has no `{name}` component"))
            })?;
        f(component, &host)
    }

    pub fn dispatch_component_types(&self) -> BTreeMap<String, ComponentType> {
        self.registry
            .dispatch_component_types(&self.meta.type_descriptor.component_types)
    }

    pub(crate) fn construct_components(
        &mut self,
        types: BTreeMap<String, ComponentType>,
        component_kwargs: &BTreeMap<String, Kwargs>,
    ) -> Result<(), BidsError> {
        self.components.clear();
        for (name, component_type) in &types {
            let overrides = component_kwargs.get(name).cloned().unwrap_or_default();
            self.components
                .insert(name.clone(), component_type.instantiate(&overrides)?);
        }
        self.component_types = types;
        self.component_kwargs = component_kwargs.clone();
        Ok(())
    }

    /// Attaches a new component and records its type in the in-memory metadata.
    /// On a node already on disk the component is built right away, so a later
    /// `save` leaves a node that reopens; the sidecar is only written on save or build.
    pub fn attach_component(
        &mut self,
        name: &str,
        component_type: ComponentType,
        overrides: &Kwargs,
    ) -> Result<(), BidsError> {
        let mut component = component_type.instantiate(overrides)?;
        if self.exists() {
            let full_name = self.full_name();
            let host = ComponentHost {
                path: &self.path,
                full_name: &full_name,
                mode: self.mode,
            };
            component.build(&host)?;
        }
        self.components.insert(name.to_string(), component);
        self.component_types.insert(name.to_string(), component_type);
        self.component_kwargs
            .insert(name.to_string(), overrides.clone());
        self.update_component_types();
        Ok(())
    }

    /// Writes each component's type into `ComponentTypes`, updating existing
    /// entries field by field. Only caller-supplied kwargs are merged in, so
    /// registry defaults are never frozen into the sidecar.
    pub fn update_component_types(&mut self) {
        for (name, component) in &self.components {
            let key = component.key();
            let entry = self
                .meta
                .type_descriptor
                .component_types
                .entry(name.clone())
                .or_default();
            entry.module = component.module().to_string();
            entry.namespace = key.namespace().to_string();
            entry.class = key.name().to_string();
            if let Some(supplied) = self.component_kwargs.get(name) {
                entry.kwargs = merge_kwargs(&entry.kwargs, supplied);
            }
        }
    }

    // Lifecycle

    pub(crate) fn make_dir(&mut self) -> Result<(), BidsError> {
        if self.exists() {
            return Ok(());
        }
        if !self.mode.is_writable() {
            return Err(BidsError::PermissionDenied(self.path.clone()));
        }
        ensure_dir(&self.path)
    }

    /// Writes this node's metadata and builds its components; children are untouched.
    pub fn build_self(&mut self) -> Result<(), BidsError> {
        self.update_component_types();
        MetaStore::save(self)?;
        let full_name = self.full_name();
        let host = ComponentHost {
            path: &self.path,
            full_name: &full_name,
            mode: self.mode,
        };
        for component in self.components.values_mut() {
            component.build(&host)?;
        }
        self.state = NodeState::Built;
        debug!(node = %full_name, class = %self.class.key(), "built node");
        Ok(())
    }

    /// Reads this node's metadata and loads its components; children are untouched.
    pub fn load_self(&mut self) -> Result<(), BidsError> {
        MetaStore::load_into(self)?;
        let full_name = self.full_name();
        let host = ComponentHost {
            path: &self.path,
            full_name: &full_name,
            mode: self.mode,
        };
        for component in self.components.values_mut() {
            component.load(&host)?;
        }
        self.state = NodeState::Loaded;
        debug!(node = %full_name, class = %self.class.key(), "loaded node");
        Ok(())
    }

    // Importers / exporters

    pub fn importers(&self) -> &LayeredTable<ImporterSpec> {
        &self.importers
    }

    pub fn add_importer(&mut self, tag: &str, spec: ImporterSpec, overwrite: bool) -> bool {
        self.importers.insert(tag, spec, overwrite)
    }

    pub fn require_importer(
        &mut self,
        tag: &str,
        spec: ImporterSpec,
        overwrite: bool,
    ) -> Result<Box<dyn Importer>, BidsError> {
        self.importers.insert(tag, spec, overwrite);
        self.create_importer(tag, &Kwargs::new())
    }

    pub fn create_importer(&self, tag: &str, kwargs: &Kwargs) -> Result<Box<dyn Importer>, BidsError> {
        let spec = self.importers.get(tag).ok_or_else(|| {
            BidsError::UnknownImporter(format!("{tag} on {}", self.full_name()))
        })?;
        spec.instantiate(&self.registry, kwargs)
    }

    pub fn exporters(&self) -> &LayeredTable<ExporterSpec> {
        &self.exporters
    }

    pub fn add_exporter(&mut self, tag: &str, spec: ExporterSpec, overwrite: bool) -> bool {
        self.exporters.insert(tag, spec, overwrite)
    }

    pub fn require_exporter(
        &mut self,
        tag: &str,
        spec: ExporterSpec,
        overwrite: bool,
    ) -> Result<Box<dyn Exporter>, BidsError> {
        self.exporters.insert(tag, spec, overwrite);
        self.create_exporter(tag, &Kwargs::new())
    }

    pub fn create_exporter(&self, tag: &str, kwargs: &Kwargs) -> Result<Box<dyn Exporter>, BidsError> {
        let spec = self.exporters.get(tag).ok_or_else(|| {
            BidsError::UnknownExporter(format!("{tag} on {}", self.full_name()))
        })?;
        spec.instantiate(kwargs)
    }
}

/// Behaviour shared by every node kind. Kinds override the child hooks.
pub trait Node {
    fn directory(&self) -> &Directory;
    fn directory_mut(&mut self) -> &mut Directory;

    fn path(&self) -> &Utf8Path {
        self.directory().path()
    }

    fn name(&self) -> &str {
        self.directory().name()
    }

    /// Constructs (without creating) the class's default children.
    fn construct_default_children(&mut self) -> Result<(), BidsError> {
        Ok(())
    }

    fn build_children(&mut self) -> Result<(), BidsError> {
        Ok(())
    }

    fn load_children(&mut self, _names: Option<&[String]>, _load: bool) -> Result<(), BidsError> {
        Ok(())
    }

    fn has_child(&self, _name: &str) -> bool {
        false
    }

    fn child_mut(&mut self, _name: &str) -> Option<&mut dyn Node> {
        None
    }

    fn children(&self) -> Vec<&dyn Node> {
        Vec::new()
    }

    fn create_child(
        &mut self,
        _name: Option<&str>,
        _args: NodeArgs,
    ) -> Result<&mut dyn Node, BidsError> {
        Err(BidsError::Configuration(format!(
            "{} nodes have no children",
            self.directory().kind()
        )))
    }

    /// Makes the directory if absent, then builds when asked.
    fn create(&mut self, build: bool) -> Result<(), BidsError> {
        self.directory_mut().make_dir()?;
        if build {
            self.build()?;
        }
        Ok(())
    }

    fn build(&mut self) -> Result<(), BidsError> {
        self.directory_mut().build_self()?;
        self.build_children()
    }

    /// Reads metadata, then discovers children, optionally only those whose
    /// directory name contains one of `names`.
    fn load(&mut self, names: Option<&[String]>) -> Result<(), BidsError> {
        self.directory_mut().load_self()?;
        self.load_children(names, true)
    }
}

/// Picks the registry entry for a node: the sidecar's descriptor when one exists,
/// otherwise the caller's hint, otherwise the kind's built-in class.
pub(crate) fn dispatch_entry(
    registry: &TypeRegistry,
    kind: NodeKind,
    path: &Utf8Path,
    hint: Option<&TypeKey>,
) -> Result<NodeEntry, BidsError> {
    let meta_path = MetaStore::path_for(kind, path);
    let (key, module) = if MetaStore::exists(&meta_path) {
        let meta = MetaStore::read(&meta_path)?;
        if meta.kind != kind {
            return Err(BidsError::KindMismatch {
                expected: kind.to_string(),
                found: meta.kind.to_string(),
                path: path.to_path_buf(),
            });
        }
        (meta.type_descriptor.key(), meta.type_descriptor.module)
    } else {
        (
            hint.cloned().unwrap_or_else(|| builtin::default_key(kind)),
            String::new(),
        )
    };

    let entry = registry
        .resolve_node(&key, &module)
        .ok_or_else(|| BidsError::Dispatch {
            kind: kind.to_string(),
            namespace: key.namespace().to_string(),
            class: key.name().to_string(),
            path: path.to_path_buf(),
        })?;
    if entry.class.kind() != kind {
        return Err(BidsError::KindMismatch {
            expected: kind.to_string(),
            found: entry.class.kind().to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(entry)
}

pub(crate) fn bind_directory(
    registry: &Arc<TypeRegistry>,
    kind: NodeKind,
    args: &NodeArgs,
) -> Result<Directory, BidsError> {
    let location = args.location(kind)?;
    let entry = dispatch_entry(registry, kind, &location.path, args.class.as_ref())?;
    Ok(Directory::new(
        registry.clone(),
        entry,
        location,
        args.mode.unwrap_or_default(),
        &args.kwargs,
    ))
}

/// Shared construction sequence: sidecar, components, then load or create.
pub(crate) fn construct(node: &mut dyn Node, args: &NodeArgs) -> Result<(), BidsError> {
    if MetaStore::exists(&node.directory().meta_path()) {
        MetaStore::load_into(node.directory_mut())?;
    }

    let mut types = node.directory().dispatch_component_types();
    types.extend(args.component_types.clone());
    node.directory_mut()
        .construct_components(types, &args.component_kwargs)?;

    if node.directory().exists() {
        if args.load {
            node.load(args.children_to_load.as_deref())?;
        }
    } else if args.create {
        node.construct_default_children()?;
        node.create(args.build)?;
    }
    debug!(node = %node.directory().full_name(), state = ?node.directory().state(), "constructed");
    Ok(())
}

/// Child directories of `kind` under `parent` that carry a sidecar.
pub(crate) fn child_directories(
    parent: &Directory,
    kind: NodeKind,
    names: Option<&[String]>,
) -> Result<Vec<Utf8PathBuf>, BidsError> {
    let mut found = Vec::new();
    for candidate in list_dirs(parent.path())? {
        let Some(file_name) = candidate.file_name() else {
            continue;
        };
        if !file_name.starts_with(kind.prefix()) {
            continue;
        }
        if let Some(names) = names
            && !names.iter().any(|name| file_name.contains(name.as_str()))
        {
            continue;
        }
        if !MetaStore::exists(&MetaStore::path_for(kind, &candidate)) {
            warn!(path = %candidate, kind = %kind, "directory has no sidecar, skipping");
            continue;
        }
        found.push(candidate);
    }
    Ok(found)
}

/// Opens one discovered child. A child whose own sidecar is missing or malformed
/// is skipped with a warning so its siblings still load; other errors propagate.
pub(crate) fn open_child<C>(
    path: &Utf8Path,
    open: impl FnOnce() -> Result<C, BidsError>,
) -> Result<Option<C>, BidsError> {
    match open() {
        Ok(child) => Ok(Some(child)),
        Err(err @ (BidsError::MetadataParse { .. } | BidsError::MetadataNotFound(_))) => {
            warn!(path = %path, error = %err, "skipping child with unreadable metadata");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn insert_child<C>(children: &mut BTreeMap<String, C>, name: String, child: C) -> &mut C {
    match children.entry(name) {
        Entry::Occupied(mut slot) => {
            slot.insert(child);
            slot.into_mut()
        }
        Entry::Vacant(slot) => slot.insert(child),
    }
}

/// First `<prefix><n>` name, counting from the number of children, that is not taken.
pub(crate) fn next_free_name<C>(class: &NodeClass, children: &BTreeMap<String, C>) -> String {
    let mut count = children.len();
    loop {
        let candidate =
            crate::domain::generate_name(class.child_prefix(), class.child_digits(), count);
        if !children.contains_key(&candidate) {
            return candidate;
        }
        count += 1;
    }
}
