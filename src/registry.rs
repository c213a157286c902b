use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::builtin;
use crate::component::{ComponentFactory, ComponentType};
use crate::domain::{Kwargs, NodeKind, TypeKey, merge_kwargs};
use crate::error::BidsError;
use crate::export::{ExporterFactory, ExporterSpec};
use crate::import::{ImporterFactory, ImporterSpec};
use crate::meta::{ComponentDescriptor, MetaInformation, TypeDescriptor};

/// Default child created alongside a node when it is first built.
#[derive(Debug, Clone)]
pub struct DefaultChild {
    pub name: String,
    pub class: TypeKey,
    pub kwargs: Kwargs,
}

/// Compiled-in description of a node class: what it is, how it is persisted,
/// and the defaults every instance starts from.
#[derive(Debug, Clone)]
pub struct NodeClass {
    kind: NodeKind,
    key: TypeKey,
    module: String,
    default_name: Option<String>,
    component_types: BTreeMap<String, ComponentDescriptor>,
    importers: Arc<BTreeMap<String, ImporterSpec>>,
    exporters: Arc<BTreeMap<String, ExporterSpec>>,
    default_children: Vec<DefaultChild>,
    child_prefix: String,
    child_digits: usize,
}

impl NodeClass {
    pub fn new(kind: NodeKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            key: TypeKey::new(namespace, name),
            module: namespace.to_string(),
            default_name: None,
            component_types: BTreeMap::new(),
            importers: Arc::new(BTreeMap::new()),
            exporters: Arc::new(BTreeMap::new()),
            default_children: Vec::new(),
            child_prefix: String::new(),
            child_digits: 4,
        }
    }

    pub fn module(mut self, module: &str) -> Self {
        self.module = module.to_string();
        self
    }

    pub fn default_name(mut self, name: &str) -> Self {
        self.default_name = Some(name.to_string());
        self
    }

    pub fn with_component(mut self, name: &str, descriptor: ComponentDescriptor) -> Self {
        self.component_types.insert(name.to_string(), descriptor);
        self
    }

    pub fn with_importer(mut self, tag: &str, spec: ImporterSpec) -> Self {
        Arc::make_mut(&mut self.importers).insert(tag.to_string(), spec);
        self
    }

    pub fn with_exporter(mut self, tag: &str, spec: ExporterSpec) -> Self {
        Arc::make_mut(&mut self.exporters).insert(tag.to_string(), spec);
        self
    }

    pub fn with_default_child(mut self, name: &str, class: TypeKey, kwargs: Kwargs) -> Self {
        self.default_children.push(DefaultChild {
            name: name.to_string(),
            class,
            kwargs,
        });
        self
    }

    /// Prefix and zero-padded width of generated child names.
    pub fn child_names(mut self, prefix: &str, digits: usize) -> Self {
        self.child_prefix = prefix.to_string();
        self.child_digits = digits;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn module_path(&self) -> &str {
        &self.module
    }

    pub fn name_default(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn importers(&self) -> &Arc<BTreeMap<String, ImporterSpec>> {
        &self.importers
    }

    pub fn exporters(&self) -> &Arc<BTreeMap<String, ExporterSpec>> {
        &self.exporters
    }

    pub fn default_children(&self) -> &[DefaultChild] {
        &self.default_children
    }

    pub fn child_prefix(&self) -> &str {
        &self.child_prefix
    }

    pub fn child_digits(&self) -> usize {
        self.child_digits
    }

    /// Sidecar content written when a node of this class is built without prior metadata.
    pub fn default_meta(&self) -> MetaInformation {
        MetaInformation::new(
            self.kind,
            TypeDescriptor {
                module: self.module.clone(),
                namespace: self.key.namespace().to_string(),
                class: self.key.name().to_string(),
                component_types: self.component_types.clone(),
            },
        )
    }
}

#[derive(Debug, Clone)]
pub struct NodeEntry {
    pub class: Arc<NodeClass>,
    pub kwargs: Kwargs,
}

#[derive(Clone)]
pub struct ComponentEntry {
    pub module: String,
    pub factory: ComponentFactory,
    pub kwargs: Kwargs,
}

/// Explicit plugin hook consulted when a key is missing from the registry.
/// Implementations register the classes of `module` into `registry`.
pub trait ModuleLoader: Send + Sync {
    fn load_module(&self, module: &str, registry: &TypeRegistry) -> Result<(), BidsError>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&str, &TypeRegistry) -> Result<(), BidsError> + Send + Sync,
{
    fn load_module(&self, module: &str, registry: &TypeRegistry) -> Result<(), BidsError> {
        self(module, registry)
    }
}

/// Process-wide table from `(namespace, class)` to node, component, importer
/// and exporter constructors.
#[derive(Default)]
pub struct TypeRegistry {
    nodes: RwLock<HashMap<TypeKey, NodeEntry>>,
    components: RwLock<HashMap<TypeKey, ComponentEntry>>,
    importers: RwLock<HashMap<TypeKey, ImporterFactory>>,
    exporters: RwLock<HashMap<TypeKey, ExporterFactory>>,
    loaders: RwLock<Vec<Arc<dyn ModuleLoader>>>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let components = self.components.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TypeRegistry")
            .field("nodes", &nodes.keys().collect::<Vec<_>>())
            .field("components", &components.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh registry holding the built-in classes.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_builtins(&registry);
        registry
    }

    pub fn global() -> Arc<TypeRegistry> {
        static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(TypeRegistry::with_builtins()))
            .clone()
    }

    pub fn register_node(&self, class: NodeClass, kwargs: Kwargs) -> Arc<NodeClass> {
        let class = Arc::new(class);
        debug!(key = %class.key(), kind = %class.kind(), "registering node class");
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                class.key().clone(),
                NodeEntry {
                    class: class.clone(),
                    kwargs,
                },
            );
        class
    }

    pub fn register_component(
        &self,
        key: TypeKey,
        module: &str,
        factory: ComponentFactory,
        kwargs: Kwargs,
    ) {
        debug!(key = %key, "registering component type");
        self.components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                ComponentEntry {
                    module: module.to_string(),
                    factory,
                    kwargs,
                },
            );
    }

    pub fn register_importer(&self, key: TypeKey, factory: ImporterFactory) {
        self.importers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, factory);
    }

    pub fn register_exporter(&self, key: TypeKey, factory: ExporterFactory) {
        self.exporters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, factory);
    }

    pub fn add_loader(&self, loader: Arc<dyn ModuleLoader>) {
        self.loaders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(loader);
    }

    pub fn node(&self, key: &TypeKey) -> Option<NodeEntry> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn component(&self, key: &TypeKey) -> Option<ComponentEntry> {
        self.components
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn importer(&self, key: &TypeKey) -> Option<ImporterFactory> {
        self.importers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn exporter(&self, key: &TypeKey) -> Option<ExporterFactory> {
        self.exporters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Looks up a node class, asking the module loaders for `module` once on a miss.
    pub fn resolve_node(&self, key: &TypeKey, module: &str) -> Option<NodeEntry> {
        self.lookup_or_load(module, || self.node(key))
    }

    pub fn resolve_component(&self, key: &TypeKey, module: &str) -> Option<ComponentEntry> {
        self.lookup_or_load(module, || self.component(key))
    }

    fn lookup_or_load<T>(&self, module: &str, lookup: impl Fn() -> Option<T>) -> Option<T> {
        if let Some(found) = lookup() {
            return Some(found);
        }
        if module.is_empty() {
            return None;
        }
        let loaders = self
            .loaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if loaders.is_empty() {
            return None;
        }
        for loader in loaders {
            if let Err(err) = loader.load_module(module, self) {
                warn!(module, error = %err, "failed to load module");
            }
        }
        lookup()
    }

    /// Resolves every persisted component descriptor. Unresolvable entries are
    /// skipped with a warning; resolved defaults are merged with the persisted
    /// kwargs, persisted values winning.
    pub fn dispatch_component_types(
        &self,
        descriptors: &BTreeMap<String, ComponentDescriptor>,
    ) -> BTreeMap<String, ComponentType> {
        let mut resolved = BTreeMap::new();
        for (name, descriptor) in descriptors {
            let key = descriptor.key();
            match self.resolve_component(&key, &descriptor.module) {
                Some(entry) => {
                    resolved.insert(
                        name.clone(),
                        ComponentType {
                            key,
                            module: entry.module,
                            factory: entry.factory,
                            kwargs: merge_kwargs(&entry.kwargs, &descriptor.kwargs),
                        },
                    );
                }
                None => {
                    warn!(component = %name, key = %key, module = %descriptor.module,
                        "component type not found in the registry, skipping");
                }
            }
        }
        resolved
    }

    /// A `ComponentType` for a registered component key, with `kwargs` over its defaults.
    pub fn component_type(&self, key: &TypeKey, kwargs: &Kwargs) -> Option<ComponentType> {
        self.component(key).map(|entry| ComponentType {
            key: key.clone(),
            module: entry.module,
            factory: entry.factory,
            kwargs: merge_kwargs(&entry.kwargs, kwargs),
        })
    }
}
