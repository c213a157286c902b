use std::any::Any;
use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use tracing::debug;

use crate::content::{ContentHandle, ContentStore};
use crate::domain::{Kwargs, Mode, TypeKey, merge_kwargs};
use crate::error::BidsError;
use crate::meta::ComponentDescriptor;

/// The hosting node as seen by its components.
#[derive(Debug, Clone, Copy)]
pub struct ComponentHost<'a> {
    pub path: &'a Utf8Path,
    pub full_name: &'a str,
    pub mode: Mode,
}

/// A named, independently typed sub-object attached to a node.
pub trait Component: Send + Sync + fmt::Debug {
    fn key(&self) -> TypeKey;
    fn module(&self) -> &str;
    fn kwargs(&self) -> &Kwargs;
    /// Called when the hosting node is built for the first time.
    fn build(&mut self, host: &ComponentHost<'_>) -> Result<(), BidsError>;
    /// Called when the hosting node is loaded from disk.
    fn load(&mut self, host: &ComponentHost<'_>) -> Result<(), BidsError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type ComponentFactory =
    Arc<dyn Fn(&Kwargs) -> Result<Box<dyn Component>, BidsError> + Send + Sync>;

/// A resolved component type: its constructor and the kwargs it will be built with.
#[derive(Clone)]
pub struct ComponentType {
    pub key: TypeKey,
    pub module: String,
    pub factory: ComponentFactory,
    pub kwargs: Kwargs,
}

impl ComponentType {
    pub fn instantiate(&self, overrides: &Kwargs) -> Result<Box<dyn Component>, BidsError> {
        (self.factory)(&merge_kwargs(&self.kwargs, overrides))
    }

    pub fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            module: self.module.clone(),
            namespace: self.key.namespace().to_string(),
            class: self.key.name().to_string(),
            kwargs: self.kwargs.clone(),
        }
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("key", &self.key)
            .field("module", &self.module)
            .field("kwargs", &self.kwargs)
            .finish_non_exhaustive()
    }
}

pub const CONTENT_STORE_NAMESPACE: &str = "bids";
pub const CONTENT_STORE_CLASS: &str = "ContentStore";
pub const CONTENT_STORE_MODULE: &str = "bids_tree::component";

/// Hosts a content store inside a node directory, by default at `<full_name>_contents.json`.
#[derive(Debug)]
pub struct ContentStoreComponent {
    kwargs: Kwargs,
    engine: Arc<dyn ContentStore>,
    handle: Option<Box<dyn ContentHandle>>,
}

impl ContentStoreComponent {
    pub fn new(engine: Arc<dyn ContentStore>, kwargs: Kwargs) -> Self {
        Self {
            kwargs,
            engine,
            handle: None,
        }
    }

    pub fn type_key() -> TypeKey {
        TypeKey::new(CONTENT_STORE_NAMESPACE, CONTENT_STORE_CLASS)
    }

    pub fn factory(engine: Arc<dyn ContentStore>) -> ComponentFactory {
        Arc::new(move |kwargs: &Kwargs| -> Result<Box<dyn Component>, BidsError> {
            if let Some(name) = kwargs.get("contents_name")
                && !name.is_string()
            {
                return Err(BidsError::InvalidKwargs(format!(
                    "contents_name must be a string, got {name}"
                )));
            }
            Ok(Box::new(ContentStoreComponent::new(engine.clone(), kwargs.clone()))
                as Box<dyn Component>)
        })
    }

    pub fn contents_name(&self, host: &ComponentHost<'_>) -> String {
        self.kwargs
            .get("contents_name")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_contents.json", host.full_name))
    }

    fn construct_store(&mut self, host: &ComponentHost<'_>, create: bool) -> Result<(), BidsError> {
        let name = self.contents_name(host);
        debug!(node = host.full_name, store = %name, create, "opening content store");
        self.handle = Some(
            self.engine
                .open_or_create(host.path, &name, host.mode, create)?,
        );
        Ok(())
    }

    pub fn handle(&self) -> Option<&dyn ContentHandle> {
        self.handle.as_deref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut (dyn ContentHandle + 'static)> {
        self.handle.as_deref_mut()
    }
}

impl Component for ContentStoreComponent {
    fn key(&self) -> TypeKey {
        Self::type_key()
    }

    fn module(&self) -> &str {
        CONTENT_STORE_MODULE
    }

    fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    fn build(&mut self, host: &ComponentHost<'_>) -> Result<(), BidsError> {
        self.construct_store(host, true)
    }

    fn load(&mut self, host: &ComponentHost<'_>) -> Result<(), BidsError> {
        self.construct_store(host, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
