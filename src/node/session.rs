use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::NodeKind;
use crate::error::BidsError;
use crate::registry::TypeRegistry;

use super::{
    Directory, Modality, Node, NodeArgs, bind_directory, child_directories, construct,
    insert_child, open_child,
};

/// A `ses-<name>` directory inside a subject, holding modalities.
#[derive(Debug)]
pub struct Session {
    dir: Directory,
    modalities: BTreeMap<String, Modality>,
}

impl Session {
    pub fn open(registry: &Arc<TypeRegistry>, args: NodeArgs) -> Result<Self, BidsError> {
        let mut session = Self {
            dir: bind_directory(registry, NodeKind::Session, &args)?,
            modalities: BTreeMap::new(),
        };
        construct(&mut session, &args)?;
        Ok(session)
    }

    /// Name of the enclosing subject, taken from the parent directory.
    pub fn subject_name(&self) -> Option<String> {
        self.dir
            .path()
            .parent()
            .and_then(|parent| NodeKind::Subject.name_from_path(parent).ok())
    }

    pub fn modalities(&self) -> &BTreeMap<String, Modality> {
        &self.modalities
    }

    pub fn modality(&self, name: &str) -> Option<&Modality> {
        self.modalities.get(name)
    }

    pub fn modality_mut(&mut self, name: &str) -> Option<&mut Modality> {
        self.modalities.get_mut(name)
    }

    /// Creates a modality. Without a name the class's default name is used.
    pub fn create_modality(
        &mut self,
        name: Option<&str>,
        args: NodeArgs,
    ) -> Result<&mut Modality, BidsError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_modality_name(&args)?,
        };
        let args = args.for_child_of(&self.dir, &name);
        let modality = Modality::open(self.dir.registry(), args)?;
        info!(session = %self.dir.full_name(), modality = %name, "added modality");
        Ok(insert_child(&mut self.modalities, name, modality))
    }

    fn default_modality_name(&self, args: &NodeArgs) -> Result<String, BidsError> {
        let class = args.class.as_ref().ok_or_else(|| {
            BidsError::Configuration("a modality needs a name or a class".to_string())
        })?;
        let entry = self.dir.registry().node(class).ok_or_else(|| BidsError::Dispatch {
            kind: NodeKind::Modality.to_string(),
            namespace: class.namespace().to_string(),
            class: class.name().to_string(),
            path: self.dir.path().to_path_buf(),
        })?;
        entry
            .class
            .name_default()
            .map(str::to_string)
            .ok_or_else(|| {
                BidsError::Configuration(format!("modality class {class} has no default name"))
            })
    }
}

impl Node for Session {
    fn directory(&self) -> &Directory {
        &self.dir
    }

    fn directory_mut(&mut self) -> &mut Directory {
        &mut self.dir
    }

    fn construct_default_children(&mut self) -> Result<(), BidsError> {
        let mode = self.dir.mode();
        for child in self.dir.class().default_children().to_vec() {
            if self.modalities.contains_key(&child.name) {
                continue;
            }
            let args = NodeArgs::named(self.dir.path(), &child.name)
                .with_class(child.class.clone())
                .with_mode(mode)
                .with_kwargs(child.kwargs.clone())
                .with_load(false);
            let modality = Modality::open(self.dir.registry(), args)?;
            debug!(session = %self.dir.full_name(), modality = %child.name, "constructed default modality");
            self.modalities.insert(child.name, modality);
        }
        Ok(())
    }

    fn build_children(&mut self) -> Result<(), BidsError> {
        for modality in self.modalities.values_mut() {
            modality.create(true)?;
        }
        Ok(())
    }

    fn load_children(&mut self, names: Option<&[String]>, load: bool) -> Result<(), BidsError> {
        let mode = self.dir.mode();
        self.modalities.clear();
        for path in child_directories(&self.dir, NodeKind::Modality, names)? {
            let opened = open_child(&path, || {
                Modality::open(
                    self.dir.registry(),
                    NodeArgs::at(&path).with_mode(mode).with_load(load),
                )
            })?;
            let Some(modality) = opened else {
                continue;
            };
            self.modalities
                .insert(modality.name().to_string(), modality);
        }
        Ok(())
    }

    fn has_child(&self, name: &str) -> bool {
        self.modalities.contains_key(name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
        self.modalities
            .get_mut(name)
            .map(|modality| modality as &mut dyn Node)
    }

    fn children(&self) -> Vec<&dyn Node> {
        self.modalities
            .values()
            .map(|modality| modality as &dyn Node)
            .collect()
    }

    fn create_child(
        &mut self,
        name: Option<&str>,
        args: NodeArgs,
    ) -> Result<&mut dyn Node, BidsError> {
        let modality = self.create_modality(name, args)?;
        Ok(modality as &mut dyn Node)
    }
}
