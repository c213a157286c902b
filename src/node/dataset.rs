use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::domain::NodeKind;
use crate::error::BidsError;
use crate::registry::TypeRegistry;

use super::{
    Directory, Node, NodeArgs, Subject, bind_directory, child_directories, construct,
    insert_child, next_free_name, open_child,
};

/// Root of a hierarchy. Its directory name is the dataset name.
#[derive(Debug)]
pub struct Dataset {
    dir: Directory,
    subjects: BTreeMap<String, Subject>,
}

impl Dataset {
    pub fn open(registry: &Arc<TypeRegistry>, args: NodeArgs) -> Result<Self, BidsError> {
        let mut dataset = Self {
            dir: bind_directory(registry, NodeKind::Dataset, &args)?,
            subjects: BTreeMap::new(),
        };
        construct(&mut dataset, &args)?;
        Ok(dataset)
    }

    pub fn subjects(&self) -> &BTreeMap<String, Subject> {
        &self.subjects
    }

    pub fn subject(&self, name: &str) -> Option<&Subject> {
        self.subjects.get(name)
    }

    pub fn subject_mut(&mut self, name: &str) -> Option<&mut Subject> {
        self.subjects.get_mut(name)
    }

    /// Next free `<prefix><n>` subject name, `n` starting at the number of known subjects.
    pub fn generate_subject_name(&self) -> String {
        next_free_name(self.dir.class(), &self.subjects)
    }

    /// Creates (or opens, if it already exists on disk) a subject and registers it.
    pub fn create_subject(
        &mut self,
        name: Option<&str>,
        args: NodeArgs,
    ) -> Result<&mut Subject, BidsError> {
        let name = match name {
            Some(name) => NodeKind::Subject.normalize_name(name).to_string(),
            None => self.generate_subject_name(),
        };
        let args = args.for_child_of(&self.dir, &name);
        let subject = Subject::open(self.dir.registry(), args)?;
        info!(dataset = %self.dir.name(), subject = %name, "added subject");
        Ok(insert_child(&mut self.subjects, name, subject))
    }
}

impl Node for Dataset {
    fn directory(&self) -> &Directory {
        &self.dir
    }

    fn directory_mut(&mut self) -> &mut Directory {
        &mut self.dir
    }

    fn build_children(&mut self) -> Result<(), BidsError> {
        for subject in self.subjects.values_mut() {
            subject.create(true)?;
        }
        Ok(())
    }

    fn load_children(&mut self, names: Option<&[String]>, load: bool) -> Result<(), BidsError> {
        let mode = self.dir.mode();
        self.subjects.clear();
        for path in child_directories(&self.dir, NodeKind::Subject, names)? {
            let opened = open_child(&path, || {
                Subject::open(
                    self.dir.registry(),
                    NodeArgs::at(&path).with_mode(mode).with_load(load),
                )
            })?;
            let Some(subject) = opened else {
                continue;
            };
            self.subjects.insert(subject.name().to_string(), subject);
        }
        Ok(())
    }

    fn has_child(&self, name: &str) -> bool {
        self.subjects.contains_key(name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
        self.subjects
            .get_mut(name)
            .map(|subject| subject as &mut dyn Node)
    }

    fn children(&self) -> Vec<&dyn Node> {
        self.subjects
            .values()
            .map(|subject| subject as &dyn Node)
            .collect()
    }

    fn create_child(
        &mut self,
        name: Option<&str>,
        args: NodeArgs,
    ) -> Result<&mut dyn Node, BidsError> {
        let subject = self.create_subject(name, args)?;
        Ok(subject as &mut dyn Node)
    }
}
