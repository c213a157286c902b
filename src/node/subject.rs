use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::domain::NodeKind;
use crate::error::BidsError;
use crate::registry::TypeRegistry;

use super::{
    Directory, Node, NodeArgs, Session, bind_directory, child_directories, construct,
    insert_child, next_free_name, open_child,
};

/// A `sub-<name>` directory holding sessions.
#[derive(Debug)]
pub struct Subject {
    dir: Directory,
    sessions: BTreeMap<String, Session>,
}

impl Subject {
    pub fn open(registry: &Arc<TypeRegistry>, args: NodeArgs) -> Result<Self, BidsError> {
        let mut subject = Self {
            dir: bind_directory(registry, NodeKind::Subject, &args)?,
            sessions: BTreeMap::new(),
        };
        construct(&mut subject, &args)?;
        Ok(subject)
    }

    pub fn sessions(&self) -> &BTreeMap<String, Session> {
        &self.sessions
    }

    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    pub fn session_mut(&mut self, name: &str) -> Option<&mut Session> {
        self.sessions.get_mut(name)
    }

    pub fn generate_session_name(&self) -> String {
        next_free_name(self.dir.class(), &self.sessions)
    }

    pub fn create_session(
        &mut self,
        name: Option<&str>,
        args: NodeArgs,
    ) -> Result<&mut Session, BidsError> {
        let name = match name {
            Some(name) => NodeKind::Session.normalize_name(name).to_string(),
            None => self.generate_session_name(),
        };
        let args = args.for_child_of(&self.dir, &name);
        let session = Session::open(self.dir.registry(), args)?;
        info!(subject = %self.dir.name(), session = %name, "added session");
        Ok(insert_child(&mut self.sessions, name, session))
    }
}

impl Node for Subject {
    fn directory(&self) -> &Directory {
        &self.dir
    }

    fn directory_mut(&mut self) -> &mut Directory {
        &mut self.dir
    }

    fn build_children(&mut self) -> Result<(), BidsError> {
        for session in self.sessions.values_mut() {
            session.create(true)?;
        }
        Ok(())
    }

    fn load_children(&mut self, names: Option<&[String]>, load: bool) -> Result<(), BidsError> {
        let mode = self.dir.mode();
        self.sessions.clear();
        for path in child_directories(&self.dir, NodeKind::Session, names)? {
            let opened = open_child(&path, || {
                Session::open(
                    self.dir.registry(),
                    NodeArgs::at(&path).with_mode(mode).with_load(load),
                )
            })?;
            let Some(session) = opened else {
                continue;
            };
            self.sessions.insert(session.name().to_string(), session);
        }
        Ok(())
    }

    fn has_child(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
        self.sessions
            .get_mut(name)
            .map(|session| session as &mut dyn Node)
    }

    fn children(&self) -> Vec<&dyn Node> {
        self.sessions
            .values()
            .map(|session| session as &dyn Node)
            .collect()
    }

    fn create_child(
        &mut self,
        name: Option<&str>,
        args: NodeArgs,
    ) -> Result<&mut dyn Node, BidsError> {
        let session = self.create_session(name, args)?;
        Ok(session as &mut dyn Node)
    }
}
