use std::sync::Arc;

use crate::domain::NodeKind;
use crate::error::BidsError;
use crate::registry::TypeRegistry;

use super::{Directory, Node, NodeArgs, bind_directory, construct};

/// A leaf directory named after its modality (`anat`, `ieeg`, ...) inside a session.
#[derive(Debug)]
pub struct Modality {
    dir: Directory,
}

impl Modality {
    pub fn open(registry: &Arc<TypeRegistry>, args: NodeArgs) -> Result<Self, BidsError> {
        let mut modality = Self {
            dir: bind_directory(registry, NodeKind::Modality, &args)?,
        };
        construct(&mut modality, &args)?;
        Ok(modality)
    }

    pub fn session_name(&self) -> Option<String> {
        self.dir
            .path()
            .parent()
            .and_then(|parent| NodeKind::Session.name_from_path(parent).ok())
    }

    pub fn subject_name(&self) -> Option<String> {
        self.dir
            .path()
            .parent()
            .and_then(|session| session.parent())
            .and_then(|subject| NodeKind::Subject.name_from_path(subject).ok())
    }
}

impl Node for Modality {
    fn directory(&self) -> &Directory {
        &self.dir
    }

    fn directory_mut(&mut self) -> &mut Directory {
        &mut self.dir
    }
}
