use std::sync::Arc;

use camino::Utf8Path;

use crate::domain::{Mode, NodeKind};
use crate::error::BidsError;
use crate::meta::MetaStore;
use crate::registry::TypeRegistry;

use super::{Dataset, Modality, Node, NodeArgs, Session, Subject};

/// A node of whichever kind its sidecar declares.
#[derive(Debug)]
pub enum AnyNode {
    Dataset(Dataset),
    Subject(Subject),
    Session(Session),
    Modality(Modality),
}

impl AnyNode {
    /// Opens and loads the node at `path`. Subject and session directories are
    /// recognised by their prefix, anything else is tried as a dataset, then as
    /// a modality.
    pub fn open(registry: &Arc<TypeRegistry>, path: &Utf8Path, mode: Mode) -> Result<Self, BidsError> {
        Self::open_with(registry, NodeArgs::at(path).with_mode(mode))
    }

    /// Like [`AnyNode::open`] with full construction arguments; `args.path` is required.
    pub fn open_with(registry: &Arc<TypeRegistry>, args: NodeArgs) -> Result<Self, BidsError> {
        let path = args.path.clone().ok_or_else(|| {
            BidsError::Configuration("opening a node by its sidecar needs a path".to_string())
        })?;
        let kind = Self::detect_kind(&path)?;
        Ok(match kind {
            NodeKind::Dataset => AnyNode::Dataset(Dataset::open(registry, args)?),
            NodeKind::Subject => AnyNode::Subject(Subject::open(registry, args)?),
            NodeKind::Session => AnyNode::Session(Session::open(registry, args)?),
            NodeKind::Modality => AnyNode::Modality(Modality::open(registry, args)?),
        })
    }

    fn detect_kind(path: &Utf8Path) -> Result<NodeKind, BidsError> {
        let candidates = [
            NodeKind::Subject,
            NodeKind::Session,
            NodeKind::Dataset,
            NodeKind::Modality,
        ];
        for kind in candidates {
            if !kind.prefix().is_empty() && kind.name_from_path(path).is_err() {
                continue;
            }
            let meta_path = MetaStore::path_for(kind, path);
            if MetaStore::exists(&meta_path) {
                return Ok(MetaStore::read(&meta_path)?.kind);
            }
        }
        Err(BidsError::MetadataNotFound(
            MetaStore::path_for(NodeKind::Dataset, path),
        ))
    }

    pub fn kind(&self) -> NodeKind {
        self.as_node().directory().kind()
    }

    pub fn as_node(&self) -> &dyn Node {
        match self {
            AnyNode::Dataset(node) => node,
            AnyNode::Subject(node) => node,
            AnyNode::Session(node) => node,
            AnyNode::Modality(node) => node,
        }
    }

    pub fn as_node_mut(&mut self) -> &mut dyn Node {
        match self {
            AnyNode::Dataset(node) => node,
            AnyNode::Subject(node) => node,
            AnyNode::Session(node) => node,
            AnyNode::Modality(node) => node,
        }
    }
}
