//! Built-in classes registered into every [`TypeRegistry::with_builtins`] registry.

use std::sync::Arc;

use crate::component::{CONTENT_STORE_MODULE, ContentStoreComponent};
use crate::content::JsonContentStore;
use crate::domain::{Kwargs, NodeKind, TypeKey};
use crate::export::{CopyExporter, DEFAULT_EXPORTER_TAG};
use crate::import::{DEFAULT_IMPORTER_TAG, StructuredImporter};
use crate::meta::ComponentDescriptor;
use crate::registry::{NodeClass, TypeRegistry};

pub const NAMESPACE: &str = "bids";
pub const MODULE: &str = "bids_tree::builtin";

pub const CONTENTS_COMPONENT: &str = "contents";

/// Class used for a kind when neither a sidecar nor the caller names one.
pub fn default_key(kind: NodeKind) -> TypeKey {
    TypeKey::new(NAMESPACE, kind.type_tag())
}

fn contents_descriptor() -> ComponentDescriptor {
    let key = ContentStoreComponent::type_key();
    ComponentDescriptor {
        module: CONTENT_STORE_MODULE.to_string(),
        namespace: key.namespace().to_string(),
        class: key.name().to_string(),
        kwargs: Kwargs::new(),
    }
}

fn class(kind: NodeKind, name: &str) -> NodeClass {
    NodeClass::new(kind, NAMESPACE, name)
        .module(MODULE)
        .with_importer(DEFAULT_IMPORTER_TAG, StructuredImporter::spec(Kwargs::new()))
        .with_exporter(DEFAULT_EXPORTER_TAG, CopyExporter::spec(Kwargs::new()))
}

pub fn register_builtins(registry: &TypeRegistry) {
    registry.register_component(
        ContentStoreComponent::type_key(),
        CONTENT_STORE_MODULE,
        ContentStoreComponent::factory(Arc::new(JsonContentStore)),
        Kwargs::new(),
    );
    registry.register_importer(StructuredImporter::type_key(), StructuredImporter::factory());
    registry.register_exporter(CopyExporter::type_key(), CopyExporter::factory());

    let nodes = [
        class(NodeKind::Dataset, "Dataset").child_names("", 4),
        class(NodeKind::Subject, "Subject").child_names("S", 4),
        class(NodeKind::Session, "Session"),
        class(NodeKind::Session, "ContentSession")
            .with_component(CONTENTS_COMPONENT, contents_descriptor()),
        class(NodeKind::Session, "IEEGSession").with_default_child(
            "ieeg",
            TypeKey::new(NAMESPACE, "IEEG"),
            Kwargs::new(),
        ),
        class(NodeKind::Modality, "Modality"),
        class(NodeKind::Modality, "Anatomy").default_name("anat"),
        class(NodeKind::Modality, "IEEG")
            .default_name("ieeg")
            .with_component(CONTENTS_COMPONENT, contents_descriptor()),
        class(NodeKind::Modality, "CT").default_name("ct"),
        class(NodeKind::Modality, "DWI").default_name("dwi"),
    ];
    for node in nodes {
        registry.register_node(node, Kwargs::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_default_class() {
        let registry = TypeRegistry::with_builtins();
        for kind in [
            NodeKind::Dataset,
            NodeKind::Subject,
            NodeKind::Session,
            NodeKind::Modality,
        ] {
            let entry = registry.node(&default_key(kind)).unwrap();
            assert_eq!(entry.class.kind(), kind);
        }
    }

    #[test]
    fn builtin_tables_are_shared_not_copied() {
        let registry = TypeRegistry::with_builtins();
        let ieeg = registry.node(&TypeKey::new(NAMESPACE, "IEEG")).unwrap();
        assert_eq!(ieeg.class.name_default(), Some("ieeg"));
        assert!(ieeg.class.importers().contains_key(DEFAULT_IMPORTER_TAG));
        assert!(ieeg.class.exporters().contains_key(DEFAULT_EXPORTER_TAG));
    }
}
