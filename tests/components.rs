use std::sync::Arc;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use bids_tree::component::{CONTENT_STORE_MODULE, ContentStoreComponent};
use bids_tree::content::JsonContentStore;
use bids_tree::domain::{Kwargs, Mode, TypeKey};
use bids_tree::error::BidsError;
use bids_tree::meta::MetaStore;
use bids_tree::node::{Modality, Node, NodeArgs, NodeState};
use bids_tree::registry::TypeRegistry;

#[test]
fn attached_component_is_persisted_and_reloaded() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let session = root.join("sub-01/ses-1");
    let registry = Arc::new(TypeRegistry::with_builtins());

    let mut modality = Modality::open(
        &registry,
        NodeArgs::named(&session, "ct").with_mode(Mode::Write).creating(),
    )
    .unwrap();
    assert!(modality.directory().components().is_empty());

    let mut kwargs = Kwargs::new();
    kwargs.insert("contents_name".to_string(), json!("scan_index.json"));
    let component_type = registry
        .component_type(&ContentStoreComponent::type_key(), &Kwargs::new())
        .unwrap();
    modality
        .directory_mut()
        .attach_component("index", component_type, &kwargs)
        .unwrap();
    modality.build().unwrap();
    assert_eq!(modality.directory().state(), NodeState::Built);
    assert!(session.join("ct/scan_index.json").is_file());

    modality
        .directory_mut()
        .with_component_mut::<ContentStoreComponent, _>("index", |store, _host| {
            store
                .handle_mut()
                .unwrap()
                .insert("slices", json!(212))
        })
        .unwrap();

    let meta = MetaStore::read(&session.join("ct/sub-01_ses-1_ct_meta.json")).unwrap();
    let persisted = &meta.type_descriptor.component_types["index"];
    assert_eq!(persisted.key(), ContentStoreComponent::type_key());
    assert_eq!(persisted.kwargs["contents_name"], json!("scan_index.json"));

    let reopened = Modality::open(&registry, NodeArgs::at(session.join("ct"))).unwrap();
    let store = reopened
        .directory()
        .component::<ContentStoreComponent>("index")
        .unwrap();
    assert_eq!(store.handle().unwrap().get("slices"), Some(&json!(212)));
    assert_eq!(reopened.directory().class().key(), &TypeKey::new("bids", "Modality"));
}

#[test]
fn component_lookup_errors() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let registry = Arc::new(TypeRegistry::with_builtins());

    let mut ieeg = Modality::open(
        &registry,
        NodeArgs::named(root.join("sub-01/ses-1"), "ieeg")
            .with_class(TypeKey::new("bids", "IEEG"))
            .with_mode(Mode::Write)
            .creating(),
    )
    .unwrap();
    assert!(ieeg.directory().component::<ContentStoreComponent>("contents").is_some());

    let err = ieeg
        .directory_mut()
        .with_component_mut::<ContentStoreComponent, _>("missing", |_, _| Ok(()))
        .unwrap_err();
    assert_matches!(err, BidsError::Configuration(_));

    let mut bad = Kwargs::new();
    bad.insert("contents_name".to_string(), json!(7));
    let component_type = registry
        .component_type(&ContentStoreComponent::type_key(), &bad)
        .unwrap();
    assert_matches!(
        ieeg.directory_mut()
            .attach_component("bad", component_type, &Kwargs::new()),
        Err(BidsError::InvalidKwargs(_))
    );
}

#[test]
fn attach_then_save_reopens() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let session = root.join("sub-01/ses-1");
    let registry = Arc::new(TypeRegistry::with_builtins());

    let mut modality = Modality::open(
        &registry,
        NodeArgs::named(&session, "ct").with_mode(Mode::Write).creating(),
    )
    .unwrap();
    let component_type = registry
        .component_type(&ContentStoreComponent::type_key(), &Kwargs::new())
        .unwrap();
    modality
        .directory_mut()
        .attach_component("index", component_type, &Kwargs::new())
        .unwrap();
    modality.directory().save().unwrap();
    assert!(session.join("ct/sub-01_ses-1_ct_contents.json").is_file());

    let reopened = Modality::open(&registry, NodeArgs::at(session.join("ct"))).unwrap();
    let store = reopened
        .directory()
        .component::<ContentStoreComponent>("index")
        .unwrap();
    assert!(store.handle().unwrap().keys().is_empty());
}

#[test]
fn registry_defaults_stay_out_of_sidecar() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let session = root.join("sub-01/ses-1");
    let registry = Arc::new(TypeRegistry::with_builtins());
    let lab_store = TypeKey::new("lab", "Store");
    let defaults = json!({"contents_name": "lab_store.json", "format": "v2"});
    registry.register_component(
        lab_store.clone(),
        CONTENT_STORE_MODULE,
        ContentStoreComponent::factory(Arc::new(JsonContentStore)),
        defaults.as_object().unwrap().clone(),
    );

    let mut modality = Modality::open(
        &registry,
        NodeArgs::named(&session, "dwi").with_mode(Mode::Write).creating(),
    )
    .unwrap();
    let component_type = registry.component_type(&lab_store, &Kwargs::new()).unwrap();
    let mut supplied = Kwargs::new();
    supplied.insert("owner".to_string(), json!("lab"));
    modality
        .directory_mut()
        .attach_component("store", component_type, &supplied)
        .unwrap();
    modality.build().unwrap();

    let meta = MetaStore::read(&session.join("dwi/sub-01_ses-1_dwi_meta.json")).unwrap();
    let persisted = &meta.type_descriptor.component_types["store"];
    assert_eq!(persisted.kwargs.len(), 1);
    assert_eq!(persisted.kwargs["owner"], json!("lab"));

    let reopened = Modality::open(&registry, NodeArgs::at(session.join("dwi"))).unwrap();
    let store = reopened
        .directory()
        .component::<ContentStoreComponent>("store")
        .unwrap();
    assert!(store.handle().unwrap().path().ends_with("lab_store.json"));
}
