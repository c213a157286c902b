use std::fs;
use std::sync::Arc;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use tempfile::TempDir;

use bids_tree::domain::{Mode, NodeKind, TypeKey};
use bids_tree::error::BidsError;
use bids_tree::meta::MetaStore;
use bids_tree::node::{Dataset, Node, NodeArgs, NodeState, Subject};
use bids_tree::registry::TypeRegistry;

fn scratch() -> (TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn registry() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::with_builtins())
}

fn new_dataset(registry: &Arc<TypeRegistry>, root: &Utf8PathBuf) -> Dataset {
    Dataset::open(
        registry,
        NodeArgs::at(root.join("study")).with_mode(Mode::Create).creating(),
    )
    .unwrap()
}

#[test]
fn create_subject_with_generated_name() {
    let (_temp, root) = scratch();
    let registry = registry();
    let mut dataset = new_dataset(&registry, &root);
    assert_eq!(dataset.directory().state(), NodeState::Built);
    assert!(root.join("study/study_meta.json").is_file());

    let subject = dataset.create_subject(None, NodeArgs::child()).unwrap();
    assert_eq!(subject.name(), "0000");
    assert_eq!(subject.path(), root.join("study/sub-0000"));
    assert!(subject.directory().is_ready());

    let meta = MetaStore::read(&root.join("study/sub-0000/sub-0000_meta.json")).unwrap();
    assert_eq!(meta.kind, NodeKind::Subject);
    assert_eq!(meta.type_descriptor.key(), TypeKey::new("bids", "Subject"));

    let second = dataset.create_subject(None, NodeArgs::child()).unwrap();
    assert_eq!(second.name(), "0001");
}

#[test]
fn session_names_and_sidecar() {
    let (_temp, root) = scratch();
    let registry = registry();
    let mut dataset = new_dataset(&registry, &root);
    let subject = dataset.create_subject(Some("0000"), NodeArgs::child()).unwrap();

    let session = subject.create_session(None, NodeArgs::child()).unwrap();
    assert_eq!(session.name(), "S0000");
    assert_eq!(session.directory().full_name(), "sub-0000_ses-S0000");
    assert_eq!(session.subject_name().as_deref(), Some("0000"));
    assert!(
        root.join("study/sub-0000/ses-S0000/sub-0000_ses-S0000_meta.json")
            .is_file()
    );
}

#[test]
fn create_twice_is_idempotent() {
    let (_temp, root) = scratch();
    let registry = registry();
    let mut dataset = new_dataset(&registry, &root);
    dataset.create_subject(Some("01"), NodeArgs::child()).unwrap();
    let sidecar = root.join("study/sub-01/sub-01_meta.json");
    let before = fs::read_to_string(&sidecar).unwrap();

    let subject = dataset.create_subject(Some("sub-01"), NodeArgs::child()).unwrap();
    subject.create(true).unwrap();

    assert_eq!(fs::read_to_string(&sidecar).unwrap(), before);
    assert_eq!(dataset.subjects().len(), 1);
}

#[test]
fn reopen_loads_children_recursively() {
    let (_temp, root) = scratch();
    let registry = registry();
    {
        let mut dataset = new_dataset(&registry, &root);
        let subject = dataset.create_subject(Some("01"), NodeArgs::child()).unwrap();
        let session = subject.create_session(Some("pre"), NodeArgs::child()).unwrap();
        session
            .create_modality(None, NodeArgs::child().with_class(TypeKey::new("bids", "Anatomy")))
            .unwrap();
        subject.create_session(Some("post"), NodeArgs::child()).unwrap();
    }
    fs::create_dir_all(root.join("study/sub-99")).unwrap();

    let dataset = Dataset::open(&registry, NodeArgs::at(root.join("study"))).unwrap();
    assert_eq!(dataset.directory().state(), NodeState::Loaded);
    assert_eq!(dataset.subjects().keys().collect::<Vec<_>>(), vec!["01"]);

    let subject = dataset.subject("01").unwrap();
    assert_eq!(subject.sessions().len(), 2);
    let anat = subject.session("pre").unwrap().modality("anat").unwrap();
    assert_eq!(anat.directory().class().key(), &TypeKey::new("bids", "Anatomy"));
    assert_eq!(anat.directory().full_name(), "sub-01_ses-pre_anat");
    assert_eq!(anat.subject_name().as_deref(), Some("01"));
}

#[test]
fn filtered_load_keeps_matching_children() {
    let (_temp, root) = scratch();
    let registry = registry();
    {
        let mut dataset = new_dataset(&registry, &root);
        let subject = dataset.create_subject(Some("01"), NodeArgs::child()).unwrap();
        subject.create_session(Some("pre"), NodeArgs::child()).unwrap();
        subject.create_session(Some("post"), NodeArgs::child()).unwrap();
        subject.create_session(Some("followup"), NodeArgs::child()).unwrap();
    }

    let subject = Subject::open(
        &registry,
        NodeArgs::at(root.join("study/sub-01")).only_children(vec!["po".to_string()]),
    )
    .unwrap();
    assert_eq!(subject.sessions().keys().collect::<Vec<_>>(), vec!["post"]);
}

#[test]
fn default_modalities_are_built_with_session() {
    let (_temp, root) = scratch();
    let registry = registry();
    let mut dataset = new_dataset(&registry, &root);
    let subject = dataset.create_subject(Some("01"), NodeArgs::child()).unwrap();
    let session = subject
        .create_session(
            Some("implant"),
            NodeArgs::child().with_class(TypeKey::new("bids", "IEEGSession")),
        )
        .unwrap();

    let ieeg = session.modality("ieeg").unwrap();
    assert_eq!(ieeg.directory().state(), NodeState::Built);
    assert!(
        root.join("study/sub-01/ses-implant/ieeg/sub-01_ses-implant_ieeg_meta.json")
            .is_file()
    );
    assert!(
        root.join("study/sub-01/ses-implant/ieeg/sub-01_ses-implant_ieeg_contents.json")
            .is_file()
    );
}

#[test]
fn corrupt_child_does_not_hide_siblings() {
    let (_temp, root) = scratch();
    let registry = registry();
    let mut dataset = new_dataset(&registry, &root);
    dataset.create_subject(Some("01"), NodeArgs::child()).unwrap();
    dataset.create_subject(Some("02"), NodeArgs::child()).unwrap();
    fs::write(root.join("study/sub-02/sub-02_meta.json"), "{ truncated").unwrap();

    let reopened = Dataset::open(&registry, NodeArgs::at(root.join("study"))).unwrap();
    assert!(reopened.subject("01").is_some());
    assert!(reopened.subject("02").is_none());

    let err = Subject::open(&registry, NodeArgs::at(root.join("study/sub-02"))).unwrap_err();
    assert_matches!(err, BidsError::MetadataParse { .. });
}

#[test]
fn read_only_nodes_reject_writes() {
    let (_temp, root) = scratch();
    let registry = registry();
    new_dataset(&registry, &root);

    let dataset = Dataset::open(&registry, NodeArgs::at(root.join("study"))).unwrap();
    assert_eq!(dataset.directory().mode(), Mode::Read);
    assert_matches!(dataset.directory().save(), Err(BidsError::PermissionDenied(_)));

    let err = Dataset::open(&registry, NodeArgs::at(root.join("other")).creating()).unwrap_err();
    assert_matches!(err, BidsError::PermissionDenied(_));
    assert!(!root.join("other").exists());
}

#[test]
fn bound_until_created() {
    let (_temp, root) = scratch();
    let registry = registry();
    let dataset = Dataset::open(&registry, NodeArgs::at(root.join("later"))).unwrap();
    assert_eq!(dataset.directory().state(), NodeState::Bound);
    assert!(!dataset.directory().is_ready());
    assert!(!root.join("later").exists());
}

#[test]
fn invalid_names_are_rejected() {
    let (_temp, root) = scratch();
    let registry = registry();
    let mut dataset = new_dataset(&registry, &root);
    assert_matches!(
        dataset.create_subject(Some("a/b"), NodeArgs::child()),
        Err(BidsError::InvalidLabel(_))
    );
    assert_matches!(
        Subject::open(&registry, NodeArgs::new()),
        Err(BidsError::Configuration(_))
    );
    assert_matches!(
        Subject::open(&registry, NodeArgs::at(root.join("study/01"))),
        Err(BidsError::Configuration(_))
    );
}
