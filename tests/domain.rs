use assert_matches::assert_matches;
use camino::Utf8Path;

use bids_tree::domain::{Mode, NodeKind, TypeKey, full_name, resolve_location};
use bids_tree::error::BidsError;

#[test]
fn parse_node_kind() {
    let kind: NodeKind = "Session".parse().unwrap();
    assert_eq!(kind, NodeKind::Session);
    assert_eq!(kind.child_kind(), Some(NodeKind::Modality));
    assert_matches!("Study".parse::<NodeKind>(), Err(BidsError::Configuration(_)));
}

#[test]
fn prefixes_and_normalization() {
    assert_eq!(NodeKind::Subject.directory_name("EC0201"), "sub-EC0201");
    assert_eq!(NodeKind::Session.normalize_name("ses-1"), "1");
    assert_eq!(NodeKind::Session.normalize_name("1"), "1");
    assert_eq!(NodeKind::Modality.directory_name("anat"), "anat");
    assert_eq!(NodeKind::Modality.child_kind(), None);
}

#[test]
fn name_derived_from_path() {
    let location = resolve_location(
        NodeKind::Session,
        Some(Utf8Path::new("/data/sub-01/ses-S0001")),
        None,
        None,
    )
    .unwrap();
    assert_eq!(location.name, "S0001");
    assert_eq!(full_name(NodeKind::Session, &location.path), "sub-01_ses-S0001");

    let dataset = resolve_location(NodeKind::Dataset, None, Some("study"), Some(Utf8Path::new("/data")))
        .unwrap();
    assert_eq!(dataset.path, Utf8Path::new("/data/study"));
    assert_eq!(full_name(NodeKind::Dataset, &dataset.path), "study");
}

#[test]
fn modes() {
    assert_eq!(Mode::default(), Mode::Read);
    assert!(!Mode::Read.is_writable());
    assert!(Mode::Write.is_writable());
    assert!(Mode::Create.is_writable());
    assert_eq!(serde_json::to_value(Mode::Create).unwrap(), "create");
}

#[test]
fn type_key_display_roundtrip() {
    let key = TypeKey::new("bids", "ContentSession");
    assert_eq!(key.to_string(), "bids:ContentSession");
    assert_matches!(":Session".parse::<TypeKey>(), Err(BidsError::InvalidTypeKey(_)));
}
