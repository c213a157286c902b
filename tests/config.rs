use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use bids_tree::config::ConfigLoader;
use bids_tree::domain::TypeKey;
use bids_tree::error::BidsError;
use bids_tree::registry::TypeRegistry;

#[test]
fn resolve_plan_file() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let plan_path = root.join("plan.json");
    fs::write(
        &plan_path,
        r#"{
            "schema_version": 1,
            "override": false,
            "file_maps": [
                "participants.tsv",
                {"source": "sub-01/electrodes.tsv", "action": "table", "component": "contents", "key": "electrodes"}
            ],
            "inner_maps": [
                "sub-01",
                {"name": "sub-02", "class": "bids:Subject", "stem": "P02", "inner_name": "BIDS",
                 "importer": "bids:Structured", "importer_kwargs": {"inner_maps": ["ses-1"]}, "override": true}
            ]
        }"#,
    )
    .unwrap();

    let registry = TypeRegistry::with_builtins();
    let resolved = ConfigLoader::resolve(&plan_path, &registry).unwrap();
    assert_eq!(resolved.override_existing, Some(false));
    assert_eq!(resolved.file_maps.len(), 2);
    assert_eq!(resolved.file_maps[1].operation.describe(), "table -> contents[electrodes]");

    let detailed = &resolved.inner_maps[1];
    assert_eq!(detailed.name, "sub-02");
    assert_eq!(detailed.class, Some(TypeKey::new("bids", "Subject")));
    assert_eq!(detailed.importer.as_ref().unwrap().label, "bids:Structured");
    assert!(detailed.override_existing);
}

#[test]
fn missing_and_malformed_plans() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let registry = TypeRegistry::with_builtins();

    assert_matches!(
        ConfigLoader::resolve(&root.join("absent.json"), &registry),
        Err(BidsError::ConfigRead(_))
    );

    let broken = root.join("broken.json");
    fs::write(&broken, r#"{"inner_maps": [42]}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve(&broken, &registry),
        Err(BidsError::ConfigParse(_))
    );

    let bad_class = root.join("bad_class.json");
    fs::write(&bad_class, r#"{"inner_maps": [{"name": "01", "class": "Subject"}]}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve(&bad_class, &registry),
        Err(BidsError::InvalidTypeKey(_))
    );
}
