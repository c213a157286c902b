use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BidsError;

/// Free-form construction arguments, persisted verbatim in sidecars.
pub type Kwargs = serde_json::Map<String, serde_json::Value>;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("label pattern"));

/// Shallow merge: keys in `overrides` replace keys in `defaults`, values are never merged deeper.
pub fn merge_kwargs(defaults: &Kwargs, overrides: &Kwargs) -> Kwargs {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

pub fn validate_label(label: &str) -> Result<(), BidsError> {
    if LABEL_RE.is_match(label) {
        Ok(())
    } else {
        Err(BidsError::InvalidLabel(label.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Dataset,
    Subject,
    Session,
    Modality,
}

impl NodeKind {
    pub fn type_tag(self) -> &'static str {
        match self {
            NodeKind::Dataset => "Dataset",
            NodeKind::Subject => "Subject",
            NodeKind::Session => "Session",
            NodeKind::Modality => "Modality",
        }
    }

    /// Fixed directory prefix of this kind; empty for kinds whose directory is the bare name.
    pub fn prefix(self) -> &'static str {
        match self {
            NodeKind::Subject => "sub-",
            NodeKind::Session => "ses-",
            NodeKind::Dataset | NodeKind::Modality => "",
        }
    }

    pub fn child_kind(self) -> Option<NodeKind> {
        match self {
            NodeKind::Dataset => Some(NodeKind::Subject),
            NodeKind::Subject => Some(NodeKind::Session),
            NodeKind::Session => Some(NodeKind::Modality),
            NodeKind::Modality => None,
        }
    }

    pub fn directory_name(self, name: &str) -> String {
        format!("{}{name}", self.prefix())
    }

    /// Strips the kind's directory prefix from a raw child name, if present.
    pub fn normalize_name(self, raw: &str) -> &str {
        raw.strip_prefix(self.prefix()).unwrap_or(raw)
    }

    pub fn name_from_path(self, path: &Utf8Path) -> Result<String, BidsError> {
        let file_name = path.file_name().ok_or_else(|| {
            BidsError::Configuration(format!("{path} has no final path component"))
        })?;
        match file_name.strip_prefix(self.prefix()) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(BidsError::Configuration(format!(
                "{path} is not a {self} directory (expected prefix `{}`)",
                self.prefix()
            ))),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_tag())
    }
}

impl FromStr for NodeKind {
    type Err = BidsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Dataset" => Ok(NodeKind::Dataset),
            "Subject" => Ok(NodeKind::Subject),
            "Session" => Ok(NodeKind::Session),
            "Modality" => Ok(NodeKind::Modality),
            other => Err(BidsError::Configuration(format!("unknown node type `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Read,
    Write,
    Create,
}

impl Mode {
    pub fn is_writable(self) -> bool {
        !matches!(self, Mode::Read)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Write => write!(f, "write"),
            Mode::Create => write!(f, "create"),
        }
    }
}

/// Registry key of a class: `(namespace, class name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey {
    namespace: String,
    name: String,
}

impl TypeKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for TypeKey {
    type Err = BidsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = value
            .trim()
            .split_once(':')
            .ok_or_else(|| BidsError::InvalidTypeKey(value.to_string()))?;
        if namespace.is_empty() || name.is_empty() {
            return Err(BidsError::InvalidTypeKey(value.to_string()));
        }
        Ok(Self::new(namespace, name))
    }
}

/// A node's resolved on-disk location and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLocation {
    pub path: Utf8PathBuf,
    pub name: String,
}

/// Applies the naming rule: an explicit path wins and yields the name, otherwise
/// `parent_path / <prefix><name>`. A name given together with a path must agree with it.
pub fn resolve_location(
    kind: NodeKind,
    path: Option<&Utf8Path>,
    name: Option<&str>,
    parent_path: Option<&Utf8Path>,
) -> Result<NodeLocation, BidsError> {
    if let Some(name) = name {
        validate_label(name)?;
    }
    match (path, name, parent_path) {
        (Some(path), name, _) => {
            let derived = kind.name_from_path(path)?;
            if let Some(name) = name
                && name != derived
            {
                return Err(BidsError::Configuration(format!(
                    "name `{name}` conflicts with path {path}"
                )));
            }
            Ok(NodeLocation {
                path: path.to_path_buf(),
                name: derived,
            })
        }
        (None, Some(name), Some(parent_path)) => Ok(NodeLocation {
            path: parent_path.join(kind.directory_name(name)),
            name: name.to_string(),
        }),
        _ => Err(BidsError::Configuration(
            "neither path nor (parent_path, name) is usable".to_string(),
        )),
    }
}

fn ancestor_name(path: &Utf8Path, levels: usize) -> &str {
    path.ancestors()
        .nth(levels)
        .and_then(Utf8Path::file_name)
        .unwrap_or_default()
}

/// Compound name used for sidecars and node-owned files, e.g. `sub-01_ses-02`.
pub fn full_name(kind: NodeKind, path: &Utf8Path) -> String {
    match kind {
        NodeKind::Dataset | NodeKind::Subject => ancestor_name(path, 0).to_string(),
        NodeKind::Session => format!("{}_{}", ancestor_name(path, 1), ancestor_name(path, 0)),
        NodeKind::Modality => format!(
            "{}_{}_{}",
            ancestor_name(path, 2),
            ancestor_name(path, 1),
            ancestor_name(path, 0)
        ),
    }
}

pub fn meta_file_name(full_name: &str) -> String {
    format!("{full_name}_meta.json")
}

pub fn generate_name(prefix: &str, digits: usize, count: usize) -> String {
    format!("{prefix}{count:0digits$}")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn child_path_uses_prefix() {
        let location =
            resolve_location(NodeKind::Subject, None, Some("EC0201"), Some(Utf8Path::new("/data")))
                .unwrap();
        assert_eq!(location.path, Utf8PathBuf::from("/data/sub-EC0201"));
        let again = resolve_location(NodeKind::Subject, Some(&location.path), None, None).unwrap();
        assert_eq!(again.name, "EC0201");
    }

    #[test]
    fn conflicting_name_and_path() {
        let err = resolve_location(
            NodeKind::Session,
            Some(Utf8Path::new("/data/sub-01/ses-02")),
            Some("03"),
            None,
        )
        .unwrap_err();
        assert_matches!(err, BidsError::Configuration(_));
    }

    #[test]
    fn insufficient_location() {
        let err = resolve_location(NodeKind::Subject, None, Some("01"), None).unwrap_err();
        assert_matches!(err, BidsError::Configuration(_));
    }

    #[test]
    fn full_names() {
        let session = Utf8Path::new("/data/sub-01/ses-S0000");
        assert_eq!(full_name(NodeKind::Session, session), "sub-01_ses-S0000");
        let modality = session.join("ieeg");
        assert_eq!(full_name(NodeKind::Modality, &modality), "sub-01_ses-S0000_ieeg");
        assert_eq!(meta_file_name("sub-01"), "sub-01_meta.json");
    }

    #[test]
    fn type_key_parse() {
        let key: TypeKey = "bids.dwi:DWI".parse().unwrap();
        assert_eq!(key.namespace(), "bids.dwi");
        assert_eq!(key.name(), "DWI");
        assert_matches!("DWI".parse::<TypeKey>(), Err(BidsError::InvalidTypeKey(_)));
    }

    #[test]
    fn generated_names() {
        assert_eq!(generate_name("", 4, 0), "0000");
        assert_eq!(generate_name("S", 4, 12), "S0012");
    }

    #[test]
    fn shallow_merge_prefers_overrides() {
        let defaults = serde_json::json!({"a": 1, "nested": {"x": 1, "y": 2}});
        let overrides = serde_json::json!({"nested": {"x": 5}});
        let merged = merge_kwargs(
            defaults.as_object().unwrap(),
            overrides.as_object().unwrap(),
        );
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["nested"], serde_json::json!({"x": 5}));
    }

    #[test]
    fn labels() {
        assert!(validate_label("test_modality").is_ok());
        assert_matches!(validate_label("a/b"), Err(BidsError::InvalidLabel(_)));
        assert_matches!(validate_label(""), Err(BidsError::InvalidLabel(_)));
    }
}
