//! Declarative import plans.
//!
//! A plan is a JSON document listing the files to ingest into a node and the
//! children to materialise below it. The same document shape is accepted as the
//! kwargs of the `bids:Structured` importer, so a child's `importer_kwargs` can
//! carry a nested plan for the next level down.

use std::fs;
use std::sync::Arc;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Kwargs, TypeKey};
use crate::error::BidsError;
use crate::import::{CopyFile, FileMap, ImporterSpec, InnerMap, TableIntoContents};
use crate::registry::TypeRegistry;
use crate::tabular::TsvReader;

pub const PLAN_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CONTENTS_COMPONENT: &str = "contents";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ImportPlan {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default, rename = "override")]
    pub override_existing: Option<bool>,
    #[serde(default)]
    pub file_maps: Vec<FileMapEntry>,
    #[serde(default)]
    pub inner_maps: Vec<InnerMapEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileMapEntry {
    Shorthand(String),
    Detailed(FileMapObject),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    #[default]
    Copy,
    Table,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FileMapObject {
    pub source: String,
    #[serde(default)]
    pub action: FileAction,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InnerMapEntry {
    Shorthand(String),
    Detailed(InnerMapObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InnerMapObject {
    pub name: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub stem: Option<String>,
    #[serde(default)]
    pub inner_name: Option<String>,
    #[serde(default)]
    pub importer: Option<String>,
    #[serde(default)]
    pub importer_kwargs: Kwargs,
    #[serde(default)]
    pub kwargs: Kwargs,
    #[serde(default, rename = "override")]
    pub override_existing: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    pub schema_version: u32,
    pub file_maps: Vec<FileMap>,
    pub inner_maps: Vec<InnerMap>,
    pub override_existing: Option<bool>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Utf8Path) -> Result<ImportPlan, BidsError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| BidsError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| BidsError::ConfigParse(err.to_string()))
    }

    pub fn resolve(path: &Utf8Path, registry: &TypeRegistry) -> Result<ResolvedPlan, BidsError> {
        Self::resolve_plan(Self::load(path)?, registry)
    }

    pub fn plan_from_kwargs(kwargs: &Kwargs) -> Result<ImportPlan, BidsError> {
        serde_json::from_value(Value::Object(kwargs.clone()))
            .map_err(|err| BidsError::ConfigParse(err.to_string()))
    }

    pub fn resolve_plan(plan: ImportPlan, registry: &TypeRegistry) -> Result<ResolvedPlan, BidsError> {
        let schema_version = plan.schema_version.unwrap_or(PLAN_SCHEMA_VERSION);
        if schema_version != PLAN_SCHEMA_VERSION {
            return Err(BidsError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let file_maps = plan
            .file_maps
            .into_iter()
            .map(|entry| match entry {
                FileMapEntry::Shorthand(source) => Ok(FileMap {
                    source: source.into(),
                    operation: Arc::new(CopyFile::default()),
                }),
                FileMapEntry::Detailed(obj) => resolve_file_map(obj),
            })
            .collect::<Result<Vec<_>, BidsError>>()?;

        let inner_maps = plan
            .inner_maps
            .into_iter()
            .map(|entry| match entry {
                InnerMapEntry::Shorthand(name) => Ok(InnerMap::new(name)),
                InnerMapEntry::Detailed(obj) => resolve_inner_map(obj, registry),
            })
            .collect::<Result<Vec<_>, BidsError>>()?;

        Ok(ResolvedPlan {
            schema_version,
            file_maps,
            inner_maps,
            override_existing: plan.override_existing,
        })
    }
}

fn resolve_file_map(obj: FileMapObject) -> Result<FileMap, BidsError> {
    let operation: Arc<dyn crate::import::FileImport> = match obj.action {
        FileAction::Copy => Arc::new(CopyFile { target: obj.target }),
        FileAction::Table => {
            let key = match obj.key {
                Some(key) => key,
                None => Utf8Path::new(&obj.source)
                    .file_stem()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        BidsError::ConfigParse(format!("table source `{}` has no file stem", obj.source))
                    })?,
            };
            Arc::new(TableIntoContents {
                reader: Arc::new(TsvReader),
                component: obj
                    .component
                    .unwrap_or_else(|| DEFAULT_CONTENTS_COMPONENT.to_string()),
                key,
            })
        }
    };
    Ok(FileMap {
        source: obj.source.into(),
        operation,
    })
}

fn resolve_inner_map(obj: InnerMapObject, registry: &TypeRegistry) -> Result<InnerMap, BidsError> {
    let mut map = InnerMap::new(obj.name)
        .with_importer_kwargs(obj.importer_kwargs)
        .overriding(obj.override_existing.unwrap_or(false));
    map.kwargs = obj.kwargs;
    if let Some(class) = obj.class {
        map = map.with_class(class.parse::<TypeKey>()?);
    }
    if let Some(stem) = obj.stem {
        map = map.with_stem(stem);
    }
    if let Some(inner_name) = obj.inner_name {
        map.inner_name = inner_name;
    }
    if let Some(importer) = obj.importer {
        let key: TypeKey = importer.parse()?;
        map = map.with_importer(ImporterSpec::registered(registry, &key, Kwargs::new())?);
    }
    Ok(map)
}
