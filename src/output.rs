use std::io::{self, Write};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::domain::NodeKind;
use crate::export::ExportReport;
use crate::node::{Node, NodeState};

#[derive(Debug, Clone, Serialize)]
pub struct ComponentSummary {
    pub name: String,
    pub class: String,
    pub module: String,
}

/// JSON view of a node and its loaded children.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub kind: NodeKind,
    pub name: String,
    pub full_name: String,
    pub path: Utf8PathBuf,
    pub class: String,
    pub module: String,
    pub state: NodeState,
    pub components: Vec<ComponentSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSummary>,
}

impl NodeSummary {
    pub fn of(node: &dyn Node) -> Self {
        let directory = node.directory();
        let descriptor = directory.type_descriptor();
        Self {
            kind: directory.kind(),
            name: directory.name().to_string(),
            full_name: directory.full_name(),
            path: directory.path().to_path_buf(),
            class: descriptor.key().to_string(),
            module: descriptor.module.clone(),
            state: directory.state(),
            components: directory
                .components()
                .iter()
                .map(|(name, component)| ComponentSummary {
                    name: name.clone(),
                    class: component.key().to_string(),
                    module: component.module().to_string(),
                })
                .collect(),
            children: node.children().into_iter().map(NodeSummary::of).collect(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_node(node: &dyn Node) -> io::Result<()> {
        Self::print_json(&NodeSummary::of(node))
    }

    pub fn print_export(report: &ExportReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
