use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use bids_tree::config::ConfigLoader;
use bids_tree::domain::{Kwargs, Mode, TypeKey};
use bids_tree::error::BidsError;
use bids_tree::export::{DEFAULT_EXPORTER_TAG, ExportEngine};
use bids_tree::import::{
    DEFAULT_IMPORTER_TAG, ImportOptions, Importer, StructuredImporter, import_with,
};
use bids_tree::node::{AnyNode, Dataset, NodeArgs, Session, Subject};
use bids_tree::output::JsonOutput;
use bids_tree::registry::TypeRegistry;

#[derive(Parser)]
#[command(name = "bids-tree")]
#[command(about = "Typed dataset/subject/session/modality hierarchies with recursive import and export")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a dataset directory and its sidecar")]
    Init(InitArgs),
    #[command(about = "Add a subject to a dataset")]
    AddSubject(ChildArgs),
    #[command(about = "Add a session to a subject")]
    AddSession(ChildArgs),
    #[command(about = "Add a modality to a session")]
    AddModality(ChildArgs),
    #[command(about = "Show a node and its children")]
    Info(InfoArgs),
    #[command(about = "Import an external tree into a dataset")]
    Import(ImportArgs),
    #[command(about = "Export a node and its children")]
    Export(ExportArgs),
}

#[derive(Args)]
struct InitArgs {
    path: Utf8PathBuf,

    #[arg(long)]
    class: Option<TypeKey>,

    /// Defaults to `create`.
    #[arg(long)]
    mode: Option<Mode>,
}

#[derive(Args)]
struct ChildArgs {
    /// Directory of the parent node.
    parent: Utf8PathBuf,

    /// Generated from the parent's class when omitted.
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    class: Option<TypeKey>,

    /// Mode the parent is opened with; the new child inherits it. Defaults to `write`.
    #[arg(long)]
    mode: Option<Mode>,
}

#[derive(Args)]
struct InfoArgs {
    path: Utf8PathBuf,

    /// Only load children whose directory name contains one of these.
    #[arg(long = "only")]
    only: Vec<String>,
}

#[derive(Args)]
struct ImportArgs {
    dataset: Utf8PathBuf,

    source: Utf8PathBuf,

    /// Import plan; without one the dataset's own importer runs.
    #[arg(long)]
    plan: Option<Utf8PathBuf>,

    #[arg(long, default_value = DEFAULT_IMPORTER_TAG)]
    tag: String,

    #[arg(long = "override")]
    override_existing: bool,

    /// Defaults to `write`.
    #[arg(long)]
    mode: Option<Mode>,
}

#[derive(Args)]
struct ExportArgs {
    path: Utf8PathBuf,

    destination: Utf8PathBuf,

    #[arg(long, default_value = DEFAULT_EXPORTER_TAG)]
    tag: String,

    /// Subject rename as OLD=NEW, repeatable.
    #[arg(long = "rename", value_parser = parse_rename)]
    renames: Vec<(String, String)>,

    #[arg(long)]
    include_meta: bool,
}

fn parse_rename(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((old, new)) if !old.is_empty() && !new.is_empty() => {
            Ok((old.to_string(), new.to_string()))
        }
        _ => Err(format!("expected OLD=NEW, got `{value}`")),
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BidsError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BidsError) -> u8 {
    match error {
        BidsError::ImportItem { source, .. } => map_exit_code(source),
        BidsError::Configuration(_)
        | BidsError::MetadataNotFound(_)
        | BidsError::ConfigRead(_)
        | BidsError::ConfigParse(_)
        | BidsError::InvalidLabel(_)
        | BidsError::InvalidTypeKey(_)
        | BidsError::InvalidKwargs(_) => 2,
        BidsError::Dispatch { .. }
        | BidsError::KindMismatch { .. }
        | BidsError::UnknownImporter(_)
        | BidsError::UnknownExporter(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = TypeRegistry::global();

    match cli.command {
        Commands::Init(args) => run_init(&registry, args),
        Commands::AddSubject(args) => {
            let mut dataset = Dataset::open(&registry, open_parent(&args))?;
            let subject = dataset.create_subject(args.name.as_deref(), child_args(args.class))?;
            JsonOutput::print_node(subject).into_diagnostic()
        }
        Commands::AddSession(args) => {
            let mut subject = Subject::open(&registry, open_parent(&args))?;
            let session = subject.create_session(args.name.as_deref(), child_args(args.class))?;
            JsonOutput::print_node(session).into_diagnostic()
        }
        Commands::AddModality(args) => {
            let mut session = Session::open(&registry, open_parent(&args))?;
            let modality = session.create_modality(args.name.as_deref(), child_args(args.class))?;
            JsonOutput::print_node(modality).into_diagnostic()
        }
        Commands::Info(args) => {
            let mut node_args = NodeArgs::at(args.path).with_mode(Mode::Read);
            if !args.only.is_empty() {
                node_args = node_args.only_children(args.only);
            }
            let node = AnyNode::open_with(&registry, node_args)?;
            JsonOutput::print_node(node.as_node()).into_diagnostic()
        }
        Commands::Import(args) => run_import(&registry, args),
        Commands::Export(args) => run_export(&registry, args),
    }
}

fn open_parent(args: &ChildArgs) -> NodeArgs {
    NodeArgs::at(&args.parent).with_mode(args.mode.unwrap_or(Mode::Write))
}

fn child_args(class: Option<TypeKey>) -> NodeArgs {
    match class {
        Some(class) => NodeArgs::child().with_class(class),
        None => NodeArgs::child(),
    }
}

fn run_init(registry: &Arc<TypeRegistry>, args: InitArgs) -> miette::Result<()> {
    let mut node_args = NodeArgs::at(args.path)
        .with_mode(args.mode.unwrap_or(Mode::Create))
        .creating();
    if let Some(class) = args.class {
        node_args = node_args.with_class(class);
    }
    let dataset = Dataset::open(registry, node_args)?;
    JsonOutput::print_node(&dataset).into_diagnostic()
}

fn run_import(registry: &Arc<TypeRegistry>, args: ImportArgs) -> miette::Result<()> {
    let mut dataset = Dataset::open(
        registry,
        NodeArgs::at(args.dataset)
            .with_mode(args.mode.unwrap_or(Mode::Write))
            .creating(),
    )?;
    let options = ImportOptions {
        override_existing: args.override_existing.then_some(true),
        ..ImportOptions::default()
    };
    match args.plan {
        Some(plan) => {
            let resolved = ConfigLoader::resolve(&plan, registry)?;
            let importer = StructuredImporter::new(resolved.file_maps, resolved.inner_maps);
            let options = ImportOptions {
                override_existing: options.override_existing.or(resolved.override_existing),
                ..options
            };
            importer.execute_import(&mut dataset, &args.source, &options)?;
        }
        None => import_with(&mut dataset, &args.tag, &args.source, &options)?,
    }
    JsonOutput::print_node(&dataset).into_diagnostic()
}

fn run_export(registry: &Arc<TypeRegistry>, args: ExportArgs) -> miette::Result<()> {
    let node = AnyNode::open(registry, &args.path, Mode::Read)?;
    let name_map: Kwargs = args
        .renames
        .into_iter()
        .map(|(old, new)| (old, Value::String(new)))
        .collect();
    let mut kwargs = Kwargs::new();
    kwargs.insert("name_map".to_string(), Value::Object(name_map));
    kwargs.insert("include_meta".to_string(), Value::Bool(args.include_meta));

    let engine = ExportEngine::new(args.tag).with_kwargs(kwargs);
    let report = engine.execute_export(node.as_node(), &args.destination)?;
    JsonOutput::print_export(&report).into_diagnostic()
}
