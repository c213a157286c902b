use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BidsError {
    #[error("configuration error: {0}")]
    #[diagnostic(help("give either a path or both a parent path and a name"))]
    Configuration(String),

    #[error("cannot dispatch {kind} at {path}: no class registered as {namespace}:{class}")]
    Dispatch {
        kind: String,
        namespace: String,
        class: String,
        path: Utf8PathBuf,
    },

    #[error("{path} holds a {found} but a {expected} was expected")]
    KindMismatch {
        expected: String,
        found: String,
        path: Utf8PathBuf,
    },

    #[error("metadata sidecar not found: {0}")]
    MetadataNotFound(Utf8PathBuf),

    #[error("malformed metadata sidecar {path}: {message}")]
    MetadataParse { path: Utf8PathBuf, message: String },

    #[error("write rejected, node opened read-only: {0}")]
    PermissionDenied(Utf8PathBuf),

    #[error("import of {item} from {path} failed")]
    ImportItem {
        item: String,
        path: Utf8PathBuf,
        #[source]
        source: Box<BidsError>,
    },

    #[error("no importer registered for {0}")]
    UnknownImporter(String),

    #[error("no exporter registered for {0}")]
    UnknownExporter(String),

    #[error("invalid type key (expected namespace:class): {0}")]
    InvalidTypeKey(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("invalid arguments: {0}")]
    InvalidKwargs(String),

    #[error("failed to read import plan at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse import plan: {0}")]
    ConfigParse(String),

    #[error("content store error: {0}")]
    ContentStore(String),

    #[error("failed to read table {path}: {message}")]
    Table { path: Utf8PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl BidsError {
    pub(crate) fn import_item(item: impl Into<String>, path: &camino::Utf8Path, source: BidsError) -> Self {
        BidsError::ImportItem {
            item: item.into(),
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    }
}
