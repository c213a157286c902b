//! Typed, metadata-dispatched directory hierarchies for neuroimaging datasets.
//!
//! A dataset is a tree of directories (dataset, `sub-*` subjects, `ses-*`
//! sessions, modality folders). Each directory carries a JSON sidecar naming
//! its concrete class, so opening a path reconstructs the right node type from
//! the [`registry::TypeRegistry`] without the caller knowing it in advance.

pub mod builtin;
pub mod component;
pub mod config;
pub mod content;
pub mod domain;
pub mod error;
pub mod export;
pub mod fs_util;
pub mod import;
pub mod layered;
pub mod meta;
pub mod node;
pub mod output;
pub mod registry;
pub mod tabular;
