//! Dependency resolution: path expansion, descriptor parsing, and the
//! closure of all files a release implicitly depends on.
//!
//! The pipeline runs in three stages:
//!
//! 1. [`PathResolver`] turns the caller's relative paths and glob patterns
//!    into a flat list of existing files under the source root
//! 2. [`Descriptor`] extracts the declared dependency fields from one YAML
//!    artifact descriptor
//! 3. [`DependencyResolver`] computes the closure over descriptor `code`
//!    references, service resources, legacy marker comments, and pre-built
//!    load manifests

pub mod deps;
pub mod descriptor;
pub mod paths;

pub use deps::{normalize, DependencyResolver, Origin, Resolution, ResolvedFile, ResourceRef};
pub use descriptor::{Descriptor, DescriptorWarning};
pub use paths::PathResolver;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a resolution run.
///
/// Every variant is fatal: a release referencing a file that was never
/// packaged would corrupt the target runtime's state, so there is no
/// partial-success mode. Malformed descriptors are the one recovered
/// condition and are reported as [`DescriptorWarning`] values instead.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// An absolute path was given where a relative one is required
    #[error("release file component '{path}' is an absolute path; must be a relative path from {root}")]
    AbsolutePath { path: String, root: PathBuf },

    /// A root spec resolves to a location outside the source root
    #[error("release file component '{path}' escapes the source directory {root}")]
    PathTraversal { path: String, root: PathBuf },

    /// A wildcard root spec matched no files
    #[error("path '{0}' does not match any files")]
    GlobMismatch(String),

    /// A root spec was not a valid glob pattern
    #[error("invalid glob pattern '{pattern}'")]
    BadPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// An explicit (non-wildcard) root file does not exist or is unreadable
    #[error("cannot find file '{0}'")]
    MissingFile(PathBuf),

    /// A descriptor declares a literal resource path that does not exist
    #[error("service '{descriptor}' references resource '{resource}' that does not exist")]
    ResourceMissing { descriptor: String, resource: String },

    /// A descriptor declares a resource glob that matches no files
    #[error("service '{descriptor}' references resource glob '{resource}' that does not match any files")]
    ResourceGlobMismatch { descriptor: String, resource: String },

    /// Filesystem failure while scanning
    #[error("failed to read '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
