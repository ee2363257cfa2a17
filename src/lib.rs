//! relpack - release packaging and remote deployment
//!
//! This library packages application artifacts for a component-based runtime:
//! given a list of root files it discovers every file the artifacts implicitly
//! depend on (descriptor `code` references, service resources, legacy marker
//! comments, pre-built load manifests), deduplicates the result, and
//! materializes it either as a relocatable compressed release archive with a
//! load manifest, or as a sequence of uploads to a running server followed by
//! a remote command over a persistent connection.
//!
//! # Core Concepts
//!
//! - **Descriptor**: a YAML document describing a deployable artifact and its
//!   dependencies (`code`, resource patterns, API schema references)
//! - **Resolution**: the closure of all files reachable from the explicit
//!   roots, deduplicated by canonical path, plus the resource references a
//!   packaging run must materialize
//! - **Load manifest**: the ordered directive file (`.qrf`) the target
//!   runtime consumes to load packaged artifacts in sequence
//! - **Relocation**: rewriting packaged file paths (flat prefix or additive
//!   prefix) relative to their archived position
//!
//! # Project Structure
//!
//! - [`resolve`]: path expansion, descriptor parsing, dependency closure
//! - [`manifest`]: load manifest construction and serialization
//! - [`package`]: staging, relocation, and archive creation
//! - [`remote`]: file upload and the remote command channel
//! - [`cli`]: command-line definitions and handlers

pub mod cli;
pub mod config;
pub mod manifest;
pub mod package;
pub mod remote;
pub mod resolve;
pub mod util;

pub use config::{ConfigError, ReleaseConfig};
pub use manifest::{Directive, LoadManifest, ManifestBuilder, ManifestWarning};
pub use package::{PackageOutcome, Packager, RelocationPlan};
pub use remote::netrc::{NetrcError, RemoteConfig};
pub use remote::upload::{HttpRemoteStore, RemoteStore, TransportError, Uploader};
pub use resolve::{
    DependencyResolver, Descriptor, DescriptorWarning, Origin, Resolution, ResolveError,
    ResolvedFile, ResourceRef,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
