//! Artifact descriptor parsing.
//!
//! A descriptor is a YAML document describing a deployable component. Only
//! three field groups matter for packaging: the entry-point source file
//! (`code`), the service resource patterns (`resource`, `text-resource`,
//! `bin-resource`, `template`), and an externally managed API schema file
//! under `api-manager.provider-options.schema.value`.
//!
//! A malformed descriptor never aborts a run: one broken file in a batch
//! degrades to "no dependencies found" with a structured warning, so the
//! rest of the release still packages.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Resource-bearing descriptor fields, in the order they contribute
/// dependencies. All four kinds are treated identically for packaging.
pub const SERVICE_RESOURCE_KINDS: [&str; 4] =
    ["resource", "text-resource", "bin-resource", "template"];

/// Suffix identifying a service descriptor; only these contribute the
/// resource-kind fields.
const SERVICE_DESCRIPTOR_SUFFIX: &str = ".qsd.yaml";

/// Dependency-relevant fields extracted from one YAML descriptor. Paths are
/// as written in the descriptor, i.e. relative to the descriptor's own
/// directory.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    /// Entry-point source file (`code`)
    pub code: Option<String>,
    /// Resource patterns, service descriptors only
    pub resources: Vec<String>,
    /// Externally managed API schema file
    pub schema: Option<String>,
}

/// A recovered descriptor parse failure: the offending path and the parser
/// diagnostic. Surfaced as a value so callers and tests can assert on it
/// instead of scraping log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorWarning {
    pub path: PathBuf,
    pub detail: String,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    code: Option<String>,
    resource: Option<Vec<String>>,
    #[serde(rename = "text-resource")]
    text_resource: Option<Vec<String>>,
    #[serde(rename = "bin-resource")]
    bin_resource: Option<Vec<String>>,
    template: Option<Vec<String>>,
    #[serde(rename = "api-manager")]
    api_manager: Option<RawApiManager>,
}

#[derive(Debug, Deserialize)]
struct RawApiManager {
    #[serde(rename = "provider-options")]
    provider_options: Option<RawProviderOptions>,
}

#[derive(Debug, Deserialize)]
struct RawProviderOptions {
    schema: Option<RawSchema>,
}

#[derive(Debug, Deserialize)]
struct RawSchema {
    value: Option<String>,
}

impl Descriptor {
    /// Parse the descriptor at `path`. Read or parse failures degrade to an
    /// empty descriptor plus a warning; they never propagate as errors.
    pub fn read(path: &Path) -> (Self, Option<DescriptorWarning>) {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => return Self::degraded(path, e.to_string()),
        };

        let raw: RawDescriptor = match serde_yaml::from_str(&text) {
            Ok(raw) => raw,
            Err(e) => return Self::degraded(path, e.to_string()),
        };

        let mut descriptor = Descriptor {
            code: raw.code,
            resources: Vec::new(),
            schema: raw
                .api_manager
                .and_then(|am| am.provider_options)
                .and_then(|po| po.schema)
                .and_then(|s| s.value),
        };

        if is_service_descriptor(path) {
            for kind in [
                raw.resource,
                raw.text_resource,
                raw.bin_resource,
                raw.template,
            ]
            .into_iter()
            .flatten()
            {
                descriptor.resources.extend(kind);
            }
        }

        (descriptor, None)
    }

    fn degraded(path: &Path, detail: String) -> (Self, Option<DescriptorWarning>) {
        warn!(path = %path.display(), %detail, "descriptor unreadable, continuing without its dependencies");
        (
            Descriptor::default(),
            Some(DescriptorWarning {
                path: path.to_path_buf(),
                detail,
            }),
        )
    }
}

/// Whether the file name carries the service-descriptor suffix.
pub fn is_service_descriptor(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(SERVICE_DESCRIPTOR_SUFFIX))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_code_and_schema_extracted() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "job.qjob.yaml",
            "type: job\ncode: job.py\napi-manager:\n  provider-options:\n    schema:\n      value: api.yaml\n",
        );
        let (d, warning) = Descriptor::read(&path);
        assert!(warning.is_none());
        assert_eq!(d.code.as_deref(), Some("job.py"));
        assert_eq!(d.schema.as_deref(), Some("api.yaml"));
        // not a service descriptor, resource fields are not consulted
        assert!(d.resources.is_empty());
    }

    #[test]
    fn test_service_resources_collected_in_kind_order() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "svc.qsd.yaml",
            "code: svc.py\ntemplate:\n  - t.html\nresource:\n  - static/*.html\n  - logo.png\n",
        );
        let (d, warning) = Descriptor::read(&path);
        assert!(warning.is_none());
        assert_eq!(d.resources, vec!["static/*.html", "logo.png", "t.html"]);
    }

    #[test]
    fn test_malformed_yaml_degrades_with_warning() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.qsd.yaml", "code: [unterminated\n");
        let (d, warning) = Descriptor::read(&path);
        assert!(d.code.is_none());
        assert!(d.resources.is_empty());
        let warning = warning.expect("expected a parse warning");
        assert_eq!(warning.path, path);
        assert!(!warning.detail.is_empty());
    }

    #[test]
    fn test_service_suffix_detection() {
        assert!(is_service_descriptor(Path::new("dir/http.qsd.yaml")));
        assert!(!is_service_descriptor(Path::new("dir/http.qjob.yaml")));
        assert!(!is_service_descriptor(Path::new("dir/http.qsd")));
    }
}
