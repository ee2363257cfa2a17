//! Dependency closure over explicit root files.
//!
//! Seeded with the expanded root file list, the resolver walks an explicit
//! worklist to a fixpoint: YAML descriptors contribute their `code` entry
//! point, service descriptors contribute resource references and the API
//! schema file, legacy `.qsd` sources are scanned for marker comments, and
//! pre-built `.qrf` manifests pull in every file their `load` directives
//! name. Resource references are expanded as they are validated, so the
//! files they name join the resolved set with a resource origin.
//! Deduplication is by normalized path; a file discovered through several
//! origins keeps the first one assigned.

use super::descriptor::{is_service_descriptor, Descriptor, DescriptorWarning};
use super::ResolveError;
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// How a file entered the resolved set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Listed by the caller (possibly via glob expansion)
    Explicit,
    /// Declared as a descriptor `code` entry point
    DerivedCode,
    /// Materialized from a service resource reference
    DerivedResource,
    /// Found via a legacy marker comment in a `.qsd` source
    DerivedLegacy,
    /// Named by a `load` directive in a pre-built `.qrf` manifest
    DerivedManifest,
}

/// One file in the resolved set: a normalized path relative to the source
/// root plus the origin it was first discovered through. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub origin: Origin,
}

/// A declared resource: where it lives relative to the source root and the
/// descriptor-relative target path it must keep in the packaged tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    /// Path or glob relative to the source root
    pub source: PathBuf,
    /// Path relative to the declaring descriptor's directory; never absolute
    pub target: String,
}

/// The complete result of one resolution run.
#[derive(Debug, Default)]
pub struct Resolution {
    pub files: Vec<ResolvedFile>,
    pub resources: Vec<ResourceRef>,
    /// Recovered descriptor parse failures; informational, never fatal
    pub warnings: Vec<DescriptorWarning>,
}

impl Resolution {
    /// Paths only, in resolution order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        let normalized = normalize(path);
        self.files.iter().any(|f| f.path == normalized)
    }
}

/// Computes the dependency closure of a seed file set under a source root.
pub struct DependencyResolver {
    root: PathBuf,
    marker: Regex,
}

impl DependencyResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            // legacy service sources declare resources in comments:
            //   # resource: some/file.html
            marker: Regex::new(r"^#\s*(resource|templates|bin-resource|text-resource)\s*:\s*(.+)$")
                .unwrap(),
        }
    }

    /// Resolve the closure of `seed`. The result is a superset of the seed,
    /// deduplicated by normalized path, with explicit files first in seed
    /// order and each file's derived dependencies immediately after it.
    /// Running twice on the same input yields the same resolution.
    pub fn resolve(&self, seed: &[PathBuf]) -> Result<Resolution, ResolveError> {
        let mut resolution = Resolution::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut seen_resources: HashSet<(PathBuf, String)> = HashSet::new();

        let mut queue: VecDeque<(PathBuf, Origin)> = seed
            .iter()
            .map(|p| (p.clone(), Origin::Explicit))
            .collect();

        while let Some((path, origin)) = queue.pop_front() {
            let path = normalize(&path);
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let name = name.unwrap_or_default();

            if name.ends_with('~') || !seen.insert(path.clone()) {
                continue;
            }
            resolution.files.push(ResolvedFile {
                path: path.clone(),
                origin,
            });

            // derived entries go to the front of the queue so each root's
            // dependencies stay adjacent to it in the final ordering
            let mut derived: Vec<(PathBuf, Origin)> = Vec::new();

            // resource payloads are opaque data, never scanned for further
            // dependencies even when they look like descriptors
            let scannable = !matches!(origin, Origin::DerivedResource | Origin::DerivedLegacy);

            if scannable && (name.ends_with(".yaml") || name.ends_with(".yml")) {
                let (descriptor, warning) = Descriptor::read(&self.root.join(&path));
                if let Some(warning) = warning {
                    resolution.warnings.push(warning);
                }
                self.apply_descriptor(
                    &path,
                    &descriptor,
                    &seen,
                    &mut seen_resources,
                    &mut derived,
                    &mut resolution.resources,
                )?;
            } else if scannable && name.ends_with(".qsd") {
                self.scan_legacy_markers(
                    &path,
                    &mut seen_resources,
                    &mut derived,
                    &mut resolution.resources,
                )?;
            } else if scannable && name.ends_with(".qrf") {
                for loaded in self.manifest_loads(&path)? {
                    derived.push((loaded, Origin::DerivedManifest));
                }
            }

            for entry in derived.into_iter().rev() {
                queue.push_front(entry);
            }
        }

        debug!(
            files = resolution.files.len(),
            resources = resolution.resources.len(),
            warnings = resolution.warnings.len(),
            "dependency resolution complete"
        );
        Ok(resolution)
    }

    fn apply_descriptor(
        &self,
        descriptor_path: &Path,
        descriptor: &Descriptor,
        seen: &HashSet<PathBuf>,
        seen_resources: &mut HashSet<(PathBuf, String)>,
        derived: &mut Vec<(PathBuf, Origin)>,
        resources: &mut Vec<ResourceRef>,
    ) -> Result<(), ResolveError> {
        let dir = descriptor_path.parent().unwrap_or(Path::new(""));

        if let Some(code) = &descriptor.code {
            let src = normalize(&dir.join(code));
            // a declared entry point that does not exist is not an error:
            // the code may be managed out of band
            if self.root.join(&src).is_file() && !seen.contains(&src) {
                derived.push((src, Origin::DerivedCode));
            }
        }

        if is_service_descriptor(descriptor_path) {
            for pattern in &descriptor.resources {
                self.add_resource(
                    descriptor_path,
                    pattern,
                    Origin::DerivedResource,
                    seen_resources,
                    derived,
                    resources,
                )?;
            }
            if let Some(schema) = &descriptor.schema {
                self.add_resource(
                    descriptor_path,
                    schema,
                    Origin::DerivedResource,
                    seen_resources,
                    derived,
                    resources,
                )?;
            }
        }

        Ok(())
    }

    /// Validate one resource declaration, record its reference, and queue
    /// the files it expands to. Literal paths must exist; wildcard patterns
    /// must match at least one file.
    fn add_resource(
        &self,
        descriptor_path: &Path,
        target: &str,
        origin: Origin,
        seen_resources: &mut HashSet<(PathBuf, String)>,
        derived: &mut Vec<(PathBuf, Origin)>,
        resources: &mut Vec<ResourceRef>,
    ) -> Result<(), ResolveError> {
        if Path::new(target).is_absolute() {
            return Err(ResolveError::AbsolutePath {
                path: target.to_string(),
                root: self.root.clone(),
            });
        }

        let dir = descriptor_path.parent().unwrap_or(Path::new(""));
        let source = normalize(&dir.join(target));

        if has_wildcard(target) {
            let pattern = self.root.join(&source);
            let matched = glob::glob(&pattern.to_string_lossy())
                .map(|paths| paths.filter_map(Result::ok).next().is_some())
                .unwrap_or(false);
            if !matched {
                return Err(ResolveError::ResourceGlobMismatch {
                    descriptor: descriptor_path.display().to_string(),
                    resource: target.to_string(),
                });
            }
        } else if !self.root.join(&source).exists() {
            return Err(ResolveError::ResourceMissing {
                descriptor: descriptor_path.display().to_string(),
                resource: target.to_string(),
            });
        }

        if seen_resources.insert((source.clone(), target.to_string())) {
            let resource = ResourceRef {
                source,
                target: target.to_string(),
            };
            for file in self.expand_resource(&resource)? {
                derived.push((file, origin));
            }
            resources.push(resource);
        }
        Ok(())
    }

    /// Scan a legacy (non-YAML) service source for marker comments of the
    /// form `# resource: <name>` and treat each match as a declared
    /// resource.
    fn scan_legacy_markers(
        &self,
        path: &Path,
        seen_resources: &mut HashSet<(PathBuf, String)>,
        derived: &mut Vec<(PathBuf, Origin)>,
        resources: &mut Vec<ResourceRef>,
    ) -> Result<(), ResolveError> {
        let text =
            fs::read_to_string(self.root.join(path)).map_err(|source| ResolveError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        for line in text.lines() {
            if let Some(caps) = self.marker.captures(line) {
                let name = caps[2].trim();
                if !name.is_empty() {
                    self.add_resource(
                        path,
                        name,
                        Origin::DerivedLegacy,
                        seen_resources,
                        derived,
                        resources,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Extract the paths a pre-built `.qrf` manifest loads, relative to the
    /// manifest's own directory.
    fn manifest_loads(&self, path: &Path) -> Result<Vec<PathBuf>, ResolveError> {
        let text =
            fs::read_to_string(self.root.join(path)).map_err(|source| ResolveError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let dir = path.parent().unwrap_or(Path::new(""));
        let mut loads = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("load ") {
                loads.push(normalize(&dir.join(rest.trim())));
            }
        }
        Ok(loads)
    }

    /// Expand one resource reference into the concrete files it names:
    /// wildcard sources are globbed, directories are walked recursively,
    /// editor backups and non-regular files are skipped.
    pub fn expand_resource(&self, resource: &ResourceRef) -> Result<Vec<PathBuf>, ResolveError> {
        let mut out = Vec::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        queue.push_back(resource.source.clone());

        while let Some(rel) = queue.pop_front() {
            let rel_str = rel.to_string_lossy().into_owned();
            if rel_str.ends_with('~') {
                continue;
            }
            if has_wildcard(&rel_str) {
                let pattern = self.root.join(&rel);
                let paths = glob::glob(&pattern.to_string_lossy()).map_err(|source| {
                    ResolveError::BadPattern {
                        pattern: rel_str.clone(),
                        source,
                    }
                })?;
                let mut matches: Vec<PathBuf> = paths
                    .filter_map(Result::ok)
                    .map(|p| p.strip_prefix(&self.root).unwrap_or(&p).to_path_buf())
                    .collect();
                matches.sort();
                for m in matches.into_iter().rev() {
                    queue.push_front(m);
                }
            } else if self.root.join(&rel).is_dir() {
                queue.push_front(rel.join("*"));
            } else if self.root.join(&rel).is_file() {
                out.push(rel);
            }
        }
        Ok(out)
    }
}

/// Lexically normalize a relative path: drop `.` components and resolve
/// `..` against preceding components. This is the canonical form used for
/// deduplication.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.is_empty() {
                    parts.push(component.as_os_str().to_os_string());
                } else {
                    parts.pop();
                }
            }
            other => parts.push(other.as_os_str().to_os_string()),
        }
    }
    parts.iter().collect()
}

fn has_wildcard(spec: &str) -> bool {
    spec.contains('*') || spec.contains('?')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize(Path::new("./svc.yaml")), PathBuf::from("svc.yaml"));
    }

    #[test]
    fn test_service_descriptor_closure() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "svc.qsd.yaml",
            "code: svc.py\nresource:\n  - static/*.html\n",
        );
        write_file(dir.path(), "svc.py", "print('hi')\n");
        write_file(dir.path(), "static/a.html", "<html></html>\n");

        let resolver = DependencyResolver::new(dir.path());
        let resolution = resolver.resolve(&[PathBuf::from("svc.qsd.yaml")]).unwrap();

        assert_eq!(
            resolution.paths(),
            vec![
                PathBuf::from("svc.qsd.yaml"),
                PathBuf::from("svc.py"),
                PathBuf::from("static/a.html"),
            ]
        );
        assert_eq!(resolution.files[0].origin, Origin::Explicit);
        assert_eq!(resolution.files[1].origin, Origin::DerivedCode);
        assert_eq!(resolution.files[2].origin, Origin::DerivedResource);
        assert_eq!(
            resolution.resources,
            vec![ResourceRef {
                source: PathBuf::from("static/*.html"),
                target: "static/*.html".to_string(),
            }]
        );
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn test_literal_resource_joins_resolved_set() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "svc.qsd.yaml",
            "code: svc.py\nresource:\n  - static/a.html\n",
        );
        write_file(dir.path(), "svc.py", "svc\n");
        write_file(dir.path(), "static/a.html", "<html></html>\n");

        let resolver = DependencyResolver::new(dir.path());
        let resolution = resolver.resolve(&[PathBuf::from("svc.qsd.yaml")]).unwrap();

        assert!(resolution.contains(Path::new("static/a.html")));
        let resource = resolution
            .files
            .iter()
            .find(|f| f.path == PathBuf::from("static/a.html"))
            .unwrap();
        assert_eq!(resource.origin, Origin::DerivedResource);
    }

    #[test]
    fn test_dedup_keeps_first_origin() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "svc.qsd.yaml", "code: shared.py\n");
        write_file(dir.path(), "shared.py", "x = 1\n");

        let resolver = DependencyResolver::new(dir.path());
        let resolution = resolver
            .resolve(&[PathBuf::from("shared.py"), PathBuf::from("svc.qsd.yaml")])
            .unwrap();

        assert_eq!(resolution.files.len(), 2);
        assert_eq!(resolution.files[0].path, PathBuf::from("shared.py"));
        assert_eq!(resolution.files[0].origin, Origin::Explicit);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "job.qjob.yaml", "code: job.py\n");
        write_file(dir.path(), "job.py", "x = 1\n");

        let resolver = DependencyResolver::new(dir.path());
        let seed = vec![PathBuf::from("job.qjob.yaml")];
        let first = resolver.resolve(&seed).unwrap();
        let second = resolver.resolve(&seed).unwrap();
        assert_eq!(first.paths(), second.paths());
    }

    #[test]
    fn test_missing_literal_resource_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "svc.qsd.yaml", "resource:\n  - missing.html\n");

        let resolver = DependencyResolver::new(dir.path());
        let err = resolver
            .resolve(&[PathBuf::from("svc.qsd.yaml")])
            .unwrap_err();
        assert!(matches!(err, ResolveError::ResourceMissing { .. }));
    }

    #[test]
    fn test_dangling_resource_glob_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "svc.qsd.yaml", "resource:\n  - static/*.css\n");

        let resolver = DependencyResolver::new(dir.path());
        let err = resolver
            .resolve(&[PathBuf::from("svc.qsd.yaml")])
            .unwrap_err();
        assert!(matches!(err, ResolveError::ResourceGlobMismatch { .. }));
    }

    #[test]
    fn test_malformed_descriptor_degrades() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "bad.qsd.yaml", "code: [broken\n");
        write_file(dir.path(), "good.qjob.yaml", "code: good.py\n");
        write_file(dir.path(), "good.py", "x = 1\n");

        let resolver = DependencyResolver::new(dir.path());
        let resolution = resolver
            .resolve(&[PathBuf::from("bad.qsd.yaml"), PathBuf::from("good.qjob.yaml")])
            .unwrap();

        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.warnings[0].path, dir.path().join("bad.qsd.yaml"));
        assert!(resolution.contains(Path::new("good.py")));
    }

    #[test]
    fn test_legacy_marker_scan() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "legacy.qsd",
            "# legacy service\n# resource: page.html\nsub init() {}\n",
        );
        write_file(dir.path(), "page.html", "<p/>\n");

        let resolver = DependencyResolver::new(dir.path());
        let resolution = resolver.resolve(&[PathBuf::from("legacy.qsd")]).unwrap();
        assert_eq!(
            resolution.resources,
            vec![ResourceRef {
                source: PathBuf::from("page.html"),
                target: "page.html".to_string(),
            }]
        );
        let page = resolution
            .files
            .iter()
            .find(|f| f.path == PathBuf::from("page.html"))
            .unwrap();
        assert_eq!(page.origin, Origin::DerivedLegacy);
    }

    #[test]
    fn test_manifest_pulls_its_closure() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "rel/done.qrf",
            "# header\nload jobs/a.qjob.yaml\nload jobs/a.py\n",
        );
        write_file(dir.path(), "rel/jobs/a.qjob.yaml", "code: a.py\n");
        write_file(dir.path(), "rel/jobs/a.py", "x = 1\n");

        let resolver = DependencyResolver::new(dir.path());
        let resolution = resolver.resolve(&[PathBuf::from("rel/done.qrf")]).unwrap();

        assert!(resolution.contains(Path::new("rel/jobs/a.qjob.yaml")));
        assert!(resolution.contains(Path::new("rel/jobs/a.py")));
        let yaml = resolution
            .files
            .iter()
            .find(|f| f.path == PathBuf::from("rel/jobs/a.qjob.yaml"))
            .unwrap();
        assert_eq!(yaml.origin, Origin::DerivedManifest);
    }

    #[test]
    fn test_expand_resource_recurses_directories() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "svc.qsd.yaml", "resource:\n  - static\n");
        write_file(dir.path(), "static/a.html", "a\n");
        write_file(dir.path(), "static/css/site.css", "b\n");

        let resolver = DependencyResolver::new(dir.path());
        let resolution = resolver.resolve(&[PathBuf::from("svc.qsd.yaml")]).unwrap();
        let expanded = resolver.expand_resource(&resolution.resources[0]).unwrap();
        assert_eq!(
            expanded,
            vec![
                PathBuf::from("static/a.html"),
                PathBuf::from("static/css/site.css")
            ]
        );
    }
}
