//! Root spec expansion: relative paths, glob patterns, and directory
//! recursion under a fixed source root.

use super::{normalize, ResolveError};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension reserved for load manifests; they are resolver outputs, not
/// inputs, and are skipped with a warning when found inside a directory.
const MANIFEST_EXT: &str = "qrf";

/// Expands root specs (relative paths, glob patterns, directories) into a
/// flat, ordered list of existing files relative to the source root.
///
/// Directory recursion skips editor backups (`name~`), legacy working
/// directories (`*old`), and `.qrf` manifests. Results preserve the order
/// specs were given in; directory children are visited in name order so
/// repeated runs produce identical lists.
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve every spec, failing fast on absolute paths, dangling globs,
    /// and missing files. No side effects occur before validation: callers
    /// may rely on an error here meaning nothing was staged or created.
    pub fn resolve(&self, specs: &[String]) -> Result<Vec<PathBuf>, ResolveError> {
        let mut out = Vec::new();
        for spec in specs {
            if Path::new(spec).is_absolute() {
                return Err(ResolveError::AbsolutePath {
                    path: spec.clone(),
                    root: self.root.clone(),
                });
            }
            // `..` components that survive normalization point outside the
            // source root; a release must never package files above it
            if normalize(Path::new(spec)).starts_with("..") {
                return Err(ResolveError::PathTraversal {
                    path: spec.clone(),
                    root: self.root.clone(),
                });
            }

            if has_wildcard(spec) {
                let matches = self.expand_glob(spec)?;
                if matches.is_empty() {
                    return Err(ResolveError::GlobMismatch(spec.clone()));
                }
                for m in matches {
                    self.collect(&m, &mut out)?;
                }
            } else {
                let full = self.root.join(spec);
                if !full.exists() {
                    return Err(ResolveError::MissingFile(PathBuf::from(spec)));
                }
                self.collect(Path::new(spec), &mut out)?;
            }
        }
        debug!(specs = specs.len(), files = out.len(), "resolved root specs");
        Ok(out)
    }

    fn expand_glob(&self, spec: &str) -> Result<Vec<PathBuf>, ResolveError> {
        let pattern = self.root.join(spec);
        let pattern = pattern.to_string_lossy();
        let mut matches = Vec::new();
        let paths = glob::glob(&pattern).map_err(|source| ResolveError::BadPattern {
            pattern: spec.to_string(),
            source,
        })?;
        for entry in paths {
            let path = entry.map_err(|e| ResolveError::Io {
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })?;
            let rel = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
            matches.push(rel);
        }
        matches.sort();
        Ok(matches)
    }

    /// Walk one resolved spec with an explicit worklist: files are emitted,
    /// directories are expanded in name order.
    fn collect(&self, start: &Path, out: &mut Vec<PathBuf>) -> Result<(), ResolveError> {
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        queue.push_back(start.to_path_buf());

        while let Some(rel) = queue.pop_front() {
            let name = rel.file_name().map(|n| n.to_string_lossy().into_owned());
            let name = name.unwrap_or_default();

            // editor backups are silently dropped everywhere
            if name.ends_with('~') {
                continue;
            }

            let full = self.root.join(&rel);
            if full.is_dir() {
                // legacy working directories
                if name.ends_with("old") {
                    continue;
                }
                let mut children: Vec<PathBuf> = Vec::new();
                let entries = fs::read_dir(&full).map_err(|source| ResolveError::Io {
                    path: full.clone(),
                    source,
                })?;
                for entry in entries {
                    let entry = entry.map_err(|source| ResolveError::Io {
                        path: full.clone(),
                        source,
                    })?;
                    children.push(rel.join(entry.file_name()));
                }
                children.sort();
                // keep traversal depth-first so a directory's contents stay
                // contiguous in the manifest
                for child in children.into_iter().rev() {
                    queue.push_front(child);
                }
                continue;
            }

            if rel.extension().is_some_and(|e| e == MANIFEST_EXT) && start != rel {
                warn!(path = %rel.display(), "skipping release manifest found during directory scan");
                continue;
            }

            if !full.exists() {
                return Err(ResolveError::MissingFile(rel));
            }

            out.push(normalize(&rel));
        }
        Ok(())
    }
}

fn has_wildcard(spec: &str) -> bool {
    spec.contains('*') || spec.contains('?')
}
