//! Load manifest construction.
//!
//! The manifest (`.qrf`) is the ordered directive file the target runtime
//! consumes to load a packaged release: one `load` line per loadable file,
//! `omquser-exec-sql` lines for operator SQL, and at most one trailing
//! refresh directive. It is plain UTF-8, one directive per line, stable and
//! human-diffable across runs.

use crate::util;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions the runtime loader understands; only these produce `load`
/// directives.
pub const LOAD_EXTENSIONS: [&str; 16] = [
    "qfd", "qsd", "java", "qclass", "qconst", "qwf", "qjob", "qconn", "qsm", "qmapper", "qvmap",
    "qscript", "qstep", "qmc", "yaml", "py",
];

/// Known non-loadable payload extensions: packaged, but never named in the
/// manifest and never warned about.
pub const PAYLOAD_EXTENSIONS: [&str; 14] = [
    "wsdl", "xml", "xsd", "dtd", "qm", "qlib", "jar", "class", "json", "qtest", "qc", "qhtml",
    "qjs", "qjson",
];

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Load(String),
    ExecSql(String),
    RefreshRecursive,
    RefreshAll,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Load(path) => write!(f, "load {}", path),
            Directive::ExecSql(path) => write!(f, "omquser-exec-sql {}", path),
            Directive::RefreshRecursive => write!(f, "refresh-recursive"),
            Directive::RefreshAll => write!(f, "refresh-all"),
        }
    }
}

/// Non-fatal conditions noticed while building a manifest. Surfaced as
/// values so callers can assert on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestWarning {
    /// File has no extension and is not executable
    NoExtension { path: PathBuf },
    /// Extension is neither loadable nor a known payload type
    UnknownExtension { path: PathBuf, ext: String },
    /// SQL file whose extension is not `sql`
    SqlExtension { path: PathBuf },
    /// Both refresh flags were requested; `refresh-recursive` was emitted
    RefreshConflict,
}

impl fmt::Display for ManifestWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestWarning::NoExtension { path } => {
                write!(f, "no extension in file '{}'", path.display())
            }
            ManifestWarning::UnknownExtension { path, ext } => {
                write!(f, "unknown extension '{}' in file '{}'", ext, path.display())
            }
            ManifestWarning::SqlExtension { path } => {
                write!(f, "user SQL file extension is not 'sql': {}", path.display())
            }
            ManifestWarning::RefreshConflict => {
                write!(f, "both refresh modes requested; emitting refresh-recursive")
            }
        }
    }
}

/// An ordered load manifest plus the warnings produced while building it.
#[derive(Debug, Default)]
pub struct LoadManifest {
    pub directives: Vec<Directive>,
    pub warnings: Vec<ManifestWarning>,
}

impl LoadManifest {
    /// Serialize to `path` with the informational header. File mode is
    /// 0644 on unix: the manifest is an artifact other operators read.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let mut f = fs::File::create(path)?;
        writeln!(
            f,
            "# automatically generated by {} v{} on {} ({}@{})",
            crate::NAME,
            crate::VERSION,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            util::current_user(),
            util::current_host(),
        )?;
        for directive in &self.directives {
            writeln!(f, "{}", directive)?;
        }
        drop(f);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
        }

        info!(path = %path.display(), "created user release file");
        Ok(())
    }

    pub fn load_paths(&self) -> Vec<&str> {
        self.directives
            .iter()
            .filter_map(|d| match d {
                Directive::Load(p) => Some(p.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Builds a [`LoadManifest`] from relocation-adjusted load paths.
///
/// Directive order mirrors the order files were discovered in the root spec
/// list; SQL directives always follow all `load` directives. When both
/// refresh flags are set the recursive form wins (compatibility default)
/// and the conflict is reported as a warning.
pub struct ManifestBuilder<'a> {
    /// Directory the manifest will live in; load paths under it are
    /// rewritten relative to it
    root_dir: &'a Path,
    /// Filesystem root the listed files live under, for executable probing
    source_root: &'a Path,
    refresh: bool,
    refresh_compat: bool,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(root_dir: &'a Path, source_root: &'a Path) -> Self {
        Self {
            root_dir,
            source_root,
            refresh: false,
            refresh_compat: false,
        }
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn refresh_compat(mut self, refresh_compat: bool) -> Self {
        self.refresh_compat = refresh_compat;
        self
    }

    /// `load_list` entries are target-relative load paths (already carrying
    /// any relocation prefix); `local_files` maps each entry to the local
    /// file it was packaged from; `sql_files` are appended as
    /// `omquser-exec-sql` directives in the given order.
    pub fn build(
        &self,
        load_list: &[String],
        local_files: &[PathBuf],
        sql_files: &[String],
    ) -> LoadManifest {
        let mut manifest = LoadManifest::default();
        let loadable: HashSet<&str> = LOAD_EXTENSIONS.iter().copied().collect();
        let payload: HashSet<&str> = PAYLOAD_EXTENSIONS.iter().copied().collect();

        for (i, entry) in load_list.iter().enumerate() {
            let local = local_files.get(i).cloned().unwrap_or_else(|| entry.into());
            match extension(entry) {
                None => {
                    // extensionless executables are launched by convention,
                    // not loaded by the manifest
                    if !util::is_executable(&self.source_root.join(&local)) {
                        manifest
                            .warnings
                            .push(ManifestWarning::NoExtension { path: local });
                    }
                }
                Some(ext) if loadable.contains(ext) => {
                    let path = self.load_path(entry);
                    manifest.directives.push(Directive::Load(path));
                }
                Some(ext) if payload.contains(ext) => {}
                Some(ext) => {
                    // same exemption as the extensionless branch: an
                    // executable is a standalone script, not a load target
                    if !util::is_executable(&self.source_root.join(&local)) {
                        manifest.warnings.push(ManifestWarning::UnknownExtension {
                            path: local,
                            ext: ext.to_string(),
                        });
                    }
                }
            }
        }

        for entry in sql_files {
            if extension(entry) != Some("sql") {
                manifest.warnings.push(ManifestWarning::SqlExtension {
                    path: PathBuf::from(entry),
                });
            }
            manifest
                .directives
                .push(Directive::ExecSql(self.load_path(entry)));
        }

        if self.refresh {
            if self.refresh_compat {
                manifest.warnings.push(ManifestWarning::RefreshConflict);
            }
            manifest.directives.push(Directive::RefreshRecursive);
        } else if self.refresh_compat {
            manifest.directives.push(Directive::RefreshAll);
        }

        debug!(
            directives = manifest.directives.len(),
            warnings = manifest.warnings.len(),
            "manifest built"
        );
        manifest
    }

    /// Rewrite one entry relative to the manifest's directory, with forward
    /// slashes regardless of platform.
    fn load_path(&self, entry: &str) -> String {
        let root = self.root_dir.to_string_lossy();
        let stripped = if !root.is_empty() && root != "." {
            entry
                .strip_prefix(&format!("{}/", root))
                .unwrap_or(entry)
        } else {
            entry
        };
        util::slash_path(Path::new(stripped))
    }
}

fn extension(entry: &str) -> Option<&str> {
    Path::new(entry)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
}
