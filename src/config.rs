//! Release run configuration.
//!
//! All options for a packaging run are collected into one immutable
//! [`ReleaseConfig`] value and threaded through every call; nothing reads
//! ambient global state after construction. Environment discovery happens
//! here and only here.
//!
//! # Environment Variables
//!
//! - `RELPACK_RELEASE_DIR`: root directory release trees are created under
//!   - default: `$HOME/releases`, falling back to `./releases`
//! - `RELPACK_LOG_LEVEL`: logging level when no CLI flag is given (read in
//!   `main`)

use crate::package::RelocationPlan;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Labels are namespaced with this prefix unless the caller already
/// supplied it.
pub const LABEL_PREFIX: &str = "qorus-user-";

/// Target directory for Python module payloads when no override is given.
pub const DEFAULT_PYTHON_DEST: &str = "user/python/lib/python3.11/site-packages";

/// Errors raised while assembling a release configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The label argument names an existing file, which almost always means
    /// the caller swapped the label and file arguments
    #[error("label '{0}' is an existing file - check arguments and try again")]
    LabelIsFile(String),

    /// `--python-module-dest` without `--python-module-dir`
    #[error("python-module-dest can only be used in addition to the python-module option")]
    PythonDestWithoutDir,

    /// The source root does not exist or is not a directory
    #[error("source directory '{0}' does not exist or is not a directory")]
    BadSourceRoot(PathBuf),
}

/// Immutable options for one packaging run.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Root all release components are given relative to
    pub source_root: PathBuf,
    /// Directory release trees are created under
    pub release_dir: PathBuf,
    /// Parent for the process-scoped staging directory
    pub temp_dir: PathBuf,
    /// Normalized release label (carries [`LABEL_PREFIX`])
    pub label: String,
    /// Path relocation applied while packaging
    pub relocation: RelocationPlan,
    /// Relocate `.qm` module files when the default additive prefix kicks in
    pub fix_module_paths: bool,
    /// SQL files to execute in the user schema, in order
    pub sql_files: Vec<String>,
    /// Emit `refresh-recursive` after loading
    pub refresh: bool,
    /// Emit legacy `refresh-all` after loading
    pub refresh_compat: bool,
    /// Also produce the backup-excluding `.tar.bz2` distribution archive
    pub compress: bool,
    /// Keep the temporary staging directory for post-mortem inspection
    pub keep_staging: bool,
    /// Run `install.sh` after packaging
    pub install: bool,
    /// Pass `-F` (full verification) to `install.sh`
    pub full_install: bool,
    /// Pass `-v` to `install.sh`
    pub verbose_install: bool,
    /// Directory to package as a Python module payload
    pub python_module_dir: Option<PathBuf>,
    /// Target directory for the Python module payload, relative to the
    /// installation root
    pub python_module_dest: Option<String>,
}

impl ReleaseConfig {
    /// Validate cross-field constraints. Called once after construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_root.is_dir() {
            return Err(ConfigError::BadSourceRoot(self.source_root.clone()));
        }
        if self.python_module_dest.is_some() && self.python_module_dir.is_none() {
            return Err(ConfigError::PythonDestWithoutDir);
        }
        Ok(())
    }

    /// Effective Python module destination (default applied).
    pub fn python_dest(&self) -> String {
        self.python_module_dest
            .clone()
            .unwrap_or_else(|| DEFAULT_PYTHON_DEST.to_string())
    }
}

/// Release directory discovery: environment override, then `$HOME/releases`,
/// then `./releases`.
pub fn default_release_dir() -> PathBuf {
    if let Ok(dir) = env::var("RELPACK_RELEASE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(home) = dirs::home_dir() {
        return home.join("releases");
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("releases")
}

/// Prefix the label unless it is already namespaced. An existing file with
/// the label's name is rejected: it means the arguments are out of order.
pub fn normalize_label(label: &str) -> Result<String, ConfigError> {
    if Path::new(label).is_file() {
        return Err(ConfigError::LabelIsFile(label.to_string()));
    }
    if label.starts_with(LABEL_PREFIX) {
        Ok(label.to_string())
    } else {
        Ok(format!("{}{}", LABEL_PREFIX, label))
    }
}

/// Normalize a relocation prefix: squeeze repeated separators, strip
/// leading and trailing `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    let mut last_sep = false;
    for c in prefix.chars() {
        if c == '/' {
            if !last_sep && !out.is_empty() {
                out.push('/');
            }
            last_sep = true;
        } else {
            out.push(c);
            last_sep = false;
        }
    }
    if out.ends_with('/') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = { "user", "user" },
        leading = { "/user", "user" },
        trailing = { "user/", "user" },
        squeezed = { "user//modules///x", "user/modules/x" },
        everything = { "//user//modules/", "user/modules" },
    )]
    fn test_normalize_prefix(input: &str, expected: &str) {
        assert_eq!(normalize_prefix(input), expected);
    }

    #[test]
    fn test_normalize_label_adds_prefix_once() {
        assert_eq!(normalize_label("v1.0").unwrap(), "qorus-user-v1.0");
        assert_eq!(
            normalize_label("qorus-user-v1.0").unwrap(),
            "qorus-user-v1.0"
        );
    }

    #[test]
    fn test_label_naming_existing_file_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("v1.0");
        std::fs::write(&file, b"x").unwrap();
        let err = normalize_label(file.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::LabelIsFile(_)));
    }
}
