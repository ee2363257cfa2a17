//! Release packaging: staging, relocation, resource materialization, and
//! archive creation.
//!
//! A packaging run stages the resolved file set under a process-scoped
//! temporary directory (so concurrent runs on one host cannot collide),
//! applies the requested relocation plan, materializes declared resources,
//! and produces `<release-dir>/<label>/` containing the `.tar.gz` release
//! archive, an `install.sh`, and the load manifest under `releases/`.
//! The staging directory is removed on completion or abort unless the
//! caller asked to keep it for post-mortem inspection.

pub mod archive;

use crate::config::ReleaseConfig;
use crate::manifest::{LoadManifest, ManifestBuilder};
use crate::resolve::{normalize, Origin, Resolution, ResourceRef};
use crate::util;
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

const INSTALL_SH: &str = include_str!("../../templates/install.sh");

/// How packaged file paths are rewritten relative to their archived
/// position. Computed once from the CLI flags and never mutated during
/// packaging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelocationPlan {
    /// Archive mirrors the source tree
    #[default]
    None,
    /// Every file's target root is rewritten to one fixed directory.
    /// Same-named files from different explicit root directories are not
    /// collision-checked; callers flattening across directories are
    /// responsible for keeping base names unique.
    FlatPrefix(String),
    /// The original relative path gets a prefix directory prepended
    AdditivePrefix {
        prefix: String,
        /// Move `.qm` module files into `user/modules`, except modules whose
        /// containing directory already carries the module's base name
        relocate_modules: bool,
    },
}

/// What a completed packaging run produced.
#[derive(Debug)]
pub struct PackageOutcome {
    /// `<release-dir>/<label>`
    pub release_root: PathBuf,
    /// The `.tar.gz` release archive
    pub archive: PathBuf,
    /// The written load manifest
    pub manifest_path: PathBuf,
    /// Manifest content, including any build warnings
    pub manifest: LoadManifest,
    /// The distribution `.tar.bz2`, when `--compress` was given
    pub dist_archive: Option<PathBuf>,
}

/// Staging directory with cleanup-on-drop. Retained when the caller asked
/// for it, so a failed run can be inspected.
struct StagingDir {
    path: PathBuf,
    keep: bool,
}

impl StagingDir {
    fn create(temp_dir: &Path, keep: bool) -> Result<Self> {
        let name = format!(
            "make-release-{}-{}-pid-{}",
            util::current_host(),
            util::current_user(),
            std::process::id()
        );
        let path = temp_dir.join(name);
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create staging directory {}", path.display()))?;
        debug!(path = %path.display(), "created staging directory");
        Ok(Self { path, keep })
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.keep {
            info!(path = %self.path.display(), "keeping staging directory");
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove staging directory");
        }
    }
}

/// Materializes one resolved file set as a release tree.
pub struct Packager<'a> {
    config: &'a ReleaseConfig,
}

impl<'a> Packager<'a> {
    pub fn new(config: &'a ReleaseConfig) -> Self {
        Self { config }
    }

    /// Package `resolution` under the configured relocation plan.
    /// `sql_paths` are the expanded user SQL files: they ride along in the
    /// resolution (and the archive) but are listed separately in the
    /// manifest, so they are excluded from the load candidates.
    pub fn pack(&self, resolution: &Resolution, sql_paths: &[PathBuf]) -> Result<PackageOutcome> {
        let config = self.config;
        let release_root = config.release_dir.join(&config.label);
        let archive = release_root.join(format!("{}.tar.gz", config.label));

        // resource files are materialized by the staging step at their
        // target-relative paths, so they are not copied from their source
        // locations and never become load candidates
        let sql_set: HashSet<PathBuf> = sql_paths.iter().map(|p| normalize(p)).collect();
        let candidates: Vec<PathBuf> = resolution
            .files
            .iter()
            .filter(|f| !matches!(f.origin, Origin::DerivedResource | Origin::DerivedLegacy))
            .map(|f| f.path.clone())
            .filter(|p| !sql_set.contains(p))
            .collect();

        // a release with resources but no relocation would scatter resource
        // targets over the installation root; the historical default is an
        // additive "user" prefix
        let mut plan = config.relocation.clone();
        if plan == RelocationPlan::None && !resolution.resources.is_empty() {
            plan = RelocationPlan::AdditivePrefix {
                prefix: "user".to_string(),
                relocate_modules: config.fix_module_paths,
            };
            debug!("resources present without relocation; defaulting to additive prefix 'user'");
        }

        self.prepare_release_root(&release_root)?;

        let load_list = match &plan {
            RelocationPlan::None => {
                self.pack_plain(&candidates, &archive)?;
                candidates
                    .iter()
                    .map(|p| util::slash_path(p))
                    .collect::<Vec<_>>()
            }
            RelocationPlan::FlatPrefix(prefix) => {
                self.pack_flat(resolution, &candidates, prefix, &archive)?;
                candidates
                    .iter()
                    .map(|p| format!("{}/{}", prefix, basename(p)))
                    .collect()
            }
            RelocationPlan::AdditivePrefix {
                prefix,
                relocate_modules,
            } => {
                self.pack_additive(resolution, &candidates, prefix, *relocate_modules, &archive)?;
                candidates
                    .iter()
                    .map(|p| format!("{}/{}", prefix, basename(p)))
                    .collect()
            }
        };
        info!(archive = %archive.display(), "created user tar file");

        if let Some(module_dir) = &config.python_module_dir {
            self.add_python_modules(&release_root, &archive, module_dir)?;
        }

        let sql_list: Vec<String> = sql_paths
            .iter()
            .map(|p| match &plan {
                RelocationPlan::None => util::slash_path(p),
                RelocationPlan::FlatPrefix(prefix)
                | RelocationPlan::AdditivePrefix { prefix, .. } => {
                    format!("{}/{}", prefix, basename(p))
                }
            })
            .collect();

        let manifest_dir = release_root.join("releases");
        let manifest_path = manifest_dir.join(format!("{}.qrf", config.label));
        let manifest = ManifestBuilder::new(&manifest_dir, &config.source_root)
            .refresh(config.refresh)
            .refresh_compat(config.refresh_compat)
            .build(&load_list, &candidates, &sql_list);
        for warning in &manifest.warnings {
            warn!("{}", warning);
        }
        manifest
            .write(&manifest_path)
            .with_context(|| format!("failed to write manifest {}", manifest_path.display()))?;

        let dist_archive = if config.compress {
            Some(self.compress_release(&release_root)?)
        } else {
            None
        };

        if config.install {
            self.run_install(&release_root)?;
        }

        Ok(PackageOutcome {
            release_root,
            archive,
            manifest_path,
            manifest,
            dist_archive,
        })
    }

    /// Create `<release-dir>/<label>/` with `install.sh` and the
    /// `releases/` subdirectory.
    fn prepare_release_root(&self, release_root: &Path) -> Result<()> {
        fs::create_dir_all(release_root)
            .with_context(|| format!("failed to create {}", release_root.display()))?;

        let install = release_root.join("install.sh");
        if !install.exists() {
            fs::write(&install, INSTALL_SH)
                .with_context(|| format!("failed to write {}", install.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&install, fs::Permissions::from_mode(0o755))?;
            }
            info!(path = %install.display(), "copied install.sh template");
        }

        fs::create_dir_all(release_root.join("releases"))
            .context("failed to create releases subdirectory")?;
        Ok(())
    }

    /// No relocation: archive members are the resolved relative paths.
    fn pack_plain(&self, candidates: &[PathBuf], archive_path: &Path) -> Result<()> {
        archive::create_tar_gz(archive_path, &self.config.source_root, candidates)
    }

    /// Flat prefix: every file lands under one target root. Relative
    /// structure below the first candidate's base directory is preserved to
    /// keep same-directory trees from colliding.
    fn pack_flat(
        &self,
        resolution: &Resolution,
        candidates: &[PathBuf],
        prefix: &str,
        archive_path: &Path,
    ) -> Result<()> {
        let staging = StagingDir::create(&self.config.temp_dir, self.config.keep_staging)?;
        let dir_name = staging.path.join(prefix);
        fs::create_dir_all(&dir_name)
            .with_context(|| format!("failed to create {}", dir_name.display()))?;

        let base_dir = candidates
            .first()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new(""))
            .to_path_buf();

        for file in candidates {
            let file_dir = file.parent().unwrap_or(Path::new(""));
            let target_dir = match file_dir.strip_prefix(&base_dir) {
                Ok(sub) if !sub.as_os_str().is_empty() => dir_name.join(sub),
                _ => dir_name.clone(),
            };
            fs::create_dir_all(&target_dir)
                .with_context(|| format!("failed to create {}", target_dir.display()))?;
            let src = self.config.source_root.join(file);
            fs::copy(&src, target_dir.join(file.file_name().unwrap_or_default()))
                .with_context(|| format!("failed to stage {}", file.display()))?;
        }

        self.stage_resources(&resolution.resources, &dir_name)?;

        let first = first_component(prefix);
        archive::create_tar_gz(archive_path, &staging.path, &[PathBuf::from(first)])
    }

    /// Additive prefix: re-root the resolved tree one prefix deeper by
    /// extracting an intermediate archive, then optionally relocate module
    /// files.
    fn pack_additive(
        &self,
        resolution: &Resolution,
        candidates: &[PathBuf],
        prefix: &str,
        relocate_modules: bool,
        archive_path: &Path,
    ) -> Result<()> {
        let staging = StagingDir::create(&self.config.temp_dir, self.config.keep_staging)?;
        let dir_name = staging.path.join(prefix);
        fs::create_dir_all(&dir_name)
            .with_context(|| format!("failed to create {}", dir_name.display()))?;
        debug!(dir = %dir_name.display(), "creating install dir");

        self.stage_resources(&resolution.resources, &dir_name)?;

        let intermediate = staging.path.join("tqr.tar.gz");
        archive::create_tar_gz(&intermediate, &self.config.source_root, candidates)?;
        archive::extract_tar_gz(&intermediate, &dir_name)?;
        fs::remove_file(&intermediate).ok();

        if relocate_modules {
            self.relocate_modules(candidates, &staging.path, &dir_name)?;
        }

        let first = first_component(prefix);
        archive::create_tar_gz(archive_path, &staging.path, &[PathBuf::from(first)])
    }

    /// Move `.qm` module files into `user/modules`, skipping modules whose
    /// containing directory already carries the module's base name and
    /// deduplicating by base name.
    fn relocate_modules(
        &self,
        candidates: &[PathBuf],
        staging_root: &Path,
        dir_name: &Path,
    ) -> Result<()> {
        let mut done: HashSet<String> = HashSet::new();
        let mut target_dir: Option<PathBuf> = None;

        for file in candidates {
            if !file.extension().is_some_and(|e| e == "qm") {
                continue;
            }
            let base = basename(file);
            let parent_matches = file
                .parent()
                .and_then(|p| p.file_name())
                .is_some_and(|p| format!("{}.qm", p.to_string_lossy()) == base);
            if parent_matches || !done.insert(base.clone()) {
                continue;
            }

            let target_dir = match &target_dir {
                Some(dir) => dir.clone(),
                None => {
                    let dir = staging_root.join("user/modules");
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("failed to create {}", dir.display()))?;
                    target_dir = Some(dir.clone());
                    dir
                }
            };

            let from = dir_name.join(file);
            let to = target_dir.join(&base);
            fs::rename(&from, &to)
                .with_context(|| format!("failed to relocate module {}", file.display()))?;
            debug!(module = %base, "relocated module file");
        }
        Ok(())
    }

    /// Copy declared resources into the staging tree at their
    /// target-relative locations, expanding wildcard sources recursively.
    fn stage_resources(&self, resources: &[ResourceRef], dir_name: &Path) -> Result<()> {
        for resource in resources {
            let target_sub = Path::new(&resource.target)
                .parent()
                .unwrap_or(Path::new(""));
            let target_dir = dir_name.join(target_sub);
            fs::create_dir_all(&target_dir)
                .with_context(|| format!("failed to create {}", target_dir.display()))?;

            let source = &resource.source;
            let name = basename(source);
            if name.contains('*') || name.contains('?') {
                let parent = self
                    .config
                    .source_root
                    .join(source.parent().unwrap_or(Path::new("")));
                self.copy_glob(&parent, &name, &target_dir)?;
            } else {
                let src = self.config.source_root.join(source);
                copy_recursive(&src, &target_dir.join(&name))?;
            }
        }
        Ok(())
    }

    /// Copy every regular file matching `pattern` under `base` into
    /// `target_dir`, recursing into matched subdirectories and preserving
    /// the subdirectory part of the pattern in the target tree. Backup
    /// files and non-regular entries are skipped.
    fn copy_glob(&self, base: &Path, pattern: &str, target_dir: &Path) -> Result<()> {
        let full_pattern = base.join(pattern);
        let entries = glob::glob(&full_pattern.to_string_lossy())
            .with_context(|| format!("invalid resource pattern {}", pattern))?;

        for entry in entries.filter_map(|e| e.ok()) {
            let entry_name = basename(&entry);
            if entry_name.ends_with('~') {
                continue;
            }

            if entry.is_dir() {
                let sub = entry.strip_prefix(base).unwrap_or(&entry);
                let leaf = Path::new(pattern)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| pattern.to_string());
                let nested = format!("{}/{}", util::slash_path(sub), leaf);
                self.copy_glob(base, &nested, target_dir)?;
                continue;
            }
            if !entry.is_file() {
                continue;
            }

            let mut target = target_dir.to_path_buf();
            if let Some(sub) = Path::new(pattern).parent().filter(|p| !p.as_os_str().is_empty()) {
                target = target.join(sub);
                fs::create_dir_all(&target)
                    .with_context(|| format!("failed to create {}", target.display()))?;
            }
            fs::copy(&entry, target.join(&entry_name))
                .with_context(|| format!("failed to copy resource {}", entry.display()))?;
        }
        Ok(())
    }

    /// Inject a Python module directory into an already-built archive:
    /// extract, copy the module tree to its destination, re-archive.
    fn add_python_modules(
        &self,
        release_root: &Path,
        archive_path: &Path,
        module_dir: &Path,
    ) -> Result<()> {
        let scratch = StagingDir::create(release_root, false)?;
        archive::extract_tar_gz(archive_path, &scratch.path)?;

        let dest = scratch.path.join(self.config.python_dest());
        fs::create_dir_all(&dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        copy_recursive(module_dir, &dest.join(basename(module_dir)))?;

        let mut members: Vec<PathBuf> = fs::read_dir(&scratch.path)
            .with_context(|| format!("failed to list {}", scratch.path.display()))?
            .filter_map(|e| e.ok())
            .map(|e| PathBuf::from(e.file_name()))
            .collect();
        members.sort();
        archive::create_tar_gz(archive_path, &scratch.path, &members)?;
        info!(dest = %self.config.python_dest(), "added python modules to release");
        Ok(())
    }

    /// Distribution archive: bzip2 tar of the whole release tree, backup
    /// entries excluded.
    fn compress_release(&self, release_root: &Path) -> Result<PathBuf> {
        let parent = release_root.parent().unwrap_or(Path::new("."));
        let dist = parent.join(format!("{}.tar.bz2", self.config.label));
        archive::create_tar_bz2_excluding_backups(
            &dist,
            parent,
            &[PathBuf::from(&self.config.label)],
        )?;
        info!(archive = %dist.display(), "created release archive");
        Ok(dist)
    }

    /// Run the packaged `install.sh` inside the release tree.
    fn run_install(&self, release_root: &Path) -> Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("./install.sh").current_dir(release_root);
        if self.config.verbose_install {
            cmd.arg("-v");
        }
        if self.config.full_install {
            cmd.arg("-F");
        }
        let status = cmd
            .status()
            .with_context(|| format!("failed to run install.sh in {}", release_root.display()))?;
        if !status.success() {
            bail!("install.sh returned error code {}", status);
        }
        Ok(())
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn first_component(prefix: &str) -> String {
    prefix.split('/').next().unwrap_or(prefix).to_string()
}

/// Copy a file, or a directory tree recursively.
fn copy_recursive(src: &Path, dest: &Path) -> Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut children: Vec<_> = fs::read_dir(src)
            .with_context(|| format!("failed to list {}", src.display()))?
            .filter_map(|e| e.ok())
            .collect();
        children.sort_by_key(|e| e.file_name());
        for child in children {
            copy_recursive(&child.path(), &dest.join(child.file_name()))?;
        }
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(src, dest).with_context(|| format!("failed to copy {}", src.display()))?;
    }
    Ok(())
}
