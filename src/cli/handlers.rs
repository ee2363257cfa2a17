//! Command handlers: thin orchestration from parsed arguments to the
//! library modules. Handlers return process exit codes; every failure maps
//! to a single diagnostic and exit code 1.

use super::commands::{ReleaseArgs, RemoteArgs};
use crate::config::{self, ReleaseConfig};
use crate::package::{Packager, RelocationPlan};
use crate::remote::command::{self, CommandMessage};
use crate::remote::netrc::RemoteConfig;
use crate::remote::oload;
use crate::resolve::{DependencyResolver, PathResolver};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub fn handle_release(args: &ReleaseArgs, verbose: bool) -> i32 {
    if args.show_release_dir {
        let dir = args
            .release_dir
            .clone()
            .unwrap_or_else(config::default_release_dir);
        println!("{}", dir.display());
        return 0;
    }

    match run_release(args, verbose) {
        Ok(()) => {
            println!("done!");
            0
        }
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            1
        }
    }
}

pub fn handle_remote(args: &RemoteArgs) -> i32 {
    match run_remote(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            1
        }
    }
}

fn run_release(args: &ReleaseArgs, verbose: bool) -> Result<()> {
    let config = build_config(args, verbose)?;
    debug!(?config, "release configuration assembled");

    // resolution happens before any filesystem side effect: a bad spec
    // must not leave a half-created release tree behind
    let resolver = PathResolver::new(&config.source_root);
    let explicit = resolver.resolve(&args.files)?;
    let sql_paths = resolver.resolve(&config.sql_files)?;

    let mut seed = explicit;
    seed.extend(sql_paths.iter().cloned());

    let deps = DependencyResolver::new(&config.source_root);
    let resolution = deps.resolve(&seed)?;
    for warning in &resolution.warnings {
        warn!(path = %warning.path.display(), detail = %warning.detail, "descriptor skipped");
    }
    info!(
        files = resolution.files.len(),
        resources = resolution.resources.len(),
        "dependency closure resolved"
    );

    let packager = Packager::new(&config);
    let outcome = packager.pack(&resolution, &sql_paths)?;
    info!(
        archive = %outcome.archive.display(),
        manifest = %outcome.manifest_path.display(),
        "release packaged"
    );
    Ok(())
}

fn build_config(args: &ReleaseArgs, verbose: bool) -> Result<ReleaseConfig> {
    // a prefix option implies the current directory as source root
    let source_dir = match &args.source_dir {
        Some(dir) => dir.clone(),
        None => PathBuf::from("."),
    };
    let source_root = source_dir
        .canonicalize()
        .with_context(|| format!("cannot resolve source directory {}", source_dir.display()))?;

    let relocation = if let Some(prefix) = &args.prefix {
        RelocationPlan::FlatPrefix(config::normalize_prefix(prefix))
    } else if let Some(prefix) = &args.add_prefix {
        RelocationPlan::AdditivePrefix {
            prefix: config::normalize_prefix(prefix),
            relocate_modules: args.fix_module_paths,
        }
    } else {
        RelocationPlan::None
    };

    let config = ReleaseConfig {
        source_root,
        release_dir: args
            .release_dir
            .clone()
            .unwrap_or_else(config::default_release_dir),
        temp_dir: std::env::temp_dir(),
        label: config::normalize_label(&args.label)?,
        relocation,
        fix_module_paths: args.fix_module_paths,
        sql_files: args.user_sql.clone(),
        refresh: args.refresh,
        refresh_compat: args.refresh_compat,
        compress: args.compress,
        keep_staging: args.keep,
        install: args.install,
        full_install: args.full,
        verbose_install: verbose,
        python_module_dir: args.python_module_dir.clone(),
        python_module_dest: args.python_module_dest.clone(),
    };
    config.validate()?;
    Ok(config)
}

fn run_remote(args: &RemoteArgs) -> Result<()> {
    let config = RemoteConfig::from_netrc(&args.netrc)?;
    debug!(
        cmd = %args.command,
        args = ?args.args,
        host = %config.machine,
        "dispatching remote command"
    );

    if args.command == "oload" {
        oload::run(&config, &args.args)
    } else {
        let message = CommandMessage::new(args.command.as_str(), args.args.clone());
        command::run(&config, &message).context("remote command failed")
    }
}
