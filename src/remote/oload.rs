//! `oload` orchestration: resolve dependencies, upload, dispatch, clean up.
//!
//! The remote `oload` command loads files that live on the operator's
//! machine, so before dispatching it every named file plus its dependency
//! closure is uploaded into a server-side holding directory. The command is
//! then sent with the base file names and the allocated directory; the
//! directory is removed afterwards on a best-effort basis.

use super::command::{self, CommandMessage};
use super::netrc::RemoteConfig;
use super::upload::{HttpRemoteStore, Uploader};
use crate::resolve::DependencyResolver;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Short options that consume the following argument.
const SPACED_SHORT: [&str; 8] = ["p", "r", "s", "t", "u", "D", "L", "X"];

/// Long options that consume the following argument.
const SPACED_LONG: [&str; 14] = [
    "schema",
    "user-schema",
    "url",
    "proxy-url",
    "data-ts",
    "index-ts",
    "delete",
    "delete-id",
    "datasource",
    "list",
    "refresh",
    "token",
    "export-cfg-val",
    "show-release",
];

/// Split raw arguments into files and pass-through options, keeping the
/// argument after an option that takes one attached to the options list.
pub fn split_args(args: &[String]) -> (Vec<String>, Vec<String>) {
    let mut files = Vec::new();
    let mut opts = Vec::new();
    let mut expect_value = false;

    for arg in args {
        if expect_value {
            opts.push(arg.clone());
            expect_value = false;
        } else if arg.starts_with('-') {
            opts.push(arg.clone());
            expect_value = takes_value(arg);
        } else {
            files.push(arg.clone());
        }
    }
    (files, opts)
}

fn takes_value(opt: &str) -> bool {
    if let Some(long) = opt.strip_prefix("--") {
        SPACED_LONG.contains(&long)
    } else if let Some(short) = opt.strip_prefix('-') {
        SPACED_SHORT.contains(&short)
    } else {
        false
    }
}

/// Run the full oload flow against the server `config` describes.
pub fn run(config: &RemoteConfig, args: &[String]) -> Result<()> {
    let (mut files, opts) = split_args(args);
    debug!(files = files.len(), opts = opts.len(), "parsed oload arguments");

    // directories cannot be loaded; missing files are reported and dropped
    files.retain(|f| !Path::new(f).is_dir());
    files.retain(|f| {
        if Path::new(f).exists() {
            true
        } else {
            println!("File does not exist: {}", f);
            false
        }
    });

    let root = PathBuf::from(".");
    let resolver = DependencyResolver::new(&root);
    let seed: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
    let resolution = resolver
        .resolve(&seed)
        .context("failed to resolve oload dependencies")?;
    for warning in &resolution.warnings {
        tracing::warn!(path = %warning.path.display(), detail = %warning.detail, "descriptor skipped");
    }

    // the resolution already folds expanded resource files in
    let upload_list = resolution.paths();

    println!(
        "Uploading files to remote host \"{}\": ",
        config.ws_base()
    );
    let mut uploader = Uploader::new(HttpRemoteStore::new(config)?);
    uploader
        .upload(&root, &upload_list)
        .context("failed to upload files")?;

    let mut message = CommandMessage::new("oload", vec![]);
    message.files = Some(
        files
            .iter()
            .map(|f| {
                Path::new(f)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| f.clone())
            })
            .collect(),
    );
    message.opts = Some(opts);
    message.dir = uploader.dir().map(String::from);

    info!(files = ?message.files, "executing oload on remote host");
    let result = command::run(config, &message).context("remote oload failed");

    // cleanup runs whether or not the command succeeded and never masks
    // the command's result
    uploader.cleanup(config.nodelete);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_plain_files() {
        let (files, opts) = split_args(&strings(&["a.yaml", "b.qsd"]));
        assert_eq!(files, strings(&["a.yaml", "b.qsd"]));
        assert!(opts.is_empty());
    }

    #[test]
    fn test_split_option_with_value() {
        let (files, opts) = split_args(&strings(&["-u", "admin", "svc.yaml", "--url", "x", "-v"]));
        assert_eq!(files, strings(&["svc.yaml"]));
        assert_eq!(opts, strings(&["-u", "admin", "--url", "x", "-v"]));
    }

    #[test]
    fn test_split_flag_without_value() {
        let (files, opts) = split_args(&strings(&["-l", "svc.yaml"]));
        assert_eq!(files, strings(&["svc.yaml"]));
        assert_eq!(opts, strings(&["-l"]));
    }
}
