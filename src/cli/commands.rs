//! clap argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Release packaging and remote deployment tool
#[derive(Parser, Debug)]
#[command(
    name = "relpack",
    about = "Release packaging and remote deployment for component-based application servers",
    version,
    author,
    long_about = "relpack discovers every file an artifact implicitly depends on (descriptor \
                  code references, service resources, legacy markers, pre-built manifests) and \
                  materializes the result either as a relocatable release archive with a load \
                  manifest, or as uploads to a running server followed by a remote command."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Output more information")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Package a user release archive with its load manifest",
        long_about = "Resolves the dependency closure of the given files and packages it as \
                      <release-dir>/<label>/ with a .tar.gz archive, install.sh, and a .qrf \
                      load manifest.\n\n\
                      Examples:\n  \
                      relpack release -U . mylabel 'services/*.qsd'\n  \
                      relpack release -U . -P user -m mylabel modules/mylib.qm services/*.qsd.yaml"
    )]
    Release(ReleaseArgs),

    #[command(
        about = "Run a command on a remote server",
        long_about = "Dispatches one operator command over the server's persistent command \
                      channel and streams its output. For 'oload', the named files and their \
                      dependency closure are uploaded first.\n\n\
                      Examples:\n  \
                      relpack remote example.netrc ostatus -S\n  \
                      relpack remote example.netrc oload qorus-user-blocks-1.0.tar.bz2"
    )]
    Remote(RemoteArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ReleaseArgs {
    #[arg(value_name = "LABEL", help = "Release label (prefixed with qorus-user- if needed)")]
    pub label: String,

    #[arg(
        value_name = "FILE",
        required = true,
        help = "Root files, directories, or glob patterns, relative to the source directory"
    )]
    pub files: Vec<String>,

    #[arg(
        short = 'U',
        long = "user-src",
        value_name = "DIR",
        help = "Root source directory release components are given relative to"
    )]
    pub source_dir: Option<PathBuf>,

    #[arg(
        short = 'p',
        long,
        value_name = "DIR",
        conflicts_with = "add_prefix",
        help = "User prefix directory for relative paths in the target filesystem (makes a flat release in this dir)"
    )]
    pub prefix: Option<String>,

    #[arg(
        short = 'P',
        long,
        value_name = "DIR",
        help = "Prepend a prefix dir for relative paths in the target filesystem"
    )]
    pub add_prefix: Option<String>,

    #[arg(
        short = 'm',
        long = "fix-module-paths",
        help = "Install module files in user/modules"
    )]
    pub fix_module_paths: bool,

    #[arg(short = 'r', long, value_name = "DIR", help = "Set release directory")]
    pub release_dir: Option<PathBuf>,

    #[arg(
        short = 's',
        long = "user-sql",
        value_name = "FILE",
        help = "Add an SQL file to execute in the user schema (repeatable)"
    )]
    pub user_sql: Vec<String>,

    #[arg(
        short = 'R',
        long = "show-release-dir",
        help = "Show the release directory and exit"
    )]
    pub show_release_dir: bool,

    #[arg(short = 'c', long, help = "Make a compressed tar file of the release")]
    pub compress: bool,

    #[arg(
        short = 'f',
        long,
        help = "Include a command to refresh objects after loading"
    )]
    pub refresh: bool,

    #[arg(
        short = 'C',
        long = "refresh-compat",
        help = "Include the old command to refresh objects after loading"
    )]
    pub refresh_compat: bool,

    #[arg(
        short = 'F',
        long = "full-release",
        help = "Verify release completeness, only with -i"
    )]
    pub full: bool,

    #[arg(short = 'i', long, help = "Exec install.sh after packaging")]
    pub install: bool,

    #[arg(long, help = "Do not delete the temporary packaging directory")]
    pub keep: bool,

    #[arg(
        short = 'a',
        long = "python-module-dir",
        value_name = "DIR",
        help = "Package the given directory as a Python module dir"
    )]
    pub python_module_dir: Option<PathBuf>,

    #[arg(
        short = 'b',
        long = "python-module-dest",
        value_name = "DIR",
        help = "Store files packaged with -a in the given directory under the installation root"
    )]
    pub python_module_dest: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RemoteArgs {
    #[arg(value_name = "NETRC-FILE", help = "Connection configuration file")]
    pub netrc: PathBuf,

    #[arg(value_name = "COMMAND", help = "Remote command to execute")]
    pub command: String,

    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Arguments passed to the remote command"
    )]
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_args_parse() {
        let args = CliArgs::parse_from([
            "relpack", "release", "-U", ".", "-P", "user", "-m", "v1.0", "services/http.qsd.yaml",
        ]);
        match args.command {
            Commands::Release(release) => {
                assert_eq!(release.label, "v1.0");
                assert_eq!(release.files, vec!["services/http.qsd.yaml"]);
                assert_eq!(release.add_prefix.as_deref(), Some("user"));
                assert!(release.fix_module_paths);
            }
            _ => panic!("expected release subcommand"),
        }
    }

    #[test]
    fn test_remote_args_keep_hyphen_values() {
        let args = CliArgs::parse_from(["relpack", "remote", "x.netrc", "ostatus", "-S"]);
        match args.command {
            Commands::Remote(remote) => {
                assert_eq!(remote.command, "ostatus");
                assert_eq!(remote.args, vec!["-S"]);
            }
            _ => panic!("expected remote subcommand"),
        }
    }
}
