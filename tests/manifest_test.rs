//! Manifest construction driven by a real resolution run.

use relpack::manifest::{Directive, ManifestBuilder};
use relpack::resolve::DependencyResolver;
use relpack::util;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Load directives keep the discovery order of the root list; each root's
/// derived code follows it directly; SQL directives come after every load.
#[test]
fn test_directive_order_follows_discovery() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.qjob.yaml", "code: a.py\n");
    write_file(dir.path(), "a.py", "a\n");
    write_file(dir.path(), "b.qwf", "b\n");
    write_file(dir.path(), "c.qsd.yaml", "code: c.py\n");
    write_file(dir.path(), "c.py", "c\n");

    let resolution = DependencyResolver::new(dir.path())
        .resolve(&[
            PathBuf::from("a.qjob.yaml"),
            PathBuf::from("b.qwf"),
            PathBuf::from("c.qsd.yaml"),
        ])
        .unwrap();

    let root_dir = PathBuf::from(".");
    let load_list: Vec<String> = resolution.paths().iter().map(|p| util::slash_path(p)).collect();
    let manifest = ManifestBuilder::new(&root_dir, dir.path()).build(
        &load_list,
        &resolution.paths(),
        &["schema.sql".to_string()],
    );

    assert_eq!(
        manifest.directives,
        vec![
            Directive::Load("a.qjob.yaml".into()),
            Directive::Load("a.py".into()),
            Directive::Load("b.qwf".into()),
            Directive::Load("c.qsd.yaml".into()),
            Directive::Load("c.py".into()),
            Directive::ExecSql("schema.sql".into()),
        ]
    );
}

/// The written manifest is operator-read/write, group/other-read.
#[cfg(unix)]
#[test]
fn test_written_manifest_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let root_dir = PathBuf::from(".");
    let manifest =
        ManifestBuilder::new(&root_dir, dir.path()).build(&["a.qwf".to_string()], &[], &[]);
    let path = dir.path().join("out.qrf");
    manifest.write(&path).unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}
