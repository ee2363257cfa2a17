//! End-to-end resolution behavior over real fixture trees.

use relpack::resolve::{DependencyResolver, Origin, PathResolver, ResolveError};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Descriptor with a code reference and a resource glob: resolving the
/// descriptor alone pulls in the code file, the resource files, and the
/// resource reference.
#[test]
fn service_descriptor_scenario() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "svc.yaml",
        "code: svc.py\nresource:\n  - \"static/*.html\"\n",
    );
    write_file(dir.path(), "svc.py", "print('service')\n");
    write_file(dir.path(), "static/a.html", "<html></html>\n");

    let resolver = DependencyResolver::new(dir.path());
    let resolution = resolver.resolve(&[PathBuf::from("svc.yaml")]).unwrap();

    // svc.yaml is not a .qsd.yaml service descriptor, so the resource
    // fields are not consulted; the code reference still resolves
    assert!(resolution.contains(Path::new("svc.yaml")));
    assert!(resolution.contains(Path::new("svc.py")));

    // the service-suffixed variant also contributes the resource files
    write_file(
        dir.path(),
        "svc.qsd.yaml",
        "code: svc.py\nresource:\n  - \"static/*.html\"\n",
    );
    let resolution = resolver.resolve(&[PathBuf::from("svc.qsd.yaml")]).unwrap();
    assert_eq!(
        resolution.paths(),
        vec![
            PathBuf::from("svc.qsd.yaml"),
            PathBuf::from("svc.py"),
            PathBuf::from("static/a.html"),
        ]
    );
    assert_eq!(resolution.files[2].origin, Origin::DerivedResource);
    assert_eq!(resolution.resources.len(), 1);
}

/// The resolved set is always a superset of the explicit input set, with
/// explicit files first in argument order.
#[test]
fn resolution_is_superset_in_argument_order() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "one.qjob.yaml", "code: one.py\n");
    write_file(dir.path(), "one.py", "1\n");
    write_file(dir.path(), "two.qwf", "workflow\n");
    write_file(dir.path(), "three.qconst", "const\n");

    let seed = vec![
        PathBuf::from("one.qjob.yaml"),
        PathBuf::from("two.qwf"),
        PathBuf::from("three.qconst"),
    ];
    let resolver = DependencyResolver::new(dir.path());
    let resolution = resolver.resolve(&seed).unwrap();
    let paths = resolution.paths();

    for s in &seed {
        assert!(paths.contains(s), "missing explicit file {}", s.display());
    }
    // relative order of the explicit files is preserved
    let positions: Vec<usize> = seed
        .iter()
        .map(|s| paths.iter().position(|p| p == s).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    // derived code sits next to its descriptor
    assert_eq!(paths[1], PathBuf::from("one.py"));
    assert_eq!(resolution.files[1].origin, Origin::DerivedCode);
}

/// A glob matching nothing fails before any side effect: the release
/// directory is never created.
#[test]
fn glob_mismatch_fails_before_side_effects() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("src");
    fs::create_dir_all(&source).unwrap();
    let release_dir = dir.path().join("releases");

    let resolver = PathResolver::new(&source);
    let err = resolver
        .resolve(&["services/*.qsd".to_string()])
        .unwrap_err();
    assert!(matches!(err, ResolveError::GlobMismatch(_)));
    assert!(!release_dir.exists());
}

/// Wildcard-expanded roots resolve through descriptors just like literal
/// ones.
#[test]
fn glob_roots_feed_the_closure() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "jobs/a.qjob.yaml", "code: a.py\n");
    write_file(dir.path(), "jobs/a.py", "a\n");
    write_file(dir.path(), "jobs/b.qjob.yaml", "code: b.py\n");
    write_file(dir.path(), "jobs/b.py", "b\n");

    let paths = PathResolver::new(dir.path())
        .resolve(&["jobs/*.qjob.yaml".to_string()])
        .unwrap();
    let resolution = DependencyResolver::new(dir.path()).resolve(&paths).unwrap();

    assert_eq!(
        resolution.paths(),
        vec![
            PathBuf::from("jobs/a.qjob.yaml"),
            PathBuf::from("jobs/a.py"),
            PathBuf::from("jobs/b.qjob.yaml"),
            PathBuf::from("jobs/b.py"),
        ]
    );
}
