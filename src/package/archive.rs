//! Tar archive primitives: gzip for release artifacts, bzip2 for the
//! distribution archive.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Create a gzip-compressed tar at `archive`. `members` are paths relative
/// to `base`; directories are added recursively. Entry names in the archive
/// are the relative member paths, which keeps the artifact relocatable.
pub fn create_tar_gz(archive: &Path, base: &Path, members: &[PathBuf]) -> Result<()> {
    let file = File::create(archive)
        .with_context(|| format!("failed to create archive {}", archive.display()))?;
    let encoder = GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for member in members {
        let full = base.join(member);
        if full.is_dir() {
            builder
                .append_dir_all(member, &full)
                .with_context(|| format!("failed to add directory {}", member.display()))?;
        } else {
            builder
                .append_path_with_name(&full, member)
                .with_context(|| format!("failed to add file {}", member.display()))?;
        }
    }

    builder
        .into_inner()
        .context("failed to finish tar stream")?
        .finish()
        .context("failed to finish gzip stream")?;
    Ok(())
}

/// Create a bzip2-compressed tar, excluding editor backup entries
/// (`name~`) at every level. Used for the optional distribution archive.
pub fn create_tar_bz2_excluding_backups(
    archive: &Path,
    base: &Path,
    members: &[PathBuf],
) -> Result<()> {
    let file = File::create(archive)
        .with_context(|| format!("failed to create archive {}", archive.display()))?;
    let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::best());
    let mut builder = tar::Builder::new(encoder);

    for member in members {
        append_filtered(&mut builder, base, member)?;
    }

    builder
        .into_inner()
        .context("failed to finish tar stream")?
        .finish()
        .context("failed to finish bzip2 stream")?;
    Ok(())
}

fn append_filtered<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    base: &Path,
    rel: &Path,
) -> Result<()> {
    let name = rel
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.ends_with('~') {
        return Ok(());
    }

    let full = base.join(rel);
    if full.is_dir() {
        builder
            .append_dir(rel, &full)
            .with_context(|| format!("failed to add directory {}", rel.display()))?;
        let mut children: Vec<PathBuf> = fs::read_dir(&full)
            .with_context(|| format!("failed to list {}", full.display()))?
            .filter_map(|e| e.ok())
            .map(|e| rel.join(e.file_name()))
            .collect();
        children.sort();
        for child in children {
            append_filtered(builder, base, &child)?;
        }
    } else {
        builder
            .append_path_with_name(&full, rel)
            .with_context(|| format!("failed to add file {}", rel.display()))?;
    }
    Ok(())
}

/// Unpack a gzip-compressed tar into `dest`.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("failed to open archive {}", archive.display()))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(dest)
        .with_context(|| format!("failed to extract into {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = File::create(path).unwrap();
        f.write_all(content).unwrap();
    }

    #[test]
    fn test_tar_gz_round_trip_preserves_paths_and_bytes() {
        let src = TempDir::new().unwrap();
        write_file(src.path(), "svc/a.qsd.yaml", b"code: a.py\n");
        write_file(src.path(), "svc/a.py", b"print(1)\n");

        let out = TempDir::new().unwrap();
        let archive = out.path().join("rel.tar.gz");
        create_tar_gz(
            &archive,
            src.path(),
            &[PathBuf::from("svc/a.qsd.yaml"), PathBuf::from("svc/a.py")],
        )
        .unwrap();

        let dest = TempDir::new().unwrap();
        extract_tar_gz(&archive, dest.path()).unwrap();

        assert_eq!(
            fs::read(dest.path().join("svc/a.qsd.yaml")).unwrap(),
            b"code: a.py\n"
        );
        assert_eq!(fs::read(dest.path().join("svc/a.py")).unwrap(), b"print(1)\n");
    }

    #[test]
    fn test_bz2_archive_skips_backup_entries() {
        let src = TempDir::new().unwrap();
        write_file(src.path(), "rel/a.qwf", b"x");
        write_file(src.path(), "rel/a.qwf~", b"old");

        let out = TempDir::new().unwrap();
        let archive = out.path().join("rel.tar.bz2");
        create_tar_bz2_excluding_backups(&archive, src.path(), &[PathBuf::from("rel")]).unwrap();

        let file = File::open(&archive).unwrap();
        let decoder = bzip2::read::BzDecoder::new(file);
        let mut tar = tar::Archive::new(decoder);
        let names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(names.contains(&"rel/a.qwf".to_string()));
        assert!(!names.iter().any(|n| n.ends_with('~')));
    }
}
