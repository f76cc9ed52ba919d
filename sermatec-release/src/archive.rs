//! Deterministic zip archives of a directory tree

use crate::error::{ReleaseError, Result};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Component, Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// What went into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Entry names in archive order; directories end with `/`.
    pub entries: Vec<String>,
    pub files: usize,
    pub size: u64,
    pub sha256: String,
}

/// Zips `source` recursively into `output`.
///
/// `source` is relative to `root` and entry names keep that relative path,
/// as `zip -r output source` run inside `root` would. Entries are sorted and
/// carry a fixed timestamp so the same tree always yields the same bytes.
/// An existing `output` is replaced.
pub fn create_archive(root: &Path, source: &Path, output: &Path) -> Result<ArchiveSummary> {
    let source_dir = root.join(source);
    if !source_dir.exists() {
        return Err(ReleaseError::MissingSource(source_dir));
    }
    if !source_dir.is_dir() {
        return Err(ReleaseError::NotADirectory(source_dir));
    }

    let prefix = entry_name(source)?;
    let mut entries = Vec::new();
    collect_entries(&source_dir, &prefix, output, &mut entries)?;

    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);
    let mut files = 0;
    for (name, path) in &entries {
        match path {
            None => zip.add_directory(name.as_str(), options(0o755))?,
            Some(path) => {
                debug!("adding {name}");
                zip.start_file(name.as_str(), options(0o644))?;
                let mut reader = BufReader::new(File::open(path)?);
                io::copy(&mut reader, &mut zip)?;
                files += 1;
            }
        }
    }
    let mut file = zip.finish()?;
    file.flush()?;

    let bytes = fs::read(output)?;
    let summary = ArchiveSummary {
        path: output.to_path_buf(),
        entries: entries.into_iter().map(|(name, _)| name).collect(),
        files,
        size: bytes.len() as u64,
        sha256: format!("{:x}", Sha256::digest(&bytes)),
    };
    info!(
        "archived {} files of {} into {} ({} bytes)",
        summary.files,
        source.display(),
        output.display(),
        summary.size
    );
    Ok(summary)
}

fn options(permissions: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(permissions)
}

/// Turns a relative path into a zip entry name with `/` separators.
fn entry_name(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| ReleaseError::NonUtf8Name(path.to_path_buf()))?
                    .to_string(),
            ),
            Component::CurDir => {}
            _ => {
                return Err(ReleaseError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} must be relative to the workspace", path.display()),
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

// Walks `dir` depth-first in name order. Directories are recorded without a
// path, files with the path to read them from.
fn collect_entries(
    dir: &Path,
    name: &str,
    output: &Path,
    entries: &mut Vec<(String, Option<PathBuf>)>,
) -> Result<()> {
    if !name.is_empty() {
        entries.push((format!("{name}/"), None));
    }

    let mut children = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<Vec<_>>>()?;
    children.sort();

    for path in children {
        // the archive may be written into the tree it is built from
        if path == output {
            continue;
        }
        // entry names are stored verbatim, never rewritten
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ReleaseError::NonUtf8Name(path.clone()))?
            .to_string();
        let child_name = if name.is_empty() {
            file_name
        } else {
            format!("{name}/{file_name}")
        };

        if fs::metadata(&path)?.is_dir() {
            collect_entries(&path, &child_name, output, entries)?;
        } else {
            entries.push((child_name, Some(path)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn component_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let component = dir.path().join("custom_components/sermatec_inverter");
        fs::create_dir_all(component.join("translations")).unwrap();
        fs::write(component.join("__init__.py"), "DOMAIN = 'sermatec_inverter'\n").unwrap();
        fs::write(component.join("manifest.json"), "{\"domain\": \"sermatec_inverter\"}").unwrap();
        fs::write(component.join("translations/en.json"), "{}").unwrap();
        fs::write(dir.path().join("README.md"), "not archived").unwrap();
        dir
    }

    #[test]
    fn archives_the_component_tree() {
        let workspace = component_tree();
        let output = workspace.path().join("sermatec_inverter.zip");

        let summary = create_archive(
            workspace.path(),
            Path::new("custom_components/sermatec_inverter"),
            &output,
        )
        .unwrap();

        assert_eq!(
            summary.entries,
            vec![
                "custom_components/sermatec_inverter/",
                "custom_components/sermatec_inverter/__init__.py",
                "custom_components/sermatec_inverter/manifest.json",
                "custom_components/sermatec_inverter/translations/",
                "custom_components/sermatec_inverter/translations/en.json",
            ]
        );
        assert_eq!(summary.files, 3);
        assert_eq!(summary.sha256.len(), 64);

        let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(archive.len(), 5);
        let mut content = String::new();
        archive
            .by_name("custom_components/sermatec_inverter/__init__.py")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "DOMAIN = 'sermatec_inverter'\n");
    }

    #[test]
    fn same_tree_same_bytes() {
        let workspace = component_tree();
        let source = Path::new("custom_components/sermatec_inverter");
        let first = create_archive(workspace.path(), source, &workspace.path().join("a.zip")).unwrap();
        let second =
            create_archive(workspace.path(), source, &workspace.path().join("b.zip")).unwrap();
        assert_eq!(first.sha256, second.sha256);
    }

    #[test]
    fn missing_source_fails() {
        let workspace = TempDir::new().unwrap();
        let result = create_archive(
            workspace.path(),
            Path::new("custom_components/sermatec"),
            &workspace.path().join("out.zip"),
        );
        assert!(matches!(result, Err(ReleaseError::MissingSource(_))));
        assert!(!workspace.path().join("out.zip").exists());
    }

    #[test]
    fn file_as_source_fails() {
        let workspace = component_tree();
        let result = create_archive(
            workspace.path(),
            Path::new("README.md"),
            &workspace.path().join("out.zip"),
        );
        assert!(matches!(result, Err(ReleaseError::NotADirectory(_))));
    }

    #[test]
    fn output_inside_the_source_is_skipped() {
        let workspace = component_tree();
        let source = Path::new("custom_components/sermatec_inverter");
        let output = workspace.path().join(source).join("self.zip");
        fs::write(&output, "stale").unwrap();

        let summary = create_archive(workspace.path(), source, &output).unwrap();
        assert!(!summary.entries.iter().any(|entry| entry.ends_with("self.zip")));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let workspace = component_tree();
        let source = Path::new("custom_components/sermatec_inverter");
        let bad = workspace
            .path()
            .join(source)
            .join(OsStr::from_bytes(b"sensor\xff.py"));
        fs::write(&bad, "").unwrap();
        let output = workspace.path().join("out.zip");

        let result = create_archive(workspace.path(), source, &output);
        assert!(matches!(result, Err(ReleaseError::NonUtf8Name(path)) if path == bad));
        assert!(!output.exists());
    }

    #[test]
    fn absolute_source_is_rejected() {
        assert!(entry_name(Path::new("/etc")).is_err());
        assert!(entry_name(Path::new("../outside")).is_err());
        assert_eq!(entry_name(Path::new("./a/b")).unwrap(), "a/b");
    }
}
