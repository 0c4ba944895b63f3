//! Zip reading and deterministic zip writing.
//!
//! Jars, AARs, APKLIBs and APKs are all zip files. Reading guards against
//! entries escaping the destination; writing pins every timestamp so the same
//! inputs always produce byte-identical archives.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{IoResultExt, PipelineError, Result};

/// Prefix of archive metadata that is never unpacked or conflict-checked.
pub const META_INF: &str = "META-INF/";

/// Extract every file entry of `archive_path` into `dest_dir`.
///
/// Entries for which `skip` returns true are ignored. Entries whose names
/// would escape `dest_dir` are ignored. Returns the relative paths written.
///
/// # Errors
///
/// Returns [`PipelineError::Archive`] for unreadable archives and
/// [`PipelineError::Io`] when the destination cannot be written.
pub fn extract_zip<F>(archive_path: &Path, dest_dir: &Path, skip: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let file = File::open(archive_path)
        .io_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| PipelineError::archive(archive_path, e))?;

    fs::create_dir_all(dest_dir)
        .io_context(|| format!("Failed to create {}", dest_dir.display()))?;
    let mut written = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| PipelineError::archive(archive_path, e))?;
        if entry.is_dir() || skip(entry.name()) {
            continue;
        }
        let Some(relative_path) = entry.enclosed_name() else {
            tracing::warn!(
                "Skipping entry '{}' in {}: path escapes destination",
                entry.name(),
                archive_path.display()
            );
            continue;
        };

        let absolute_path = dest_dir.join(&relative_path);
        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut out = File::create(&absolute_path)
            .io_context(|| format!("Failed to create {}", absolute_path.display()))?;
        io::copy(&mut entry, &mut out)
            .io_context(|| format!("Failed to write {}", absolute_path.display()))?;
        written.push(relative_path);
    }

    Ok(written)
}

/// Names of every file entry (directories excluded), in archive order.
///
/// # Errors
///
/// Returns [`PipelineError::Archive`] if the archive cannot be read.
pub fn entry_names(archive_path: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path)
        .io_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| PipelineError::archive(archive_path, e))?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| PipelineError::archive(archive_path, e))?;
        if !entry.is_dir() {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

/// Read one entry's bytes.
///
/// # Errors
///
/// Returns [`PipelineError::Archive`] if the archive or entry cannot be read.
pub fn read_entry(archive_path: &Path, name: &str) -> Result<Vec<u8>> {
    let file = File::open(archive_path)
        .io_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| PipelineError::archive(archive_path, e))?;
    let mut entry = archive
        .by_name(name)
        .map_err(|e| PipelineError::archive(archive_path, format!("{name}: {e}")))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|e| PipelineError::archive(archive_path, format!("{name}: {e}")))?;
    Ok(buf)
}

/// Whether an entry must be stored uncompressed so the platform can map it
/// directly from the package.
pub fn is_stored_entry(name: &str) -> bool {
    name.ends_with(".arsc") || name.ends_with(".so")
}

/// Writes zip archives with fixed timestamps.
pub struct DeterministicZip {
    writer: ZipWriter<File>,
    path: PathBuf,
}

impl std::fmt::Debug for DeterministicZip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeterministicZip")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DeterministicZip {
    /// Create (or truncate) an archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file =
            File::create(path).io_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self {
            writer: ZipWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Append one entry.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Archive`] if the entry cannot be written.
    pub fn add(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let method = if is_stored_entry(name) {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .last_modified_time(zip::DateTime::default());
        self.writer
            .start_file(name, options)
            .map_err(|e| PipelineError::archive(&self.path, e))?;
        self.writer
            .write_all(bytes)
            .io_context(|| format!("Failed to write {name} to {}", self.path.display()))
    }

    /// Finish the central directory and close the file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Archive`] if finalization fails.
    pub fn finish(self) -> Result<PathBuf> {
        self.writer
            .finish()
            .map_err(|e| PipelineError::archive(&self.path, e))?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_zip;
    use tempfile::tempdir;

    #[test]
    fn test_extract_skips_meta_inf() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("lib.jar");
        write_zip(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0".as_slice()),
                ("com/example/A.class", b"cafebabe".as_slice()),
            ],
        );

        let dest = dir.path().join("out");
        let written = extract_zip(&jar, &dest, |name| name.starts_with(META_INF)).unwrap();
        assert_eq!(written, vec![PathBuf::from("com/example/A.class")]);
        assert!(!dest.join("META-INF").exists());
    }

    #[test]
    fn test_extract_rejects_escaping_entries() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("evil.zip");
        write_zip(
            &jar,
            &[("../escape.txt", b"x".as_slice()), ("ok.txt", b"y".as_slice())],
        );

        let dest = dir.path().join("out");
        let written = extract_zip(&jar, &dest, |_| false).unwrap();
        assert_eq!(written, vec![PathBuf::from("ok.txt")]);
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad.aar");
        fs::write(&bad, b"not a zip").unwrap();
        assert!(matches!(
            extract_zip(&bad, &dir.path().join("out"), |_| false),
            Err(PipelineError::Archive { .. })
        ));
    }

    #[test]
    fn test_deterministic_output() {
        let dir = tempdir().unwrap();
        let write = |name: &str| {
            let mut zip = DeterministicZip::create(&dir.path().join(name)).unwrap();
            zip.add("resources.arsc", b"table").unwrap();
            zip.add("classes.dex", b"dex").unwrap();
            zip.finish().unwrap()
        };
        let a = fs::read(write("a.zip")).unwrap();
        let b = fs::read(write("b.zip")).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            entry_names(&dir.path().join("a.zip")).unwrap(),
            vec!["resources.arsc", "classes.dex"]
        );
        assert_eq!(
            read_entry(&dir.path().join("a.zip"), "classes.dex").unwrap(),
            b"dex"
        );
    }
}
