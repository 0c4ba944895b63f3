//! Overlapping-path detection across staging areas and jars.
//!
//! Sources are scanned in precedence order (project output first, then
//! dependencies in resolution order). Every relative path is indexed to the
//! ordered list of sources contributing it; a path with more than one
//! contributor is a conflict. Resolution keeps the first contributor and
//! hands the rest back as displaced contributions.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::archive::{self, DeterministicZip, META_INF};
use crate::error::{IoResultExt, PipelineError, Result};

/// Where a source's content lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// A directory tree; paths are relative to the root.
    Directory(PathBuf),
    /// A zip/jar; paths are entry names.
    Archive(PathBuf),
}

/// A named content source taking part in a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSource {
    /// Identity reported in conflicts (`project` or a coordinate).
    pub identity: String,
    /// Location of the content.
    pub kind: SourceKind,
}

impl MergeSource {
    /// A directory source.
    pub fn directory(identity: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            identity: identity.into(),
            kind: SourceKind::Directory(root.into()),
        }
    }

    /// An archive source.
    pub fn archive(identity: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identity: identity.into(),
            kind: SourceKind::Archive(path.into()),
        }
    }
}

/// Physical location of one contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A file on disk.
    File(PathBuf),
    /// An entry inside an archive.
    Entry {
        /// Archive path.
        archive: PathBuf,
        /// Entry name.
        name: String,
    },
}

impl Location {
    /// Read the contribution's bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O or archive error if the content cannot be read.
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            Self::File(path) => {
                fs::read(path).io_context(|| format!("Failed to read {}", path.display()))
            }
            Self::Entry { archive, name } => archive::read_entry(archive, name),
        }
    }

    /// Hex SHA-256 of the contribution.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub fn digest(&self) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.read()?)))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Entry { archive, name } => write!(f, "{}!/{name}", archive.display()),
        }
    }
}

/// One source's contribution to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contributor {
    /// Identity of the contributing source.
    pub identity: String,
    /// Where the bytes are.
    pub location: Location,
}

/// A relative path and everything contributing it, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Merge key.
    pub path: String,
    /// Contributors, first one wins.
    pub contributors: Vec<Contributor>,
}

impl ResourceEntry {
    /// More than one source contributes this path.
    pub fn is_conflict(&self) -> bool {
        self.contributors.len() > 1
    }
}

/// Index of every path across a set of sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    entries: BTreeMap<String, ResourceEntry>,
}

/// Outcome of first-writer-wins resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The winning contribution of every path.
    pub winners: BTreeMap<String, Contributor>,
    /// Losing contributions, keyed by path, in precedence order.
    pub displaced: Vec<(String, Contributor)>,
}

/// Index all sources, skipping directories and `META-INF/`.
///
/// # Errors
///
/// Returns an error if a directory cannot be walked or an archive read.
pub fn find_conflicts(sources: &[MergeSource]) -> Result<ConflictReport> {
    find_conflicts_with(sources, |path| path.starts_with(META_INF))
}

/// Index all sources, skipping directories and any path `skip` accepts.
///
/// # Errors
///
/// Returns an error if a directory cannot be walked or an archive read.
pub fn find_conflicts_with<F>(sources: &[MergeSource], skip: F) -> Result<ConflictReport>
where
    F: Fn(&str) -> bool,
{
    let mut report = ConflictReport::default();
    for source in sources {
        for (path, location) in enumerate(source)? {
            if skip(&path) {
                continue;
            }
            report
                .entries
                .entry(path.clone())
                .or_insert_with(|| ResourceEntry {
                    path,
                    contributors: Vec::new(),
                })
                .contributors
                .push(Contributor {
                    identity: source.identity.clone(),
                    location,
                });
        }
    }
    debug!(
        "Indexed {} paths across {} sources, {} conflicting",
        report.entries.len(),
        sources.len(),
        report.conflicts().count()
    );
    Ok(report)
}

fn enumerate(source: &MergeSource) -> Result<Vec<(String, Location)>> {
    match &source.kind {
        SourceKind::Directory(root) => {
            if !root.is_dir() {
                return Ok(Vec::new());
            }
            let mut out = Vec::new();
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    PipelineError::io(
                        format!("Failed to walk {}", root.display()),
                        std::io::Error::other(e.to_string()),
                    )
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(root) else {
                    continue;
                };
                out.push((
                    relative_key(relative),
                    Location::File(entry.path().to_path_buf()),
                ));
            }
            Ok(out)
        }
        SourceKind::Archive(path) => Ok(archive::entry_names(path)?
            .into_iter()
            .map(|name| {
                (
                    name.clone(),
                    Location::Entry {
                        archive: path.clone(),
                        name,
                    },
                )
            })
            .collect()),
    }
}

/// Relative path with `/` separators, as used inside archives.
pub fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl ConflictReport {
    /// Every indexed path.
    pub fn entries(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.values()
    }

    /// Look up one path.
    pub fn get(&self, path: &str) -> Option<&ResourceEntry> {
        self.entries.get(path)
    }

    /// Paths with more than one contributor.
    pub fn conflicts(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.values().filter(|e| e.is_conflict())
    }

    /// The set of conflicting paths.
    pub fn conflicting_paths(&self) -> BTreeSet<String> {
        self.conflicts().map(|e| e.path.clone()).collect()
    }

    /// Whether nothing overlaps.
    pub fn is_clean(&self) -> bool {
        self.conflicts().next().is_none()
    }

    /// First writer wins.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnresolvedConflicts`] when `strict` is set and
    /// any path has more than one contributor.
    pub fn resolve(&self, strict: bool) -> Result<Resolution> {
        if strict && !self.is_clean() {
            return Err(PipelineError::UnresolvedConflicts {
                paths: self.conflicting_paths().into_iter().collect(),
            });
        }

        let mut resolution = Resolution::default();
        for entry in self.entries.values() {
            let mut contributors = entry.contributors.iter();
            let Some(winner) = contributors.next() else {
                continue;
            };
            resolution
                .winners
                .insert(entry.path.clone(), winner.clone());
            for loser in contributors {
                debug!(
                    "{} from {} shadowed by {}",
                    entry.path, loser.identity, winner.identity
                );
                resolution.displaced.push((entry.path.clone(), loser.clone()));
            }
        }
        Ok(resolution)
    }
}

impl Resolution {
    /// Copy every winning contribution into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if a contribution cannot be read or written.
    pub fn materialize(&self, dest: &Path) -> Result<usize> {
        for (path, winner) in &self.winners {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .io_context(|| format!("Failed to create {}", parent.display()))?;
            }
            match &winner.location {
                Location::File(src) => {
                    fs::copy(src, &target)
                        .io_context(|| format!("Failed to copy {}", src.display()))?;
                }
                location @ Location::Entry { .. } => {
                    fs::write(&target, location.read()?)
                        .io_context(|| format!("Failed to write {}", target.display()))?;
                }
            }
        }
        Ok(self.winners.len())
    }
}

/// Make an identity usable as a single path segment.
pub fn sanitize_identity(identity: &str) -> String {
    identity
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Write displaced contributions to the `duplicate-resources` side artifact.
///
/// Each contribution is stored as `<identity>/<path>` so that three or more
/// contributors of the same path are all preserved. Returns `None` when there
/// is nothing to write.
///
/// # Errors
///
/// Returns an error if a contribution cannot be read or the archive written.
pub fn write_duplicates(
    displaced: &[(String, Contributor)],
    out: &Path,
) -> Result<Option<PathBuf>> {
    if displaced.is_empty() {
        return Ok(None);
    }
    let mut sorted: Vec<&(String, Contributor)> = displaced.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.1.identity, &a.0).cmp(&(&b.1.identity, &b.0))
    });

    let mut zip = DeterministicZip::create(out)?;
    for (path, contributor) in sorted {
        let name = format!("{}/{path}", sanitize_identity(&contributor.identity));
        zip.add(&name, &contributor.location.read()?)?;
    }
    zip.finish().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{write_file, write_zip};
    use tempfile::tempdir;

    fn setup(dir: &Path) -> Vec<MergeSource> {
        let project = dir.join("project");
        write_file(&project.join("res/values/strings.xml"), b"project");
        write_file(&project.join("res/layout/main.xml"), b"layout");

        let lib_a = dir.join("lib_a");
        write_file(&lib_a.join("res/values/strings.xml"), b"lib_a");
        write_file(&lib_a.join("res/values/colors.xml"), b"colors");

        let lib_b = dir.join("lib_b.jar");
        write_zip(
            &lib_b,
            &[
                ("res/values/strings.xml", b"lib_b".as_slice()),
                ("META-INF/LICENSE", b"mit".as_slice()),
            ],
        );

        vec![
            MergeSource::directory("project", project),
            MergeSource::directory("com.example:lib-a:1.0", lib_a),
            MergeSource::archive("com.example:lib-b:1.0", lib_b),
        ]
    }

    #[test]
    fn test_find_conflicts() {
        let dir = tempdir().unwrap();
        let report = find_conflicts(&setup(dir.path())).unwrap();

        assert_eq!(
            report.conflicting_paths(),
            BTreeSet::from(["res/values/strings.xml".to_string()])
        );
        let entry = report.get("res/values/strings.xml").unwrap();
        let ids: Vec<&str> = entry.contributors.iter().map(|c| c.identity.as_str()).collect();
        assert_eq!(
            ids,
            vec!["project", "com.example:lib-a:1.0", "com.example:lib-b:1.0"]
        );
        assert!(report.get("META-INF/LICENSE").is_none());
    }

    #[test]
    fn test_conflict_set_independent_of_order() {
        let dir = tempdir().unwrap();
        let sources = setup(dir.path());
        let mut reversed = sources.clone();
        reversed.reverse();

        assert_eq!(
            find_conflicts(&sources).unwrap().conflicting_paths(),
            find_conflicts(&reversed).unwrap().conflicting_paths()
        );
    }

    #[test]
    fn test_project_wins_and_others_displaced() {
        let dir = tempdir().unwrap();
        let resolution = find_conflicts(&setup(dir.path()))
            .unwrap()
            .resolve(false)
            .unwrap();

        let winner = &resolution.winners["res/values/strings.xml"];
        assert_eq!(winner.identity, "project");
        assert_eq!(winner.location.read().unwrap(), b"project");
        assert_eq!(resolution.displaced.len(), 2);
    }

    #[test]
    fn test_union_covers_every_path() {
        let dir = tempdir().unwrap();
        let resolution = find_conflicts(&setup(dir.path()))
            .unwrap()
            .resolve(false)
            .unwrap();

        let dest = dir.path().join("merged");
        assert_eq!(resolution.materialize(&dest).unwrap(), 3);
        assert_eq!(
            fs::read(dest.join("res/values/strings.xml")).unwrap(),
            b"project"
        );
        assert!(dest.join("res/values/colors.xml").is_file());
        assert!(dest.join("res/layout/main.xml").is_file());
    }

    #[test]
    fn test_strict_mode_fails() {
        let dir = tempdir().unwrap();
        let err = find_conflicts(&setup(dir.path()))
            .unwrap()
            .resolve(true)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnresolvedConflicts { ref paths } if paths == &vec!["res/values/strings.xml".to_string()]
        ));
    }

    #[test]
    fn test_duplicates_side_artifact_keeps_every_contributor() {
        let dir = tempdir().unwrap();
        let resolution = find_conflicts(&setup(dir.path()))
            .unwrap()
            .resolve(false)
            .unwrap();

        let out = dir.path().join("duplicate-resources.jar");
        write_duplicates(&resolution.displaced, &out).unwrap().unwrap();
        let names = archive::entry_names(&out).unwrap();
        assert_eq!(
            names,
            vec![
                "com.example_lib-a_1.0/res/values/strings.xml",
                "com.example_lib-b_1.0/res/values/strings.xml",
            ]
        );
        assert!(write_duplicates(&[], &out).unwrap().is_none());
    }
}
