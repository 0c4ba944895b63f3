//! Dependency unpacking into per-artifact staging areas.
//!
//! Each Android library is extracted once into
//! `unpacked-libs/<shortened-group>_<artifact>_<version>_<digest>/`. A stamp
//! file holding the coordinate is written as the last step of a successful
//! extraction; later builds reuse the staging area as long as the stamp names
//! the same coordinate and is at least as new as the dependency file. Within one build results are additionally memoized in memory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use apkpipe_schema::{Arch, Coordinate, DependencyArtifact, Scope};
use tracing::{debug, warn};

use crate::archive::{self, META_INF};
use crate::classify::{ArtifactKind, classify};
use crate::error::{IoResultExt, PipelineError, Result};
use crate::filter::ArtifactFilter;
use crate::paths::StagingLayout;

const STAMP_FILE: &str = ".apkpipe-unpacked";
const MANIFEST: &str = "AndroidManifest.xml";
const CLASSES_JAR: &str = "classes.jar";

/// Contents of one dependency after unpacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedArtifact {
    /// Owning dependency.
    pub coordinate: Coordinate,
    /// How the dependency was classified.
    pub kind: ArtifactKind,
    /// Staging area root.
    pub root: PathBuf,
    /// Exploded class files.
    pub classes: PathBuf,
    /// The dependency's own classes jar, when it ships one.
    pub classes_jar: Option<PathBuf>,
    /// `res/`
    pub resources: Option<PathBuf>,
    /// `assets/`
    pub assets: Option<PathBuf>,
    /// `src/` (APKLIB only)
    pub sources: Option<PathBuf>,
    /// Native library folders keyed by ABI.
    pub natives: BTreeMap<Arch, PathBuf>,
    /// `AndroidManifest.xml`
    pub manifest: Option<PathBuf>,
    /// Consumer proguard rules (`proguard.txt`).
    pub proguard_rules: Option<PathBuf>,
    /// Library symbol table (`R.txt`).
    pub symbols: Option<PathBuf>,
}

/// Counters describing how `unpack` calls were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackStats {
    /// Archives actually extracted or directories copied.
    pub extractions: usize,
    /// Calls answered from the in-memory memo.
    pub memo_hits: usize,
    /// Calls answered from an up-to-date staging area on disk.
    pub disk_hits: usize,
}

/// Memoizing unpacker bound to one staging layout.
#[derive(Debug)]
pub struct Unpacker {
    layout: StagingLayout,
    memo: HashMap<Coordinate, UnpackedArtifact>,
    stats: UnpackStats,
}

impl Unpacker {
    /// Create an unpacker writing below `layout`.
    pub fn new(layout: StagingLayout) -> Self {
        Self {
            layout,
            memo: HashMap::new(),
            stats: UnpackStats::default(),
        }
    }

    /// How calls have been served so far.
    pub fn stats(&self) -> UnpackStats {
        self.stats
    }

    /// Unpack an AAR, APKLIB or APK dependency.
    ///
    /// Idempotent: repeated calls with the same coordinate return the same
    /// result without touching the filesystem, and a fresh staging area left
    /// by a previous build is reused.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Configuration`] if the dependency is not unpackable.
    /// - [`PipelineError::Archive`] / [`PipelineError::Io`] if extraction fails.
    /// - [`PipelineError::MissingManifest`] if an Android library has no manifest.
    pub fn unpack(&mut self, artifact: &DependencyArtifact) -> Result<UnpackedArtifact> {
        if let Some(hit) = self.memo.get(&artifact.coordinate) {
            self.stats.memo_hits += 1;
            return Ok(hit.clone());
        }

        let kind = classify(artifact);
        if !kind.is_unpacked() && kind != ArtifactKind::Application {
            return Err(PipelineError::config(format!(
                "{} ({}) is not an unpackable dependency",
                artifact.coordinate, artifact.package_type
            )));
        }

        let root = self.layout.unpacked_lib(&artifact.coordinate);
        if is_fresh(&root, artifact)? {
            debug!("Reusing staging area {}", root.display());
            self.stats.disk_hits += 1;
        } else {
            populate(artifact, kind, &root)?;
            self.stats.extractions += 1;
        }

        let unpacked = scan(&artifact.coordinate, kind, &root)?;
        self.memo
            .insert(artifact.coordinate.clone(), unpacked.clone());
        Ok(unpacked)
    }
}

/// Dependencies the unpacker stages, in resolution order: AARs, APKLIBs and
/// APKs that pass `filter`, excluding test scope.
///
/// # Errors
///
/// Fails on an invalid filter pattern.
pub fn android_libraries<'a>(
    dependencies: &'a [DependencyArtifact],
    filter: &ArtifactFilter,
) -> Result<Vec<&'a DependencyArtifact>> {
    Ok(filter
        .apply(dependencies)?
        .into_iter()
        .filter(|d| d.scope != Scope::Test)
        .filter(|d| {
            let kind = classify(d);
            kind.is_unpacked() || kind == ArtifactKind::Application
        })
        .collect())
}

/// Whether `root` holds a completed extraction of `artifact` at least as new
/// as its file.
fn is_fresh(root: &Path, artifact: &DependencyArtifact) -> Result<bool> {
    let stamp_path = root.join(STAMP_FILE);
    let Ok(owner) = fs::read_to_string(&stamp_path) else {
        return Ok(false);
    };
    if owner.trim() != artifact.coordinate.to_string() {
        debug!(
            "Staging area {} belongs to {}, not {}",
            root.display(),
            owner.trim(),
            artifact.coordinate
        );
        return Ok(false);
    }
    let stamp = fs::metadata(&stamp_path)
        .io_context(|| format!("Failed to read {}", stamp_path.display()))?;
    let source_mtime = modified(&artifact.file)?;
    let stamp_mtime = stamp
        .modified()
        .io_context(|| format!("Failed to read mtime of {}", root.display()))?;
    Ok(stamp_mtime >= source_mtime)
}

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .io_context(|| format!("Failed to read mtime of {}", path.display()))
}

/// Extract (or copy) `artifact` into a clean `root` and post-process it.
fn populate(artifact: &DependencyArtifact, kind: ArtifactKind, root: &Path) -> Result<()> {
    if root.exists() {
        fs::remove_dir_all(root)
            .io_context(|| format!("Failed to clear {}", root.display()))?;
    }
    fs::create_dir_all(root).io_context(|| format!("Failed to create {}", root.display()))?;

    if kind == ArtifactKind::Application {
        copy_apk_classes(artifact, root)?;
    } else if artifact.file.is_dir() {
        warn!(
            "{} resolved to a directory; copying {} instead of extracting",
            artifact.coordinate,
            artifact.file.display()
        );
        let mut options = fs_extra::dir::CopyOptions::new();
        options.content_only = true;
        options.overwrite = true;
        fs_extra::dir::copy(&artifact.file, root, &options).map_err(|e| {
            PipelineError::io(
                format!("Failed to copy {}", artifact.file.display()),
                std::io::Error::other(e.to_string()),
            )
        })?;
    } else {
        debug!(
            "Extracting {} to {}",
            artifact.file.display(),
            root.display()
        );
        archive::extract_zip(&artifact.file, root, |name| name.starts_with(META_INF))?;
    }

    let classes_jar = root.join(CLASSES_JAR);
    if classes_jar.is_file() {
        archive::extract_zip(&classes_jar, &root.join("classes"), |name| {
            name.starts_with(META_INF)
        })?;
    }

    if kind == ArtifactKind::AndroidArchive {
        move_legacy_natives(root)?;
    }

    if kind.requires_manifest() && !root.join(MANIFEST).is_file() {
        return Err(PipelineError::MissingManifest {
            coordinate: artifact.coordinate.to_string(),
        });
    }

    fs::write(root.join(STAMP_FILE), artifact.coordinate.to_string())
        .io_context(|| format!("Failed to stamp {}", root.display()))
}

/// An APK dependency is represented by a sibling jar holding its classes.
fn copy_apk_classes(artifact: &DependencyArtifact, root: &Path) -> Result<()> {
    let companion = artifact.file.with_extension("jar");
    if companion.is_file() {
        fs::copy(&companion, root.join(CLASSES_JAR))
            .io_context(|| format!("Failed to copy {}", companion.display()))?;
    } else {
        warn!(
            "No classes jar next to {}; its classes will not be on the classpath",
            artifact.file.display()
        );
    }
    Ok(())
}

/// Older AARs ship natives in `libs/<abi>/` instead of `jni/<abi>/`.
fn move_legacy_natives(root: &Path) -> Result<()> {
    let jni = root.join("jni");
    let libs = root.join("libs");
    if jni.exists() || !libs.is_dir() {
        return Ok(());
    }

    let natives: Vec<PathBuf> = fs::read_dir(&libs)
        .io_context(|| format!("Failed to list {}", libs.display()))?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            !p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
        })
        .collect();
    if natives.is_empty() {
        return Ok(());
    }

    debug!("Moving AAR native libraries from libs to jni");
    fs::create_dir_all(&jni).io_context(|| format!("Failed to create {}", jni.display()))?;
    for native in natives {
        let Some(name) = native.file_name() else {
            continue;
        };
        let target = jni.join(name);
        fs::rename(&native, &target)
            .io_context(|| format!("Failed to move {}", native.display()))?;
    }
    Ok(())
}

fn existing_dir(path: PathBuf) -> Option<PathBuf> {
    path.is_dir().then_some(path)
}

fn existing_file(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

/// Describe the contents of a populated staging area.
fn scan(coordinate: &Coordinate, kind: ArtifactKind, root: &Path) -> Result<UnpackedArtifact> {
    let mut natives = BTreeMap::new();
    if let Some(folder) = kind.natives_folder() {
        let natives_root = root.join(folder);
        if natives_root.is_dir() {
            for entry in fs::read_dir(&natives_root)
                .io_context(|| format!("Failed to list {}", natives_root.display()))?
            {
                let entry = entry.io_context(|| format!("Failed to list {}", natives_root.display()))?;
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                if let Some(arch) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.parse::<Arch>().ok())
                {
                    natives.insert(arch, path);
                }
            }
        }
    }

    Ok(UnpackedArtifact {
        coordinate: coordinate.clone(),
        kind,
        root: root.to_path_buf(),
        classes: root.join("classes"),
        classes_jar: existing_file(root.join(CLASSES_JAR)),
        resources: existing_dir(root.join("res")),
        assets: existing_dir(root.join("assets")),
        sources: if kind == ArtifactKind::AndroidLibrary {
            existing_dir(root.join("src"))
        } else {
            None
        },
        natives,
        manifest: existing_file(root.join(MANIFEST)),
        proguard_rules: existing_file(root.join("proguard.txt")),
        symbols: existing_file(root.join("R.txt")),
    })
}
