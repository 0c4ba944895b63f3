//! Final package assembly.
//!
//! [`assemble`] decides what goes where and returns a [`PackageManifest`];
//! [`PackageManifest::write`] then streams every entry into a deterministic
//! zip. Contents come from four places, merged in this order:
//!
//! 1. the resource package produced by the resource linker,
//! 2. `classes.dex` followed by `classes2.dex`, `classes3.dex`, ...,
//! 3. java resources and `META-INF/` entries of the project classes and
//!    dependency jars, in resolution order,
//! 4. native libraries per ABI, first source wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use apkpipe_schema::Arch;
use glob::Pattern;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::archive::{self, DeterministicZip, META_INF};
use crate::conflict::{Contributor, Location, MergeSource, ResourceEntry, find_conflicts_with};
use crate::error::{IoResultExt, PipelineError, Result};
use crate::transform::{
    AppendingTransformer, ResourceTransformer, TransformerConfig, find_transformer,
};

/// Identity of entries taken from the resource package.
pub const RESOURCE_PACKAGE: &str = "resource-package";
/// Identity of dex files.
pub const DEX: &str = "dex";

const SERVICES: &str = "META-INF/services/*";

/// Native library source, in precedence order within [`PackageInput::natives`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeSource {
    /// A directory of libraries. With `arch` set the libraries sit directly
    /// inside `dir`; otherwise `dir` holds one subdirectory per ABI.
    Directory {
        /// Who contributes.
        identity: String,
        /// Fixed ABI, if any.
        arch: Option<Arch>,
        /// Library directory.
        dir: PathBuf,
    },
    /// A single library packaged as `lib/<arch>/<name>`.
    Library {
        /// Who contributes.
        identity: String,
        /// Target ABI.
        arch: Arch,
        /// Library file.
        file: PathBuf,
        /// Entry name inside `lib/<arch>/`.
        name: String,
    },
}

/// Everything the assembler reads.
#[derive(Debug, Clone, Default)]
pub struct PackageInput {
    /// `.ap_` written by the resource linker.
    pub resource_package: PathBuf,
    /// Directory holding `classes*.dex`.
    pub dex_dir: Option<PathBuf>,
    /// Project classes and dependency jars, highest precedence first.
    pub jars: Vec<MergeSource>,
    /// Native libraries, highest precedence first.
    pub natives: Vec<NativeSource>,
    /// `META-INF/` entries of jars to keep (globs over the full path).
    pub meta_inf: Vec<String>,
    /// Java resources to drop (regexes over the full path).
    pub exclude: Vec<String>,
    /// Transformers, first match wins.
    pub transformers: Vec<TransformerConfig>,
}

/// Signing state of the written package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningState {
    /// Not signed.
    #[default]
    Unsigned,
    /// Signed with the SDK debug key.
    DebugSigned,
    /// Signed with a release key.
    ReleaseSigned,
}

#[derive(Debug, Clone)]
enum Content {
    Copied { identity: String, location: Location },
    Merged(Vec<u8>),
}

impl Content {
    fn identity(&self) -> &str {
        match self {
            Self::Copied { identity, .. } => identity,
            Self::Merged(_) => "transformer",
        }
    }

    fn read(&self) -> Result<Vec<u8>> {
        match self {
            Self::Copied { location, .. } => location.read(),
            Self::Merged(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Description of the final package. At most one entry per path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageManifest {
    /// Dex files, primary first.
    pub dex: Vec<String>,
    /// Entries from the resource package (manifest, resource table, `res/`, `assets/`).
    pub resources: Vec<String>,
    /// Java resources from jars.
    pub java_resources: Vec<String>,
    /// Native libraries per ABI.
    pub natives: BTreeMap<Arch, Vec<String>>,
    /// Kept `META-INF/` entries.
    pub meta_inf: Vec<String>,
    /// Paths whose content came from a transformer.
    pub transformed: Vec<String>,
    /// `path (identity)` of every displaced contribution.
    pub duplicates: Vec<String>,
    /// Signing state.
    pub signing: SigningState,
    #[serde(skip)]
    entries: BTreeMap<String, Content>,
    #[serde(skip)]
    displaced: Vec<(String, Contributor)>,
}

impl PackageManifest {
    /// Every packaged path, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of packaged entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is packaged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path` is packaged.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Contributions that lost to a higher-precedence source.
    pub fn displaced(&self) -> &[(String, Contributor)] {
        &self.displaced
    }

    /// Write the package to `out`, entries in path order with fixed
    /// timestamps.
    ///
    /// # Errors
    ///
    /// Fails when a contribution cannot be read or the archive written.
    pub fn write(&self, out: &Path) -> Result<PathBuf> {
        let mut zip = DeterministicZip::create(out)?;
        for (path, content) in &self.entries {
            zip.add(path, &content.read()?)?;
        }
        let path = zip.finish()?;
        info!("wrote {} entries to {}", self.entries.len(), path.display());
        Ok(path)
    }

    /// Insert `path`, enforcing uniqueness for packaging-unique paths.
    /// Returns `false` when the path was already taken.
    fn claim(&mut self, path: &str, content: Content) -> Result<bool> {
        let Some(existing) = self.entries.get(path) else {
            self.entries.insert(path.to_string(), content);
            return Ok(true);
        };
        if is_packaging_unique(path) && existing.read()? != content.read()? {
            return Err(PipelineError::DuplicateFile {
                path: path.to_string(),
                first: existing.identity().to_string(),
                second: content.identity().to_string(),
            });
        }
        Ok(false)
    }

    fn displace(&mut self, path: &str, contributor: &Contributor) {
        debug!("{path} from {} displaced", contributor.identity);
        self.duplicates
            .push(format!("{path} ({})", contributor.identity));
        self.displaced.push((path.to_string(), contributor.clone()));
    }
}

/// Paths the package format allows only once.
pub fn is_packaging_unique(path: &str) -> bool {
    path == "AndroidManifest.xml" || path == "resources.arsc" || dex_index(path).is_some()
}

/// `classes.dex` is 1, `classesN.dex` is N.
fn dex_index(path: &str) -> Option<u32> {
    let middle = path.strip_prefix("classes")?.strip_suffix(".dex")?;
    if middle.is_empty() {
        return Some(1);
    }
    if middle.starts_with('0') {
        return None;
    }
    middle.parse().ok().filter(|n| *n >= 2)
}

/// `classes.dex`, then `classes2.dex`, `classes3.dex`, ... until one is missing.
pub fn discover_dex_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let primary = dir.join("classes.dex");
    if !primary.is_file() {
        return found;
    }
    found.push(primary);
    for n in 2.. {
        let next = dir.join(format!("classes{n}.dex"));
        if !next.is_file() {
            break;
        }
        found.push(next);
    }
    found
}

/// Work out the package contents.
///
/// # Errors
///
/// - [`PipelineError::DuplicateFile`] when a packaging-unique path is
///   contributed twice with different content.
/// - [`PipelineError::Configuration`] for invalid globs, regexes or
///   transformer patterns.
/// - I/O and archive errors while reading inputs.
pub fn assemble(input: &PackageInput) -> Result<PackageManifest> {
    let mut manifest = PackageManifest::default();
    let transformers = input
        .transformers
        .iter()
        .map(TransformerConfig::build)
        .collect::<Result<Vec<_>>>()?;

    if input.resource_package.is_file() {
        for name in archive::entry_names(&input.resource_package)? {
            if name.starts_with(META_INF) {
                continue;
            }
            let content = Content::Copied {
                identity: RESOURCE_PACKAGE.to_string(),
                location: Location::Entry {
                    archive: input.resource_package.clone(),
                    name: name.clone(),
                },
            };
            if manifest.claim(&name, content)? {
                manifest.resources.push(name);
            }
        }
    }

    if let Some(dir) = &input.dex_dir {
        for file in discover_dex_files(dir) {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = Content::Copied {
                identity: DEX.to_string(),
                location: Location::File(file),
            };
            if manifest.claim(&name, content)? {
                manifest.dex.push(name);
            }
        }
    }

    add_java_resources(&mut manifest, input, &transformers)?;
    add_meta_inf(&mut manifest, input, &transformers)?;
    add_natives(&mut manifest, &input.natives)?;

    info!(
        dex = manifest.dex.len(),
        resources = manifest.resources.len(),
        java_resources = manifest.java_resources.len(),
        displaced = manifest.displaced.len(),
        "package contents resolved"
    );
    Ok(manifest)
}

fn add_java_resources(
    manifest: &mut PackageManifest,
    input: &PackageInput,
    transformers: &[Box<dyn ResourceTransformer>],
) -> Result<()> {
    let excludes = input
        .exclude
        .iter()
        .map(|p| {
            Regex::new(p)
                .map_err(|e| PipelineError::config(format!("Invalid exclude pattern '{p}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let report = find_conflicts_with(&input.jars, |path| {
        path.starts_with(META_INF)
            || path.ends_with(".class")
            || excludes.iter().any(|re| re.is_match(path))
    })?;

    for entry in report.entries() {
        if merge_entry(manifest, entry, transformers)? {
            manifest.java_resources.push(entry.path.clone());
        }
    }
    Ok(())
}

fn add_meta_inf(
    manifest: &mut PackageManifest,
    input: &PackageInput,
    transformers: &[Box<dyn ResourceTransformer>],
) -> Result<()> {
    if input.meta_inf.is_empty() {
        return Ok(());
    }
    let patterns = input
        .meta_inf
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| PipelineError::config(format!("Invalid META-INF pattern '{p}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let services = AppendingTransformer::new(&[SERVICES])?;
    let report = find_conflicts_with(&input.jars, |path| {
        !path.starts_with(META_INF)
            || is_signature_file(path)
            || !patterns.iter().any(|p| p.matches(path))
    })?;

    for entry in report.entries() {
        let kept = if entry.is_conflict() && services.can_transform(&entry.path) {
            let contributions = entry
                .contributors
                .iter()
                .map(|c| c.location.read())
                .collect::<Result<Vec<_>>>()?;
            let merged = services.transform(&entry.path, &contributions)?;
            manifest.claim(&entry.path, Content::Merged(merged))?
        } else {
            merge_entry(manifest, entry, transformers)?
        };
        if kept {
            manifest.meta_inf.push(entry.path.clone());
        }
    }
    Ok(())
}

/// Jar signatures and the jar manifest are regenerated by the signer.
fn is_signature_file(path: &str) -> bool {
    let Some(name) = path.strip_prefix(META_INF) else {
        return false;
    };
    if name.contains('/') {
        return false;
    }
    name == "MANIFEST.MF"
        || [".SF", ".RSA", ".DSA", ".EC"]
            .iter()
            .any(|ext| name.to_ascii_uppercase().ends_with(ext))
}

/// Place one indexed entry. Transformers get first pick of a conflicting
/// path; otherwise the first contributor wins and the rest are displaced.
fn merge_entry(
    manifest: &mut PackageManifest,
    entry: &ResourceEntry,
    transformers: &[Box<dyn ResourceTransformer>],
) -> Result<bool> {
    let transformer = find_transformer(transformers, &entry.path);
    if let Some(transformer) = transformer.filter(|_| entry.is_conflict()) {
        let contributions = entry
            .contributors
            .iter()
            .map(|c| c.location.read())
            .collect::<Result<Vec<_>>>()?;
        let merged = transformer.transform(&entry.path, &contributions)?;
        let kept = manifest.claim(&entry.path, Content::Merged(merged))?;
        if kept {
            manifest.transformed.push(entry.path.clone());
        }
        return Ok(kept);
    }

    let mut kept = false;
    for contributor in &entry.contributors {
        let content = Content::Copied {
            identity: contributor.identity.clone(),
            location: contributor.location.clone(),
        };
        if manifest.claim(&entry.path, content)? {
            kept = true;
        } else if !is_packaging_unique(&entry.path) {
            manifest.displace(&entry.path, contributor);
        }
    }
    Ok(kept)
}

fn add_natives(manifest: &mut PackageManifest, sources: &[NativeSource]) -> Result<()> {
    for source in sources {
        for (identity, arch, file, name) in native_files(source)? {
            let path = format!("lib/{}/{name}", arch.as_str());
            let content = Content::Copied {
                identity: identity.clone(),
                location: Location::File(file),
            };
            if manifest.claim(&path, content)? {
                manifest.natives.entry(arch).or_default().push(name);
            } else {
                debug!("{path} from {identity} shadowed by a higher-precedence library");
            }
        }
    }
    for names in manifest.natives.values_mut() {
        names.sort();
    }
    Ok(())
}

fn native_files(source: &NativeSource) -> Result<Vec<(String, Arch, PathBuf, String)>> {
    match source {
        NativeSource::Library {
            identity,
            arch,
            file,
            name,
        } => Ok(vec![(identity.clone(), *arch, file.clone(), name.clone())]),
        NativeSource::Directory {
            identity,
            arch: Some(arch),
            dir,
        } => Ok(libraries_in(dir)?
            .into_iter()
            .map(|(file, name)| (identity.clone(), *arch, file, name))
            .collect()),
        NativeSource::Directory {
            identity,
            arch: None,
            dir,
        } => {
            let mut out = Vec::new();
            if !dir.is_dir() {
                return Ok(out);
            }
            let mut subdirs: Vec<_> = fs::read_dir(dir)
                .io_context(|| format!("Failed to list {}", dir.display()))?
                .filter_map(std::result::Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            subdirs.sort();
            for sub in subdirs {
                let Some(arch) = sub
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.parse::<Arch>().ok())
                else {
                    continue;
                };
                for (file, name) in libraries_in(&sub)? {
                    out.push((identity.clone(), arch, file, name));
                }
            }
            Ok(out)
        }
    }
}

/// `*.so` files directly inside `dir`, sorted by name.
fn libraries_in(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut libs: Vec<(PathBuf, String)> = fs::read_dir(dir)
        .io_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "so"))
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?.to_string();
            Some((p, name))
        })
        .collect();
    libs.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(libs)
}
