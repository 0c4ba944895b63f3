//! Dependency classification.
//!
//! Decides what the rest of the pipeline does with a resolved dependency.
//! Classification looks only at the declared type, the classifier and the
//! file name, never at file contents, so it is safe to call repeatedly.

use std::path::Path;

use apkpipe_schema::{Arch, DependencyArtifact, PackageType};

/// What a dependency contributes to the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// `aar`: classes jar, resources, assets, `jni/` natives, manifest.
    AndroidArchive,
    /// `apklib`: sources, resources, assets, `libs/` natives, manifest.
    AndroidLibrary,
    /// `apk`: an application this build instruments; only its classes jar is used.
    Application,
    /// `jar`: classes and java resources.
    JavaArchive,
    /// `so`: a prebuilt shared library for one ABI.
    NativeShared(Option<Arch>),
    /// `a`: a prebuilt static archive for one ABI.
    NativeStatic(Option<Arch>),
    /// Anything else. Passed through untouched.
    Unknown,
}

impl ArtifactKind {
    /// Whether this kind is unpacked into a staging area.
    pub fn is_unpacked(self) -> bool {
        matches!(self, Self::AndroidArchive | Self::AndroidLibrary)
    }

    /// Whether unpacking must find an `AndroidManifest.xml`.
    pub fn requires_manifest(self) -> bool {
        self.is_unpacked()
    }

    /// Name of the folder inside the staging area holding native libraries.
    pub fn natives_folder(self) -> Option<&'static str> {
        match self {
            Self::AndroidArchive => Some("jni"),
            Self::AndroidLibrary => Some("libs"),
            _ => None,
        }
    }

    /// Whether this kind contributes classes to dexing.
    pub fn has_classes(self) -> bool {
        matches!(
            self,
            Self::AndroidArchive | Self::Application | Self::JavaArchive
        )
    }
}

/// Classify a dependency.
///
/// The declared type is authoritative; the file extension is only consulted
/// when the declared type is not one the pipeline knows.
pub fn classify(artifact: &DependencyArtifact) -> ArtifactKind {
    let package_type = match &artifact.package_type {
        PackageType::Other(_) => type_from_extension(&artifact.file),
        known => Some(known.clone()),
    };

    match package_type {
        Some(PackageType::Aar) => ArtifactKind::AndroidArchive,
        Some(PackageType::Apklib) => ArtifactKind::AndroidLibrary,
        Some(PackageType::Apk) => ArtifactKind::Application,
        Some(PackageType::Jar) => ArtifactKind::JavaArchive,
        Some(PackageType::So) => ArtifactKind::NativeShared(native_arch(artifact)),
        Some(PackageType::A) => ArtifactKind::NativeStatic(native_arch(artifact)),
        Some(PackageType::Other(_)) | None => ArtifactKind::Unknown,
    }
}

fn type_from_extension(path: &Path) -> Option<PackageType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match PackageType::from(ext) {
        PackageType::Other(_) => None,
        known => Some(known),
    }
}

/// ABI of a native dependency: the classifier when it names one, otherwise an
/// ABI-named parent directory of a `lib*.so` / `lib*.a` file.
fn native_arch(artifact: &DependencyArtifact) -> Option<Arch> {
    if let Some(arch) = artifact
        .coordinate
        .classifier
        .as_deref()
        .and_then(Arch::from_classifier)
    {
        return Some(arch);
    }

    let file_name = artifact.file.file_name()?.to_str()?;
    if !file_name.starts_with("lib") {
        return None;
    }
    artifact
        .file
        .parent()?
        .file_name()?
        .to_str()?
        .parse()
        .ok()
}
