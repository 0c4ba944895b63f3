//! Dependency artifacts, packaging types and scopes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::Coordinate;

/// Declared packaging type of a dependency.
///
/// Unknown types are kept verbatim so they can be passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum PackageType {
    /// Android Archive: compiled classes plus resources, assets and natives.
    Aar,
    /// Legacy Android library: sources, resources, assets and natives.
    Apklib,
    /// A finished application package (used by instrumentation projects).
    Apk,
    /// Plain Java archive.
    #[default]
    Jar,
    /// Native shared library.
    So,
    /// Native static archive.
    A,
    /// Any other declared type.
    Other(String),
}

impl PackageType {
    /// Type name as written in dependency declarations.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Aar => "aar",
            Self::Apklib => "apklib",
            Self::Apk => "apk",
            Self::Jar => "jar",
            Self::So => "so",
            Self::A => "a",
            Self::Other(other) => other,
        }
    }

    /// Whether the type is an Android library whose contents get unpacked.
    pub fn is_android_library(&self) -> bool {
        matches!(self, Self::Aar | Self::Apklib)
    }

    /// Whether the type is a native library (`so` or `a`).
    pub fn is_native(&self) -> bool {
        matches!(self, Self::So | Self::A)
    }
}

impl From<String> for PackageType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "aar" => Self::Aar,
            "apklib" => Self::Apklib,
            "apk" => Self::Apk,
            "jar" => Self::Jar,
            "so" => Self::So,
            "a" => Self::A,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for PackageType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<PackageType> for String {
    fn from(value: PackageType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependency scope, deciding which stages see the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Needed to compile and packaged into the output (default).
    #[default]
    Compile,
    /// Needed to compile but supplied by the platform at runtime.
    Provided,
    /// Only needed at runtime.
    Runtime,
    /// Only used by tests.
    Test,
    /// Like `Provided`, but located by an explicit path.
    System,
}

impl Scope {
    /// Whether artifacts in this scope end up inside the final package.
    pub fn is_packaged(self) -> bool {
        matches!(self, Self::Compile | Self::Runtime)
    }
}

/// A resolved dependency handed to the pipeline by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyArtifact {
    /// `group:artifact:version[:classifier]` identity.
    pub coordinate: Coordinate,

    /// Declared packaging type.
    #[serde(rename = "type", default)]
    pub package_type: PackageType,

    /// Dependency scope.
    #[serde(default)]
    pub scope: Scope,

    /// Location of the resolved file or directory.
    pub file: PathBuf,
}

/// Errors that can occur when validating a [`DependencyArtifact`].
#[derive(thiserror::Error, Debug)]
pub enum DependencyError {
    /// The artifact has no file location.
    #[error("Dependency {0} has no file")]
    MissingFile(String),

    /// The file location does not exist on disk.
    #[error("Dependency {coordinate} points at missing path {path}")]
    NotFound {
        /// Offending coordinate.
        coordinate: String,
        /// Path that was looked up.
        path: PathBuf,
    },
}

impl DependencyArtifact {
    /// Create a compile-scope dependency.
    pub fn new(coordinate: Coordinate, package_type: PackageType, file: impl Into<PathBuf>) -> Self {
        Self {
            coordinate,
            package_type,
            scope: Scope::Compile,
            file: file.into(),
        }
    }

    /// Override the scope.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Checks that the artifact has a file and that it exists.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError::MissingFile`] if the path is empty and
    /// [`DependencyError::NotFound`] if nothing exists at that path.
    pub fn validate(&self) -> Result<(), DependencyError> {
        if self.file.as_os_str().is_empty() {
            return Err(DependencyError::MissingFile(self.coordinate.to_string()));
        }
        if !self.file.exists() {
            return Err(DependencyError::NotFound {
                coordinate: self.coordinate.to_string(),
                path: self.file.clone(),
            });
        }
        Ok(())
    }
}
