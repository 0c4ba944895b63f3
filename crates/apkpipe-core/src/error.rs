//! Pipeline error taxonomy.
//!
//! Every failure surfaced by the pipeline falls into one of four groups:
//! configuration, resolution (I/O, archives, missing manifests), execution of
//! an external tool, and packaging conflicts. Skippable conditions (proguard
//! disabled, no `Android.mk`) are not errors.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by any pipeline component.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Filesystem failure with a description of what was attempted.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A dependency archive could not be read.
    #[error("Archive error in {path}: {message}")]
    Archive {
        /// Archive that failed.
        path: PathBuf,
        /// Reason reported by the zip reader.
        message: String,
    },

    /// An Android library was unpacked but carries no `AndroidManifest.xml`.
    #[error("Dependency {coordinate} has no AndroidManifest.xml")]
    MissingManifest {
        /// Offending coordinate.
        coordinate: String,
    },

    /// An external tool ran but exited unsuccessfully.
    #[error("{tool} failed with exit code {}:\n{stderr}", code.map_or_else(|| "<signal>".to_string(), |c| c.to_string()))]
    Execution {
        /// Program that was run.
        tool: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// An external tool could not be started at all.
    #[error("Failed to launch {tool}: {source}")]
    Launch {
        /// Program that was attempted.
        tool: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// A packaging-unique path was contributed twice with different content.
    #[error("Duplicated file: {path}, found in archive {first} and {second}")]
    DuplicateFile {
        /// Path inside the package.
        path: String,
        /// Identity of the first contributor.
        first: String,
        /// Identity of the second contributor.
        second: String,
    },

    /// Strict mode refused to auto-resolve these overlapping paths.
    #[error("{} unresolved resource conflict(s): {}", paths.len(), paths.join(", "))]
    UnresolvedConflicts {
        /// Conflicting relative paths.
        paths: Vec<String>,
    },

    /// A tool exited successfully but its expected output is absent.
    #[error("{stage}: expected output {} was not produced", path.display())]
    MissingOutput {
        /// Stage that checked.
        stage: String,
        /// Missing file.
        path: PathBuf,
    },
}

impl PipelineError {
    /// Wrap an I/O error with a context message.
    pub fn io(context: impl std::fmt::Display, source: io::Error) -> Self {
        Self::Io {
            context: context.to_string(),
            source,
        }
    }

    /// Build an [`PipelineError::Archive`] from any displayable error.
    pub fn archive(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Archive {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Build a [`PipelineError::Configuration`].
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Attach a context message to `std::io::Result`s.
pub trait IoResultExt<T> {
    /// Convert the error into [`PipelineError::Io`] with a lazily built message.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error if `self` is `Err`.
    fn io_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn io_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        self.map_err(|source| PipelineError::io(f(), source))
    }
}
