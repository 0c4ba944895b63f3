//! Manifest merging.
//!
//! The implementation is chosen once when the build context is created:
//! [`ToolMerger`] when merging is enabled and a merger jar is configured,
//! [`PassthroughMerger`] otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{ToolInvocation, join_paths};
use crate::config::GenerateSourcesConfig;
use crate::error::{IoResultExt, Result};
use crate::exec::{CommandRunner, run_expecting};

/// Combines the project manifest with library manifests.
pub trait ManifestMerger: std::fmt::Debug {
    /// Write the merged manifest of `target` and `libraries` to `out`.
    ///
    /// Returns `true` when library manifests were actually merged.
    ///
    /// # Errors
    ///
    /// Fails when the merged manifest cannot be produced.
    fn merge(
        &self,
        runner: &dyn CommandRunner,
        target: &Path,
        libraries: &[PathBuf],
        out: &Path,
    ) -> Result<bool>;
}

/// Copies the project manifest unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughMerger;

impl ManifestMerger for PassthroughMerger {
    fn merge(
        &self,
        _runner: &dyn CommandRunner,
        target: &Path,
        _libraries: &[PathBuf],
        out: &Path,
    ) -> Result<bool> {
        copy_manifest(target, out)?;
        Ok(false)
    }
}

/// Runs the manifest merger jar:
/// `java -jar merger.jar --main <target> --libs <a:b> --out <out>`.
#[derive(Debug, Clone)]
pub struct ToolMerger {
    java: PathBuf,
    jar: PathBuf,
}

impl ToolMerger {
    /// Merger running `jar` with `java`.
    pub fn new(java: impl Into<PathBuf>, jar: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            jar: jar.into(),
        }
    }

    /// The invocation merging `libraries` into `target`.
    pub fn invocation(&self, target: &Path, libraries: &[PathBuf], out: &Path) -> ToolInvocation {
        let mut inv = ToolInvocation::new(&self.java);
        inv.flag_path("-jar", &self.jar);
        inv.flag_path("--main", target);
        inv.arg("--libs");
        inv.arg(join_paths(libraries));
        inv.flag_path("--out", out);
        inv
    }
}

impl ManifestMerger for ToolMerger {
    fn merge(
        &self,
        runner: &dyn CommandRunner,
        target: &Path,
        libraries: &[PathBuf],
        out: &Path,
    ) -> Result<bool> {
        if libraries.is_empty() {
            debug!("no library manifests, copying {}", target.display());
            copy_manifest(target, out)?;
            return Ok(false);
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).io_context(|| format!("creating {}", parent.display()))?;
        }
        let cwd = target.parent().unwrap_or_else(|| Path::new("."));
        run_expecting(
            runner,
            "generate-sources",
            &self.invocation(target, libraries, out),
            cwd,
            out,
        )?;
        Ok(true)
    }
}

/// Pick the merger implementation for this configuration.
pub fn select_merger(config: &GenerateSourcesConfig, java: &Path) -> Box<dyn ManifestMerger> {
    match (&config.manifest_merger_jar, config.merge_manifests) {
        (Some(jar), true) => Box::new(ToolMerger::new(java, jar)),
        _ => Box::new(PassthroughMerger),
    }
}

fn copy_manifest(target: &Path, out: &Path) -> Result<()> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).io_context(|| format!("creating {}", parent.display()))?;
    }
    fs::copy(target, out).io_context(|| format!("copying {}", target.display()))?;
    Ok(())
}
