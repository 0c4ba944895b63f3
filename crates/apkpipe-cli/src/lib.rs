//! apkpipe - Android build pipeline orchestrator
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Turns compiled classes, resources and resolved dependencies into a signed
//! APK by driving the Android SDK tools in a fixed order:
//!
//! ```text
//! generate-sources -> compile-native -> process-classes -> prepare-package -> package
//! ```
//!
//! Everything the build needs lives in one `apkpipe.toml`; the staging tree
//! goes below `[project].build_dir`.

pub mod cmd;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apkpipe_core::PipelineConfig;
use clap::{Parser, Subcommand};

/// Config file looked up in the current directory.
pub const DEFAULT_CONFIG: &str = "apkpipe.toml";

#[derive(Debug, Parser)]
#[command(name = "apkpipe")]
#[command(author, version, about = "apkpipe - Android build pipeline orchestrator")]
pub struct Cli {
    /// Build configuration
    #[arg(long, short, global = true, env = "APKPIPE_CONFIG", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the build pipeline
    Build {
        /// Stop after this stage (e.g. prepare-package)
        #[arg(long)]
        until: Option<String>,
        /// Fail on any resource conflict
        #[arg(long)]
        strict: bool,
    },
    /// Stage every Android library dependency
    Unpack,
    /// Report resource and asset paths contributed more than once
    Conflicts,
    /// Show the resolved SDK, build tools, JDK and NDK
    Toolchain {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Delete the build directory
    Clean,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Load `path`, naming it in the error.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config = PipelineConfig::load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::debug!(
        project = %config.project.name,
        dependencies = config.dependencies.len(),
        "loaded {}",
        path.display()
    );
    Ok(config)
}
