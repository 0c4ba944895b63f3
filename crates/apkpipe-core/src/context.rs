//! Per-build state shared by every stage.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::assemble::PackageManifest;
use crate::command::ToolDialect;
use crate::config::PipelineConfig;
use crate::conflict::Contributor;
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::merger::{ManifestMerger, select_merger};
use crate::paths::StagingLayout;
use crate::reporter::Reporter;
use crate::sdk::{AndroidNdk, AndroidSdk, find_java};
use crate::symbols::SymbolTable;
use crate::unpack::{UnpackedArtifact, Unpacker};

/// Resolved external tool locations.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Android SDK.
    pub sdk: AndroidSdk,
    /// `java` launcher.
    pub java: PathBuf,
    /// NDK, when one was found.
    pub ndk: Option<AndroidNdk>,
}

impl Toolchain {
    /// Discover everything the configuration leaves unset.
    ///
    /// # Errors
    ///
    /// Fails when the SDK or the JDK cannot be located. A missing NDK is not
    /// an error here.
    pub fn discover(config: &PipelineConfig) -> Result<Self> {
        let sdk = AndroidSdk::discover(
            config.sdk.path.as_deref(),
            config.sdk.platform.as_deref(),
            config.sdk.build_tools.as_deref(),
        )?;
        let java = find_java(config.sdk.java.as_deref())?;
        let ndk = AndroidNdk::discover(config.sdk.ndk.as_deref(), Some(&sdk)).ok();
        Ok(Self { sdk, java, ndk })
    }
}

/// Outputs handed from one stage to the next.
#[derive(Debug, Default)]
pub struct BuildState {
    /// Unpacked Android libraries, in resolution order.
    pub libraries: Vec<UnpackedArtifact>,
    /// Manifest produced by the merger.
    pub manifest: Option<PathBuf>,
    /// Symbol table read back after resource linking.
    pub symbols: Option<SymbolTable>,
    /// Contributions displaced while merging resources and java resources.
    pub displaced: Vec<(String, Contributor)>,
    /// Obfuscated jar, when proguard ran.
    pub obfuscated_jar: Option<PathBuf>,
    /// Directory holding `classes*.dex`.
    pub dex_dir: Option<PathBuf>,
    /// Final package and its contents.
    pub package: Option<(PathBuf, PackageManifest)>,
}

/// Everything a build needs, created once and passed to every stage.
pub struct BuildContext {
    /// Configuration.
    pub config: PipelineConfig,
    /// Staging layout under the build directory.
    pub layout: StagingLayout,
    /// Tool locations.
    pub toolchain: Toolchain,
    /// Resource tool generation, probed once.
    pub dialect: ToolDialect,
    /// Manifest merger, selected once.
    pub merger: Box<dyn ManifestMerger>,
    /// Executes tool invocations.
    pub runner: Box<dyn CommandRunner>,
    /// Progress sink.
    pub reporter: Arc<dyn Reporter>,
    /// Memoizing dependency unpacker.
    pub unpacker: Unpacker,
    /// Stage outputs.
    pub state: BuildState,
}

impl BuildContext {
    /// Create the context for one build.
    pub fn new(
        config: PipelineConfig,
        toolchain: Toolchain,
        runner: Box<dyn CommandRunner>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let layout = StagingLayout::new(&config.project.build_dir);
        let dialect = toolchain.sdk.dialect();
        let merger = select_merger(&config.generate_sources, &toolchain.java);
        debug!(?dialect, ?merger, build_dir = %layout.root().display(), "build context ready");
        Self {
            unpacker: Unpacker::new(layout.clone()),
            config,
            layout,
            toolchain,
            dialect,
            merger,
            runner,
            reporter,
            state: BuildState::default(),
        }
    }

    /// Project directory; working directory of every tool.
    pub fn project_dir(&self) -> PathBuf {
        self.config.base_dir.clone()
    }

    /// Output base name.
    pub fn final_name(&self) -> &str {
        self.config.project.final_name()
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("project", &self.config.project.name)
            .field("layout", &self.layout)
            .field("toolchain", &self.toolchain)
            .field("dialect", &self.dialect)
            .field("merger", &self.merger)
            .field("runner", &self.runner)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
