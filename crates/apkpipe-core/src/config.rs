//! `apkpipe.toml` build configuration.
//!
//! One typed table per stage. Relative paths are resolved against the
//! directory holding the configuration file when it is loaded.

use std::fs;
use std::path::{Path, PathBuf};

use apkpipe_schema::{Arch, DependencyArtifact};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::DexCompiler;
use crate::error::PipelineError;
use crate::filter::ArtifactFilter;
use crate::transform::TransformerConfig;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "apkpipe.toml";

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// Values parsed but are inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

/// Complete build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory relative paths were resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
    /// `[project]`
    pub project: ProjectConfig,
    /// `[sdk]`
    #[serde(default)]
    pub sdk: SdkConfig,
    /// `[[dependency]]`, in resolution order.
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencyArtifact>,
    /// `[generate_sources]`
    #[serde(default)]
    pub generate_sources: GenerateSourcesConfig,
    /// `[native]`
    #[serde(default)]
    pub native: NativeConfig,
    /// `[proguard]`
    #[serde(default)]
    pub proguard: ProguardConfig,
    /// `[dex]`
    #[serde(default)]
    pub dex: DexConfig,
    /// `[package]`
    #[serde(default)]
    pub package: PackageConfig,
}

/// `[project]`: identity and source layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Artifact name; default final name and native target.
    pub name: String,
    /// Output base name; defaults to `name`.
    pub final_name: Option<String>,
    /// Staging root.
    pub build_dir: PathBuf,
    /// Compiled project classes.
    pub classes_dir: PathBuf,
    /// `AndroidManifest.xml`
    pub manifest: PathBuf,
    /// `res/`
    pub resources: PathBuf,
    /// `assets/`
    pub assets: PathBuf,
    /// Java/AIDL source roots.
    pub sources: Vec<PathBuf>,
    /// Prebuilt native libraries, one subdirectory per ABI.
    pub native_libs: PathBuf,
    /// Fail on any resource conflict instead of resolving by precedence.
    pub strict: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            final_name: None,
            build_dir: PathBuf::from("target"),
            classes_dir: PathBuf::from("target/classes"),
            manifest: PathBuf::from("AndroidManifest.xml"),
            resources: PathBuf::from("res"),
            assets: PathBuf::from("assets"),
            sources: vec![PathBuf::from("src")],
            native_libs: PathBuf::from("libs"),
            strict: false,
        }
    }
}

impl ProjectConfig {
    /// Output base name.
    pub fn final_name(&self) -> &str {
        self.final_name.as_deref().unwrap_or(&self.name)
    }
}

/// `[sdk]`: tool locations. Unset values are discovered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// SDK root.
    pub path: Option<PathBuf>,
    /// Platform API level or `android-N`.
    pub platform: Option<String>,
    /// Build-tools revision.
    pub build_tools: Option<String>,
    /// NDK root.
    pub ndk: Option<PathBuf>,
    /// `java` launcher.
    pub java: Option<PathBuf>,
}

/// `[generate_sources]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateSourcesConfig {
    /// Which dependencies contribute resources.
    pub filter: ArtifactFilter,
    /// Package of the generated `R` class when it differs from the manifest.
    pub custom_package: Option<String>,
    /// Resource configurations to keep (`-c`).
    pub configurations: Option<String>,
    /// Extra resource tool arguments.
    pub extra_args: Vec<String>,
    /// Compile `.aidl` interfaces.
    pub aidl: bool,
    /// Merge library manifests into the project manifest.
    pub merge_manifests: bool,
    /// Manifest merger jar, required when merging.
    pub manifest_merger_jar: Option<PathBuf>,
}

impl Default for GenerateSourcesConfig {
    fn default() -> Self {
        Self {
            filter: ArtifactFilter::all(),
            custom_package: None,
            configurations: None,
            extra_args: Vec::new(),
            aidl: true,
            merge_manifests: false,
            manifest_merger_jar: None,
        }
    }
}

/// `[native]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    /// Run `ndk-build` at all.
    pub enabled: bool,
    /// `Android.mk`; defaults to `jni/Android.mk`.
    pub makefile: PathBuf,
    /// Make target; defaults to the project name.
    pub target: Option<String>,
    /// `NDK_TOOLCHAIN`
    pub toolchain: Option<String>,
    /// ABIs to build; empty defers to `Application.mk`.
    pub architectures: Vec<Arch>,
    /// Space-separated extra `ndk-build` arguments.
    pub extra_args: Option<String>,
    /// Parallel jobs; defaults to the CPU count.
    pub jobs: Option<usize>,
    /// Which native dependencies are exposed as prebuilts.
    pub filter: ArtifactFilter,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            makefile: PathBuf::from("jni/Android.mk"),
            target: None,
            toolchain: None,
            architectures: Vec::new(),
            extra_args: None,
            jobs: None,
            filter: ArtifactFilter::all(),
        }
    }
}

/// `[proguard]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProguardConfig {
    /// Skip obfuscation.
    pub skip: bool,
    /// Main rules file.
    pub config: PathBuf,
    /// Additional rules files, included after `config`.
    pub configs: Vec<PathBuf>,
    /// Override for `proguard.jar`.
    pub proguard_jar: Option<PathBuf>,
    /// JVM options.
    pub jvm_args: Vec<String>,
    /// Raw option lines.
    pub options: Vec<String>,
    /// Exclude `META-INF/MANIFEST.MF` from input jars.
    pub filter_manifest: bool,
    /// Exclude `META-INF/maven/**` from input jars.
    pub filter_maven_descriptor: bool,
    /// Extra comma-separated exclusion filters for input jars.
    pub custom_filter: Option<String>,
    /// Add the JDK runtime as library jars.
    pub include_jdk_libs: bool,
    /// Which dependencies are program input.
    pub filter: ArtifactFilter,
}

impl Default for ProguardConfig {
    fn default() -> Self {
        Self {
            skip: true,
            config: PathBuf::from("proguard.cfg"),
            configs: Vec::new(),
            proguard_jar: None,
            jvm_args: vec!["-Xmx512M".to_string()],
            options: Vec::new(),
            filter_manifest: true,
            filter_maven_descriptor: true,
            custom_filter: None,
            include_jdk_libs: false,
            filter: ArtifactFilter::all(),
        }
    }
}

/// `[dex]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DexConfig {
    /// `dex` (default) or `d8`.
    pub compiler: DexCompiler,
    /// JVM options.
    pub jvm_args: Vec<String>,
    /// Optimize bytecode (dx).
    pub optimize: bool,
    /// `--core-library` (dx).
    pub core_library: bool,
    /// `--incremental` (dx).
    pub incremental: bool,
    /// `--no-locals` (dx).
    pub no_locals: bool,
    /// `--force-jumbo` (dx).
    pub force_jumbo: bool,
    /// Produce several dex files.
    pub multi_dex: bool,
    /// Primary-dex class list; generated when absent and multi-dex is on.
    pub main_dex_list: Option<PathBuf>,
    /// Keep only listed classes in the primary dex (dx).
    pub minimal_main_dex: bool,
    /// Extra arguments.
    pub extra_args: Vec<String>,
    /// Dex every dependency jar separately and reuse the results.
    pub predex: bool,
    /// `--release` (d8).
    pub release: bool,
    /// `--intermediate` (d8).
    pub intermediate: bool,
    /// `--min-api` (d8); defaults to the platform level.
    pub min_api: Option<u32>,
    /// Which dependencies are dexed.
    pub filter: ArtifactFilter,
}

impl Default for DexConfig {
    fn default() -> Self {
        Self {
            compiler: DexCompiler::Dx,
            jvm_args: vec!["-Xmx1024M".to_string()],
            optimize: true,
            core_library: false,
            incremental: false,
            no_locals: false,
            force_jumbo: false,
            multi_dex: false,
            main_dex_list: None,
            minimal_main_dex: false,
            extra_args: Vec::new(),
            predex: false,
            release: false,
            intermediate: false,
            min_api: None,
            filter: ArtifactFilter::all(),
        }
    }
}

/// How the final package is signed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignMode {
    /// Leave unsigned.
    None,
    /// SDK debug keystore.
    #[default]
    Debug,
    /// Configured release keystore.
    Release,
}

/// `[package.sign]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignConfig {
    /// Signing mode.
    pub mode: SignMode,
    /// Release keystore.
    pub keystore: Option<PathBuf>,
    /// Release key alias.
    pub alias: Option<String>,
    /// Keystore password.
    pub store_password: Option<String>,
    /// Key password.
    pub key_password: Option<String>,
    /// Verbose `jarsigner` output.
    pub verbose: bool,
}

/// `[package]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Mark the package debuggable.
    pub debug: bool,
    /// Run `zipalign` after signing.
    pub zipalign: bool,
    /// Resource transformers, first match wins.
    pub transformers: Vec<TransformerConfig>,
    /// `META-INF/` entries from dependency jars to keep (glob).
    pub meta_inf: Vec<String>,
    /// Java resources to drop (regex over the entry path).
    pub exclude_jar_resources: Vec<String>,
    /// `--rename-manifest-package`
    pub rename_manifest_package: Option<String>,
    /// `--rename-instrumentation-target-package`
    pub rename_instrumentation_target: Option<String>,
    /// Signing.
    pub sign: SignConfig,
    /// Which dependencies are packaged.
    pub filter: ArtifactFilter,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            debug: true,
            zipalign: false,
            transformers: Vec::new(),
            meta_inf: Vec::new(),
            exclude_jar_resources: Vec::new(),
            rename_manifest_package: None,
            rename_instrumentation_target: None,
            sign: SignConfig::default(),
            filter: ArtifactFilter::all(),
        }
    }
}

impl PipelineConfig {
    /// Load and resolve `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse TOML text, resolving relative paths against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: PipelineConfig =
            toml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::from(CONFIG_FILE),
                source,
            })?;
        config.base_dir = base_dir.to_path_buf();
        config.resolve_paths();
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self) {
        let base = self.base_dir.clone();
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        let resolve_opt = |p: &mut Option<PathBuf>| {
            if let Some(p) = p {
                resolve(p);
            }
        };

        let project = &mut self.project;
        resolve(&mut project.build_dir);
        resolve(&mut project.classes_dir);
        resolve(&mut project.manifest);
        resolve(&mut project.resources);
        resolve(&mut project.assets);
        resolve(&mut project.native_libs);
        project.sources.iter_mut().for_each(|p| resolve(p));

        resolve_opt(&mut self.sdk.path);
        resolve_opt(&mut self.sdk.ndk);
        resolve_opt(&mut self.sdk.java);

        for dep in &mut self.dependencies {
            resolve(&mut dep.file);
        }

        resolve_opt(&mut self.generate_sources.manifest_merger_jar);
        resolve(&mut self.native.makefile);
        resolve(&mut self.proguard.config);
        self.proguard.configs.iter_mut().for_each(|p| resolve(p));
        resolve_opt(&mut self.proguard.proguard_jar);
        resolve_opt(&mut self.dex.main_dex_list);
        resolve_opt(&mut self.package.sign.keystore);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.project.name.trim().is_empty() {
            return Err(ConfigError::Invalid("[project].name must not be empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for dep in &self.dependencies {
            if !seen.insert(&dep.coordinate) {
                return Err(ConfigError::Invalid(format!(
                    "dependency {} is declared twice",
                    dep.coordinate
                )));
            }
        }
        if self.generate_sources.merge_manifests && self.generate_sources.manifest_merger_jar.is_none()
        {
            return Err(ConfigError::Invalid(
                "[generate_sources].merge_manifests requires manifest_merger_jar".into(),
            ));
        }
        if self.package.sign.mode == SignMode::Release
            && (self.package.sign.keystore.is_none() || self.package.sign.alias.is_none())
        {
            return Err(ConfigError::Invalid(
                "release signing requires [package.sign].keystore and alias".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkpipe_schema::PackageType;

    const SAMPLE: &str = r#"
[project]
name = "demo"
final_name = "demo-1.0"
strict = true

[sdk]
platform = "34"

[[dependency]]
coordinate = "com.example:widgets:1.2.0"
type = "aar"
file = "libs/widgets-1.2.0.aar"

[[dependency]]
coordinate = "com.example:util:2.0"
file = "/m2/util-2.0.jar"

[proguard]
skip = false
options = ["-dontwarn **"]

[dex]
compiler = "D8"
multi_dex = true

[package]
zipalign = true
transformers = [{ kind = "append", resources = ["reference.conf"] }]

[package.sign]
mode = "none"
"#;

    #[test]
    fn test_parse_and_resolve() {
        let config = PipelineConfig::parse(SAMPLE, Path::new("/work/app")).unwrap();
        assert_eq!(config.project.final_name(), "demo-1.0");
        assert!(config.project.strict);
        assert_eq!(config.project.build_dir, PathBuf::from("/work/app/target"));
        assert_eq!(config.project.sources, vec![PathBuf::from("/work/app/src")]);
        assert_eq!(config.sdk.platform.as_deref(), Some("34"));

        assert_eq!(config.dependencies.len(), 2);
        assert_eq!(config.dependencies[0].package_type, PackageType::Aar);
        assert_eq!(
            config.dependencies[0].file,
            PathBuf::from("/work/app/libs/widgets-1.2.0.aar")
        );
        assert_eq!(config.dependencies[1].file, PathBuf::from("/m2/util-2.0.jar"));

        assert!(!config.proguard.skip);
        assert_eq!(config.proguard.config, PathBuf::from("/work/app/proguard.cfg"));
        assert_eq!(config.dex.compiler, DexCompiler::D8);
        assert!(config.dex.optimize);
        assert_eq!(config.package.transformers.len(), 1);
        assert_eq!(config.package.sign.mode, SignMode::None);
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::parse("[project]\nname = \"x\"\n", Path::new("/p")).unwrap();
        assert_eq!(config.project.final_name(), "x");
        assert!(config.proguard.skip);
        assert_eq!(config.dex.compiler, DexCompiler::Dx);
        assert!(config.generate_sources.aidl);
        assert!(config.native.enabled);
        assert_eq!(config.native.makefile, PathBuf::from("/p/jni/Android.mk"));
        assert_eq!(config.package.sign.mode, SignMode::Debug);
    }

    #[test]
    fn test_unknown_compiler_rejected() {
        let err = PipelineConfig::parse(
            "[project]\nname = \"x\"\n[dex]\ncompiler = \"jack\"\n",
            Path::new("/p"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("jack"));
    }

    #[test]
    fn test_duplicate_dependency_rejected() {
        let text = r#"
[project]
name = "x"
[[dependency]]
coordinate = "a:b:1"
file = "b.jar"
[[dependency]]
coordinate = "a:b:1"
file = "b2.jar"
"#;
        let err = PipelineConfig::parse(text, Path::new("/p")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_release_signing_needs_keystore() {
        let text = "[project]\nname = \"x\"\n[package.sign]\nmode = \"release\"\n";
        let err = PipelineConfig::parse(text, Path::new("/p")).unwrap_err();
        assert!(err.to_string().contains("keystore"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[project\n").unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }
}
