//! Staging layout under the build directory.
//!
//! Every intermediate lives below a single build directory so that deleting
//! that tree invalidates all cached state at once.

use std::path::{Path, PathBuf};

use apkpipe_schema::{Arch, Coordinate};

/// Paths of every intermediate produced by a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    root: PathBuf,
}

impl StagingLayout {
    /// Layout rooted at `build_dir`.
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: build_dir.into(),
        }
    }

    /// The build directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parent of every per-dependency staging area: `unpacked-libs/`
    pub fn unpacked_libs(&self) -> PathBuf {
        self.root.join("unpacked-libs")
    }

    /// Staging area of one dependency: `unpacked-libs/<key>/`
    pub fn unpacked_lib(&self, coordinate: &Coordinate) -> PathBuf {
        self.unpacked_libs().join(coordinate.staging_key())
    }

    /// Generated `R` sources: `generated-sources/r`
    pub fn generated_r(&self) -> PathBuf {
        self.root.join("generated-sources").join("r")
    }

    /// Generated AIDL interfaces: `generated-sources/aidl`
    pub fn generated_aidl(&self) -> PathBuf {
        self.root.join("generated-sources").join("aidl")
    }

    /// Symbol table written by the resource linker: `generated-sources/r/R.txt`
    pub fn symbol_table(&self) -> PathBuf {
        self.generated_r().join("R.txt")
    }

    /// Project assets merged with dependency assets: `combined-assets/`
    pub fn combined_assets(&self) -> PathBuf {
        self.root.join("combined-assets")
    }

    /// Project resources merged with dependency resources: `merged-resources/`
    pub fn merged_resources(&self) -> PathBuf {
        self.root.join("merged-resources")
    }

    /// Output of the modern resource compiler: `compiled-resources/`
    pub fn compiled_resources(&self) -> PathBuf {
        self.root.join("compiled-resources")
    }

    /// Merged `AndroidManifest.xml`.
    pub fn merged_manifest(&self) -> PathBuf {
        self.root.join("AndroidManifest.xml")
    }

    /// Proguard working directory: `proguard/`
    pub fn proguard(&self) -> PathBuf {
        self.root.join("proguard")
    }

    /// Obfuscated classes produced by proguard.
    pub fn obfuscated_jar(&self) -> PathBuf {
        self.proguard().join("obfuscated.jar")
    }

    /// Generated proguard configuration: `proguard/temp_config.cfg`
    pub fn proguard_config(&self) -> PathBuf {
        self.proguard().join("temp_config.cfg")
    }

    /// Dex output directory: `dex/`
    pub fn dex(&self) -> PathBuf {
        self.root.join("dex")
    }

    /// Per-jar pre-dexed outputs: `predex/`
    pub fn predex(&self) -> PathBuf {
        self.root.join("predex")
    }

    /// Main-dex class list generated for multi-dex builds.
    pub fn main_dex_classes(&self) -> PathBuf {
        self.root.join("mainDexClasses.txt")
    }

    /// NDK output for one ABI: `ndk-libs/<abi>/`
    pub fn ndk_libs(&self, arch: Arch) -> PathBuf {
        self.ndk_libs_root().join(arch.as_str())
    }

    /// Parent of every per-ABI NDK output directory.
    pub fn ndk_libs_root(&self) -> PathBuf {
        self.root.join("ndk-libs")
    }

    /// NDK intermediate objects: `ndk-obj/`
    pub fn ndk_obj(&self) -> PathBuf {
        self.root.join("ndk-obj")
    }

    /// Makefile declaring native dependencies as prebuilt modules.
    pub fn prebuilt_makefile(&self) -> PathBuf {
        self.ndk_obj().join("apkpipe-prebuilts.mk")
    }

    /// Side artifact collecting displaced duplicate resources.
    pub fn duplicate_resources(&self) -> PathBuf {
        self.root
            .join("unpacked-embedded-jars")
            .join("duplicate-resources.jar")
    }

    /// Resource-only package produced by the resource linker: `<name>.ap_`
    pub fn resource_package(&self, final_name: &str) -> PathBuf {
        self.root.join(format!("{final_name}.ap_"))
    }

    /// Final package: `<name>.apk`
    pub fn apk(&self, final_name: &str) -> PathBuf {
        self.root.join(format!("{final_name}.apk"))
    }

    /// Unaligned package written before zipalign: `<name>-unaligned.apk`
    pub fn unaligned_apk(&self, final_name: &str) -> PathBuf {
        self.root.join(format!("{final_name}-unaligned.apk"))
    }

    /// Package contents report: `<name>.manifest.json`
    pub fn package_report(&self, final_name: &str) -> PathBuf {
        self.root.join(format!("{final_name}.manifest.json"))
    }

    /// Logs of failed tool runs: `logs/`
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Log file for a failed run of `tool`.
    pub fn tool_log_path(&self, tool: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.log_dir().join(format!("{tool}-{timestamp}.log"))
    }
}
