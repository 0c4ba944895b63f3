//! Android SDK, NDK and JDK discovery.
//!
//! Resolution order for the SDK root: explicit configuration, then
//! `ANDROID_HOME`, then `ANDROID_SDK_ROOT`, then `~/Android/Sdk`.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use dirs::home_dir;
use semver::Version;
use tracing::debug;

use crate::command::ToolDialect;
use crate::error::{IoResultExt, PipelineError, Result};

/// Executable suffix of the host.
const EXE: &str = if cfg!(windows) { ".exe" } else { "" };
/// Script suffix of the host.
const SCRIPT: &str = if cfg!(windows) { ".bat" } else { "" };

/// A resolved Android SDK: one platform and one build-tools revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSdk {
    root: PathBuf,
    platform: String,
    build_tools: String,
}

impl AndroidSdk {
    /// Locate the SDK and pick a platform and build-tools revision.
    ///
    /// `platform` is an API level (`34`) or directory name (`android-34`);
    /// when absent the highest installed platform is used. `build_tools`
    /// defaults to the latest installed revision.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if the SDK, platform or
    /// build-tools directory cannot be found.
    pub fn discover(
        explicit: Option<&Path>,
        platform: Option<&str>,
        build_tools: Option<&str>,
    ) -> Result<Self> {
        let root = sdk_root(explicit, |key| std::env::var(key).ok()).ok_or_else(|| {
            PipelineError::config(
                "No Android SDK found: set [sdk].path, ANDROID_HOME or ANDROID_SDK_ROOT",
            )
        })?;
        Self::at(root, platform, build_tools)
    }

    /// Use the SDK rooted at `root`.
    ///
    /// # Errors
    ///
    /// Same as [`AndroidSdk::discover`].
    pub fn at(root: PathBuf, platform: Option<&str>, build_tools: Option<&str>) -> Result<Self> {
        if !root.is_dir() {
            return Err(PipelineError::config(format!(
                "Android SDK directory does not exist: {}",
                root.display()
            )));
        }

        let platform = match platform {
            Some(p) if p.starts_with("android-") => p.to_string(),
            Some(p) => format!("android-{p}"),
            None => latest_platform(&root.join("platforms"))?,
        };
        if !root.join("platforms").join(&platform).is_dir() {
            return Err(PipelineError::config(format!(
                "Platform {platform} is not installed in {}",
                root.display()
            )));
        }

        let build_tools = match build_tools {
            Some(v) => v.to_string(),
            None => latest_build_tools(&root.join("build-tools"))?,
        };
        if !root.join("build-tools").join(&build_tools).is_dir() {
            return Err(PipelineError::config(format!(
                "Build tools {build_tools} are not installed in {}",
                root.display()
            )));
        }

        debug!(root = %root.display(), %platform, %build_tools, "resolved Android SDK");
        Ok(Self {
            root,
            platform,
            build_tools,
        })
    }

    /// SDK root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Platform directory name, e.g. `android-34`.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// API level of the platform, if numeric.
    pub fn api_level(&self) -> Option<u32> {
        self.platform.strip_prefix("android-")?.parse().ok()
    }

    /// `build-tools/<revision>`
    pub fn build_tools_dir(&self) -> PathBuf {
        self.root.join("build-tools").join(&self.build_tools)
    }

    fn platform_dir(&self) -> PathBuf {
        self.root.join("platforms").join(&self.platform)
    }

    /// Resource tool generation shipped by the selected build tools.
    pub fn dialect(&self) -> ToolDialect {
        ToolDialect::probe(&self.build_tools_dir())
    }

    /// `platforms/<platform>/android.jar`
    pub fn android_jar(&self) -> PathBuf {
        self.platform_dir().join("android.jar")
    }

    /// `platforms/<platform>/framework.aidl`
    pub fn framework_aidl(&self) -> PathBuf {
        self.platform_dir().join("framework.aidl")
    }

    /// Resource tool for `dialect`.
    pub fn resource_tool(&self, dialect: ToolDialect) -> PathBuf {
        self.build_tools_dir().join(dialect.executable())
    }

    /// `aidl`
    pub fn aidl(&self) -> PathBuf {
        self.build_tools_dir().join(format!("aidl{EXE}"))
    }

    /// `zipalign`
    pub fn zipalign(&self) -> PathBuf {
        self.build_tools_dir().join(format!("zipalign{EXE}"))
    }

    /// `lib/dx.jar`
    pub fn dx_jar(&self) -> PathBuf {
        self.build_tools_dir().join("lib").join("dx.jar")
    }

    /// `lib/d8.jar`
    pub fn d8_jar(&self) -> PathBuf {
        self.build_tools_dir().join("lib").join("d8.jar")
    }

    /// `mainDexClasses` helper script.
    pub fn main_dex_classes(&self) -> PathBuf {
        self.build_tools_dir().join(format!("mainDexClasses{SCRIPT}"))
    }

    /// `tools/proguard/lib/proguard.jar`
    pub fn proguard_jar(&self) -> PathBuf {
        self.root
            .join("tools")
            .join("proguard")
            .join("lib")
            .join("proguard.jar")
    }
}

/// A resolved NDK installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidNdk {
    root: PathBuf,
}

impl AndroidNdk {
    /// Locate the NDK from configuration, `ANDROID_NDK_HOME`, or `<sdk>/ndk-bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] when no NDK with an
    /// `ndk-build` script is found.
    pub fn discover(explicit: Option<&Path>, sdk: Option<&AndroidSdk>) -> Result<Self> {
        let candidates = explicit
            .map(Path::to_path_buf)
            .into_iter()
            .chain(std::env::var("ANDROID_NDK_HOME").ok().map(PathBuf::from))
            .chain(sdk.map(|s| s.root().join("ndk-bundle")));
        for root in candidates {
            let ndk = Self { root };
            if ndk.ndk_build().is_file() {
                return Ok(ndk);
            }
        }
        Err(PipelineError::config(
            "No Android NDK found: set [sdk].ndk or ANDROID_NDK_HOME",
        ))
    }

    /// NDK root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `ndk-build` script.
    pub fn ndk_build(&self) -> PathBuf {
        let name = if cfg!(windows) {
            "ndk-build.cmd"
        } else {
            "ndk-build"
        };
        self.root.join(name)
    }
}

/// Locate the `java` launcher: explicit path, `$JAVA_HOME/bin/java`, or `PATH`.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] when no launcher is found.
pub fn find_java(explicit: Option<&Path>) -> Result<PathBuf> {
    find_jdk_tool("java", explicit)
}

/// Locate `jarsigner` next to the JDK.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] when no binary is found.
pub fn find_jarsigner() -> Result<PathBuf> {
    find_jdk_tool("jarsigner", None)
}

fn find_jdk_tool(name: &str, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(java_home) = std::env::var("JAVA_HOME") {
        let candidate = Path::new(&java_home).join("bin").join(format!("{name}{EXE}"));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    which::which(name).map_err(|e| {
        PipelineError::config(format!("Cannot find {name}: set JAVA_HOME or add it to PATH ({e})"))
    })
}

/// The SDK-generated debug keystore directory (`~/.android`).
pub fn android_user_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("ANDROID_USER_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".android"))
}

pub(crate) fn sdk_root<F>(explicit: Option<&Path>, env: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    for key in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        if let Some(val) = env(key).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(val));
        }
    }
    home_dir()
        .map(|h| h.join("Android").join("Sdk"))
        .filter(|p| p.is_dir())
}

fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).io_context(|| format!("reading {}", dir.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.io_context(|| format!("reading {}", dir.display()))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

fn latest_platform(dir: &Path) -> Result<String> {
    subdirectories(dir)?
        .into_iter()
        .filter_map(|name| {
            let level = name.strip_prefix("android-")?.parse::<u32>().ok()?;
            Some((level, name))
        })
        .max_by_key(|(level, _)| *level)
        .map(|(_, name)| name)
        .ok_or_else(|| {
            PipelineError::config(format!("No platforms installed in {}", dir.display()))
        })
}

/// Newest build-tools revision; semantic versions sort numerically, anything
/// else lexically and below them.
fn latest_build_tools(dir: &Path) -> Result<String> {
    subdirectories(dir)?
        .into_iter()
        .max_by(|a, b| compare_revisions(a, b))
        .ok_or_else(|| {
            PipelineError::config(format!("No build tools installed in {}", dir.display()))
        })
}

fn compare_revisions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_file;
    use tempfile::tempdir;

    fn fake_sdk(root: &Path) {
        for level in ["android-28", "android-34", "android-9"] {
            write_file(&root.join("platforms").join(level).join("android.jar"), b"");
        }
        for rev in ["28.0.3", "34.0.0", "9.0.0", "preview"] {
            fs::create_dir_all(root.join("build-tools").join(rev)).unwrap();
        }
    }

    #[test]
    fn test_latest_platform_and_build_tools() {
        let dir = tempdir().unwrap();
        fake_sdk(dir.path());

        let sdk = AndroidSdk::at(dir.path().to_path_buf(), None, None).unwrap();
        assert_eq!(sdk.platform(), "android-34");
        assert_eq!(sdk.api_level(), Some(34));
        assert_eq!(sdk.build_tools_dir(), dir.path().join("build-tools/34.0.0"));
        assert_eq!(
            sdk.android_jar(),
            dir.path().join("platforms/android-34/android.jar")
        );
        assert_eq!(sdk.dx_jar(), dir.path().join("build-tools/34.0.0/lib/dx.jar"));
    }

    #[test]
    fn test_explicit_versions() {
        let dir = tempdir().unwrap();
        fake_sdk(dir.path());

        let sdk = AndroidSdk::at(dir.path().to_path_buf(), Some("28"), Some("28.0.3")).unwrap();
        assert_eq!(sdk.platform(), "android-28");
        assert_eq!(sdk.build_tools_dir(), dir.path().join("build-tools/28.0.3"));

        let err = AndroidSdk::at(dir.path().to_path_buf(), Some("android-99"), None).unwrap_err();
        assert!(err.to_string().contains("android-99"));
    }

    #[test]
    fn test_dialect_follows_build_tools() {
        let dir = tempdir().unwrap();
        fake_sdk(dir.path());
        let sdk = AndroidSdk::at(dir.path().to_path_buf(), None, None).unwrap();
        assert_eq!(sdk.dialect(), ToolDialect::Legacy);

        write_file(
            &sdk.build_tools_dir().join(ToolDialect::Modern.executable()),
            b"",
        );
        assert_eq!(sdk.dialect(), ToolDialect::Modern);
    }

    #[test]
    fn test_sdk_root_precedence() {
        let explicit = Path::new("/opt/sdk");
        assert_eq!(
            sdk_root(Some(explicit), |_| Some("/env".to_string())),
            Some(PathBuf::from("/opt/sdk"))
        );
        assert_eq!(
            sdk_root(None, |k| (k == "ANDROID_SDK_ROOT").then(|| "/root-sdk".to_string())),
            Some(PathBuf::from("/root-sdk"))
        );
        assert_eq!(
            sdk_root(None, |_| Some("/home-sdk".to_string())),
            Some(PathBuf::from("/home-sdk"))
        );
    }

    #[test]
    fn test_revision_order() {
        assert_eq!(compare_revisions("34.0.0", "9.0.0"), Ordering::Greater);
        assert_eq!(compare_revisions("preview", "1.0.0"), Ordering::Less);
        assert_eq!(compare_revisions("b", "a"), Ordering::Greater);
    }

    #[test]
    fn test_ndk_discovery() {
        let dir = tempdir().unwrap();
        let ndk_root = dir.path().join("ndk");
        write_file(&ndk_root.join("ndk-build"), b"#!/bin/sh\n");
        let ndk = AndroidNdk::discover(Some(&ndk_root), None).unwrap();
        assert_eq!(ndk.root(), ndk_root.as_path());
    }
}
