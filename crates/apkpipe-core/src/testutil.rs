//! Fixture helpers shared by unit tests.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use apkpipe_schema::{Coordinate, DependencyArtifact, PackageType};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::command::ToolInvocation;
use crate::config::PipelineConfig;
use crate::context::{BuildContext, Toolchain};
use crate::error::Result;
use crate::exec::RecordingRunner;
use crate::reporter::NullReporter;
use crate::sdk::{AndroidNdk, AndroidSdk};

/// Write a zip archive with the given entries.
pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Write a file, creating parent directories.
pub(crate) fn write_file(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Move a file's modification time `secs` seconds into the future.
pub(crate) fn bump_mtime(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

/// Argument following `flag`, if present.
pub(crate) fn flag_value<'a>(inv: &'a ToolInvocation, flag: &str) -> Option<&'a str> {
    let pos = inv.args.iter().position(|a| a == flag)?;
    inv.args.get(pos + 1).map(String::as_str)
}

/// A throwaway project with a fake SDK and NDK next to it.
///
/// ```text
/// <tmp>/sdk/platforms/android-34/android.jar
/// <tmp>/sdk/build-tools/34.0.0/{aapt,aidl,zipalign,lib/dx.jar}
/// <tmp>/ndk/ndk-build
/// <tmp>/app/AndroidManifest.xml
/// ```
pub(crate) struct TestProject {
    dir: TempDir,
    dependencies: RefCell<Vec<DependencyArtifact>>,
}

impl TestProject {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sdk = dir.path().join("sdk");
        let platform = sdk.join("platforms/android-34");
        write_zip(
            &platform.join("android.jar"),
            &[("android/app/Activity.class", b"\xca\xfe".as_slice())],
        );
        write_file(&platform.join("framework.aidl"), b"");
        let tools = sdk.join("build-tools/34.0.0");
        for name in ["aapt", "aidl", "zipalign", "mainDexClasses", "lib/dx.jar", "lib/d8.jar"] {
            write_file(&tools.join(name), b"");
        }
        write_file(&sdk.join("tools/proguard/lib/proguard.jar"), b"");
        write_file(&dir.path().join("ndk/ndk-build"), b"");
        write_file(
            &dir.path().join("app/AndroidManifest.xml"),
            b"<manifest package=\"com.example.demo\"/>",
        );
        Self {
            dir,
            dependencies: RefCell::new(Vec::new()),
        }
    }

    /// Project directory.
    pub(crate) fn root(&self) -> PathBuf {
        self.dir.path().join("app")
    }

    pub(crate) fn sdk_root(&self) -> PathBuf {
        self.dir.path().join("sdk")
    }

    /// Ship `aapt2` in the build tools.
    pub(crate) fn use_modern_dialect(&self) {
        write_file(&self.sdk_root().join("build-tools/34.0.0/aapt2"), b"");
    }

    /// Declare a dependency.
    pub(crate) fn add_dependency(&self, dependency: DependencyArtifact) {
        self.dependencies.borrow_mut().push(dependency);
    }

    /// Declare `com.example:<name>:1.0` as an AAR holding `entries` plus a
    /// manifest.
    pub(crate) fn add_aar(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let file = self.root().join(format!("libs/{name}.aar"));
        let mut all = vec![("AndroidManifest.xml", b"<manifest/>".as_slice())];
        all.extend_from_slice(entries);
        write_zip(&file, &all);
        self.add_dependency(DependencyArtifact::new(
            Coordinate::new("com.example", name, "1.0"),
            PackageType::Aar,
            &file,
        ));
        file
    }

    /// Declare `com.example:<name>:1.0` as a jar holding `entries`.
    pub(crate) fn add_jar(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let file = self.root().join(format!("libs/{name}.jar"));
        write_zip(&file, entries);
        self.add_dependency(DependencyArtifact::new(
            Coordinate::new("com.example", name, "1.0"),
            PackageType::Jar,
            &file,
        ));
        file
    }

    /// Configuration for project `demo` plus `extra` TOML and every declared
    /// dependency.
    pub(crate) fn config(&self, extra: &str) -> PipelineConfig {
        let text = format!("[project]\nname = \"demo\"\n{extra}");
        let mut config = PipelineConfig::parse(&text, &self.root()).unwrap();
        config
            .dependencies
            .extend(self.dependencies.borrow().iter().cloned());
        config
    }

    pub(crate) fn context(&self) -> (BuildContext, RecordingRunner) {
        self.context_with(self.config(""))
    }

    pub(crate) fn context_with(&self, config: PipelineConfig) -> (BuildContext, RecordingRunner) {
        let toolchain = Toolchain {
            sdk: AndroidSdk::at(self.sdk_root(), None, None).unwrap(),
            java: PathBuf::from("java"),
            ndk: AndroidNdk::discover(Some(&self.dir.path().join("ndk")), None).ok(),
        };
        let runner = RecordingRunner::new();
        let ctx = BuildContext::new(
            config,
            toolchain,
            Box::new(runner.clone()),
            Arc::new(NullReporter),
        );
        (ctx, runner)
    }

    /// Stand-in for `aapt`/`aapt2 link`: writes the symbol table and the
    /// resource package when asked for them.
    pub(crate) fn fake_resource_tool(inv: &ToolInvocation, _cwd: &Path) -> Result<()> {
        if let Some(symbols) = flag_value(inv, "--output-text-symbols") {
            let path = if symbols.ends_with(".txt") {
                PathBuf::from(symbols)
            } else {
                Path::new(symbols).join("R.txt")
            };
            write_file(
                &path,
                b"int string app_name 0x7f010000\nint layout main 0x7f020000\n",
            );
        }
        let package = flag_value(inv, "-F").or_else(|| flag_value(inv, "-o"));
        if let Some(package) = package {
            write_zip(
                Path::new(package),
                &[
                    ("AndroidManifest.xml", b"<manifest/>".as_slice()),
                    ("resources.arsc", b"arsc".as_slice()),
                    ("res/layout/main.xml", b"<layout/>".as_slice()),
                ],
            );
        }
        Ok(())
    }
}
