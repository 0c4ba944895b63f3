//! `ndk-build` invocation and the prebuilt-library makefile it includes.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use apkpipe_schema::Arch;

use super::ToolInvocation;

/// Environment variable naming the generated prebuilt makefile.
pub const MAKEFILE_ENV: &str = "APKPIPE_MAKEFILE";
/// Environment variable listing prebuilt static module names.
pub const STATIC_LIBRARIES_ENV: &str = "APKPIPE_LOCAL_STATIC_LIBRARIES";
/// Environment variable listing prebuilt shared module names.
pub const SHARED_LIBRARIES_ENV: &str = "APKPIPE_LOCAL_SHARED_LIBRARIES";

/// A native dependency exposed to `Android.mk` as a prebuilt module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuiltLibrary {
    /// `LOCAL_MODULE` name.
    pub module: String,
    /// Library file.
    pub file: PathBuf,
    /// `true` for `.so`, `false` for `.a`.
    pub shared: bool,
}

impl PrebuiltLibrary {
    /// Derive the module name from the file name: `libfoo.so` becomes `foo`.
    pub fn from_file(file: &Path) -> Self {
        let shared = file.extension().is_some_and(|e| e == "so");
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let module = stem.strip_prefix("lib").unwrap_or(&stem).to_string();
        Self {
            module,
            file: file.to_path_buf(),
            shared,
        }
    }
}

/// Makefile declaring every prebuilt library, for inclusion from `Android.mk`.
pub fn prebuilt_makefile(libraries: &[PrebuiltLibrary]) -> String {
    let mut out = String::new();
    out.push_str("LOCAL_PATH := $(call my-dir)\n");
    for lib in libraries {
        let kind = if lib.shared {
            "PREBUILT_SHARED_LIBRARY"
        } else {
            "PREBUILT_STATIC_LIBRARY"
        };
        let _ = writeln!(out);
        let _ = writeln!(out, "include $(CLEAR_VARS)");
        let _ = writeln!(out, "LOCAL_MODULE := {}", lib.module);
        let _ = writeln!(out, "LOCAL_SRC_FILES := {}", lib.file.display());
        let _ = writeln!(out, "include $({kind})");
    }
    out
}

/// `ndk-build -C <dir> [-f mk] -j N APP_ABI=... NDK_LIBS_OUT=... NDK_OUT=... <target>`
#[derive(Debug, Clone)]
pub struct NdkBuildCommandBuilder {
    program: PathBuf,
    working_dir: PathBuf,
    makefile: Option<PathBuf>,
    jobs: Option<usize>,
    architectures: Vec<Arch>,
    libs_out: Option<PathBuf>,
    obj_out: Option<PathBuf>,
    toolchain: Option<String>,
    extra_args: Vec<String>,
    target: Option<String>,
    prebuilt_makefile: Option<PathBuf>,
    prebuilts: Vec<PrebuiltLibrary>,
}

impl NdkBuildCommandBuilder {
    /// Run `ndk-build` at `program` in `working_dir`.
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            makefile: None,
            jobs: None,
            architectures: Vec::new(),
            libs_out: None,
            obj_out: None,
            toolchain: None,
            extra_args: Vec::new(),
            target: None,
            prebuilt_makefile: None,
            prebuilts: Vec::new(),
        }
    }

    /// Explicit `Android.mk`.
    pub fn makefile(mut self, path: Option<&Path>) -> Self {
        self.makefile = path.map(Path::to_path_buf);
        self
    }

    /// Parallel jobs.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// ABIs to build, in order. Empty means the makefile default.
    pub fn architectures(mut self, archs: &[Arch]) -> Self {
        self.architectures.extend_from_slice(archs);
        self
    }

    /// `NDK_LIBS_OUT`.
    pub fn libs_out(mut self, dir: &Path) -> Self {
        self.libs_out = Some(dir.to_path_buf());
        self
    }

    /// `NDK_OUT`.
    pub fn obj_out(mut self, dir: &Path) -> Self {
        self.obj_out = Some(dir.to_path_buf());
        self
    }

    /// `NDK_TOOLCHAIN`.
    pub fn toolchain(mut self, toolchain: Option<&str>) -> Self {
        self.toolchain = toolchain.filter(|t| !t.trim().is_empty()).map(str::to_string);
        self
    }

    /// Space-separated extra arguments.
    pub fn extra_args(mut self, args: &str) -> Self {
        self.extra_args
            .extend(args.split_whitespace().map(str::to_string));
        self
    }

    /// Make target.
    pub fn target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// Advertise `libraries` through the generated makefile at `path`.
    pub fn prebuilts(mut self, path: &Path, libraries: Vec<PrebuiltLibrary>) -> Self {
        self.prebuilt_makefile = Some(path.to_path_buf());
        self.prebuilts = libraries;
        self
    }

    /// Contents of the prebuilt makefile, if prebuilts were set.
    pub fn prebuilt_makefile(&self) -> Option<(&Path, String)> {
        self.prebuilt_makefile
            .as_deref()
            .map(|path| (path, prebuilt_makefile(&self.prebuilts)))
    }

    /// Emit the invocation.
    pub fn build(&self) -> ToolInvocation {
        let mut inv = ToolInvocation::new(&self.program);
        inv.flag_path("-C", &self.working_dir);
        if let Some(makefile) = &self.makefile {
            inv.flag_path("-f", makefile);
        }
        if let Some(jobs) = self.jobs {
            inv.arg("-j");
            inv.arg(jobs.to_string());
        }
        if !self.architectures.is_empty() {
            let abis = self
                .architectures
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            inv.arg(format!("APP_ABI={abis}"));
        }
        if let Some(dir) = &self.libs_out {
            inv.arg(format!("NDK_LIBS_OUT={}", dir.display()));
        }
        if let Some(dir) = &self.obj_out {
            inv.arg(format!("NDK_OUT={}", dir.display()));
        }
        if let Some(toolchain) = &self.toolchain {
            inv.arg(format!("NDK_TOOLCHAIN={toolchain}"));
        }
        inv.args.extend(self.extra_args.iter().cloned());
        if let Some(target) = &self.target {
            inv.arg(target.clone());
        }

        if let Some(path) = &self.prebuilt_makefile {
            inv.env
                .push((MAKEFILE_ENV.to_string(), path.display().to_string()));
            let modules = |shared: bool| {
                self.prebuilts
                    .iter()
                    .filter(|l| l.shared == shared)
                    .map(|l| l.module.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            inv.env
                .push((STATIC_LIBRARIES_ENV.to_string(), modules(false)));
            inv.env
                .push((SHARED_LIBRARIES_ENV.to_string(), modules(true)));
        }
        inv
    }
}
