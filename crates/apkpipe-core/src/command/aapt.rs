//! Resource compile and link/package commands.

use std::path::{Path, PathBuf};

use super::{ToolDialect, ToolInvocation};

/// `aapt2 compile` over one resource directory.
///
/// Only the modern dialect has a compile step; `aapt` compiles while
/// packaging.
#[derive(Debug, Clone)]
pub struct Aapt2CompileCommandBuilder {
    inv: ToolInvocation,
}

impl Aapt2CompileCommandBuilder {
    /// Compile using the `aapt2` at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let mut inv = ToolInvocation::new(program);
        inv.arg("compile");
        Self { inv }
    }

    /// Where compiled `.flat` files (or their zip) are written.
    pub fn output(mut self, path: &Path) -> Self {
        self.inv.flag_path("-o", path);
        self
    }

    /// The `res/` directory to compile. Skipped if it does not exist now.
    pub fn resource_dir(mut self, dir: &Path) -> Self {
        if dir.is_dir() {
            self.inv.flag_path("--dir", dir);
        }
        self
    }

    /// Verbose tool output.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.inv.arg("-v");
        }
        self
    }

    /// Skip PNG crunching.
    pub fn no_crunch(mut self, no_crunch: bool) -> Self {
        if no_crunch {
            self.inv.arg("--no-crunch");
        }
        self
    }

    /// Emit the invocation.
    pub fn build(self) -> ToolInvocation {
        self.inv
    }
}

/// Resource link (`aapt2 link`) or package (`aapt package`) command.
///
/// One builder serves both dialects. Every call appends its flag right away,
/// spelled for the dialect; options with no meaning in a dialect append
/// nothing.
#[derive(Debug, Clone)]
pub struct AaptPackageCommandBuilder {
    dialect: ToolDialect,
    inv: ToolInvocation,
}

impl AaptPackageCommandBuilder {
    /// Builder for the resource tool at `program` speaking `dialect`.
    pub fn new(program: impl Into<PathBuf>, dialect: ToolDialect) -> Self {
        let mut inv = ToolInvocation::new(program);
        inv.arg(match dialect {
            ToolDialect::Legacy => "package",
            ToolDialect::Modern => "link",
        });
        Self { dialect, inv }
    }

    fn spelled(&self, legacy: &'static str, modern: &'static str) -> &'static str {
        match self.dialect {
            ToolDialect::Legacy => legacy,
            ToolDialect::Modern => modern,
        }
    }

    fn switch(mut self, on: bool, legacy: Option<&'static str>, modern: Option<&'static str>) -> Self {
        let flag = match self.dialect {
            ToolDialect::Legacy => legacy,
            ToolDialect::Modern => modern,
        };
        if let (true, Some(flag)) = (on, flag) {
            self.inv.arg(flag);
        }
        self
    }

    fn value(mut self, flag: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.inv.arg(flag);
            self.inv.arg(value);
        }
        self
    }

    /// Generate non-final resource ids (library builds).
    pub fn non_final_ids(self, value: bool) -> Self {
        self.switch(value, Some("--non-constant-id"), Some("--non-final-ids"))
    }

    /// Create package directories under the `R.java` output (`aapt` only).
    pub fn make_package_dirs(self, value: bool) -> Self {
        self.switch(value, Some("-m"), None)
    }

    /// Where `R.java` is generated.
    pub fn r_java_dir(mut self, dir: &Path) -> Self {
        let flag = self.spelled("-J", "--java");
        self.inv.flag_path(flag, dir);
        self
    }

    /// Generate `R` into this package instead of the manifest's. Blank values
    /// are ignored.
    pub fn custom_package(self, package: Option<&str>) -> Self {
        self.value("--custom-package", package)
    }

    /// The `AndroidManifest.xml` to link against.
    pub fn manifest(mut self, path: &Path) -> Self {
        let flag = self.spelled("-M", "--manifest");
        self.inv.flag_path(flag, path);
        self
    }

    /// Add a raw `res/` directory, highest precedence first (`aapt` only).
    /// Skipped if the directory does not exist now.
    pub fn add_resource_dir(mut self, dir: &Path) -> Self {
        if self.dialect == ToolDialect::Legacy && dir.is_dir() {
            self.inv.flag_path("-S", dir);
        }
        self
    }

    /// Add a compiled resource set (`aapt2` only). Sets added later
    /// override earlier ones, so add the lowest precedence first.
    pub fn add_compiled_resources(mut self, path: &Path) -> Self {
        if self.dialect == ToolDialect::Modern {
            self.inv.flag_path("-R", path);
        }
        self
    }

    /// Let overlays introduce new resources.
    pub fn auto_add_overlay(self, value: bool) -> Self {
        self.switch(value, Some("--auto-add-overlay"), Some("--auto-add-overlay"))
    }

    /// Assets directory. Skipped if it does not exist now.
    pub fn assets(mut self, dir: &Path) -> Self {
        if dir.is_dir() {
            self.inv.flag_path("-A", dir);
        }
        self
    }

    /// Platform `android.jar`.
    pub fn platform_jar(mut self, jar: &Path) -> Self {
        self.inv.flag_path("-I", jar);
        self
    }

    /// Resource configurations to keep (`-c en,fr`). Blank values are ignored.
    pub fn configurations(self, configs: Option<&str>) -> Self {
        self.value("-c", configs)
    }

    /// Extra arguments passed through verbatim.
    pub fn extra_args(mut self, args: &[String]) -> Self {
        self.inv.args.extend_from_slice(args);
        self
    }

    /// Verbose tool output.
    pub fn verbose(self, value: bool) -> Self {
        self.switch(value, Some("-v"), Some("-v"))
    }

    /// Directory receiving the `R.txt` symbol table.
    pub fn symbols_dir(mut self, dir: &Path) -> Self {
        match self.dialect {
            ToolDialect::Legacy => self.inv.flag_path("--output-text-symbols", dir),
            ToolDialect::Modern => self.inv.flag_path("--output-text-symbols", &dir.join("R.txt")),
        }
        self
    }

    /// Overwrite existing outputs (`aapt` only).
    pub fn force_overwrite(self, value: bool) -> Self {
        self.switch(value, Some("-f"), None)
    }

    /// Skip PNG crunching (`aapt` only; `aapt2` crunches at compile time).
    pub fn no_crunch(self, value: bool) -> Self {
        self.switch(value, Some("--no-crunch"), None)
    }

    /// Resource package to write.
    pub fn output(mut self, path: &Path) -> Self {
        let flag = self.spelled("-F", "-o");
        self.inv.flag_path(flag, path);
        self
    }

    /// Write keep rules for classes referenced from resources.
    pub fn proguard_rules(mut self, path: &Path) -> Self {
        let flag = self.spelled("-G", "--proguard");
        self.inv.flag_path(flag, path);
        self
    }

    /// Rename the manifest package.
    pub fn rename_manifest_package(self, package: Option<&str>) -> Self {
        self.value("--rename-manifest-package", package)
    }

    /// Rename the instrumentation target package.
    pub fn rename_instrumentation_target(self, package: Option<&str>) -> Self {
        self.value("--rename-instrumentation-target-package", package)
    }

    /// Mark the package debuggable.
    pub fn debug_mode(self, value: bool) -> Self {
        self.switch(value, Some("--debug-mode"), Some("--debug-mode"))
    }

    /// Emit the invocation.
    pub fn build(self) -> ToolInvocation {
        self.inv
    }
}
