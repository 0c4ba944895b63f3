//! Dex conversion commands (`dx`, `d8`) and the main-dex-list helper.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ToolInvocation, join_paths, push_jvm_args};
use crate::error::PipelineError;

/// Dex backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DexCompiler {
    /// Legacy `dx`. Used when nothing is configured.
    #[default]
    Dx,
    /// `d8`.
    D8,
}

impl DexCompiler {
    /// Identifier accepted in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dx => "dex",
            Self::D8 => "d8",
        }
    }
}

impl FromStr for DexCompiler {
    type Err = PipelineError;

    /// `dex` (or `dx`) and `d8`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dex" | "dx" => Ok(Self::Dx),
            "d8" => Ok(Self::D8),
            other => Err(PipelineError::config(format!(
                "Unknown dex compiler '{other}': expected 'dex' or 'd8'"
            ))),
        }
    }
}

impl TryFrom<String> for DexCompiler {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DexCompiler> for String {
    fn from(value: DexCompiler) -> Self {
        value.as_str().to_string()
    }
}

/// `java <jvm args> -jar dx.jar --dex ...`
#[derive(Debug, Clone)]
pub struct DexCommandBuilder {
    inv: ToolInvocation,
    multi_dex: bool,
}

impl DexCommandBuilder {
    /// Run `dx_jar` with the `java` launcher and `jvm_args`; a missing
    /// leading `-` on a JVM option is added.
    pub fn new(java: impl Into<PathBuf>, jvm_args: &[String], dx_jar: &Path) -> Self {
        let mut inv = ToolInvocation::new(java);
        push_jvm_args(&mut inv, jvm_args);
        inv.flag_path("-jar", dx_jar);
        inv.arg("--dex");
        Self {
            inv,
            multi_dex: false,
        }
    }

    fn switch(mut self, on: bool, flag: &str) -> Self {
        if on {
            self.inv.arg(flag);
        }
        self
    }

    /// Optimize bytecode (the tool's default). `false` adds `--no-optimize`.
    pub fn optimize(self, value: bool) -> Self {
        self.switch(!value, "--no-optimize")
    }

    /// Allow `java.*` classes.
    pub fn core_library(self, value: bool) -> Self {
        self.switch(value, "--core-library")
    }

    /// Only dex changed classes.
    pub fn incremental(self, value: bool) -> Self {
        self.switch(value, "--incremental")
    }

    /// Drop local variable info.
    pub fn no_locals(self, value: bool) -> Self {
        self.switch(value, "--no-locals")
    }

    /// Always use jumbo string opcodes.
    pub fn force_jumbo(self, value: bool) -> Self {
        self.switch(value, "--force-jumbo")
    }

    /// Emit several dex files when one is not enough.
    pub fn multi_dex(mut self, value: bool) -> Self {
        self.multi_dex |= value;
        self.switch(value, "--multi-dex")
    }

    /// Classes that must stay in the primary dex. Appends nothing unless
    /// multi-dex was enabled earlier.
    pub fn main_dex_list(mut self, path: Option<&Path>) -> Self {
        if let (true, Some(list)) = (self.multi_dex, path) {
            self.inv.arg(format!("--main-dex-list={}", list.display()));
        }
        self
    }

    /// Keep only the main-dex-list classes in the primary dex. Appends
    /// nothing unless multi-dex was enabled earlier.
    pub fn minimal_main_dex(self, value: bool) -> Self {
        let on = value && self.multi_dex;
        self.switch(on, "--minimal-main-dex")
    }

    /// Extra arguments passed through verbatim.
    pub fn extra_args(mut self, args: &[String]) -> Self {
        self.inv.args.extend_from_slice(args);
        self
    }

    /// `classes.dex` file, or directory for multi-dex.
    pub fn output(mut self, path: &Path) -> Self {
        self.inv.arg(format!("--output={}", path.display()));
        self
    }

    /// Class directories and jars to convert.
    pub fn inputs(mut self, inputs: &[PathBuf]) -> Self {
        for input in inputs {
            self.inv.path_arg(input);
        }
        self
    }

    /// Emit the invocation.
    pub fn build(self) -> ToolInvocation {
        self.inv
    }
}

/// `java <jvm args> -jar d8.jar ...`
#[derive(Debug, Clone)]
pub struct D8CommandBuilder {
    inv: ToolInvocation,
}

impl D8CommandBuilder {
    /// Run `d8_jar` with the `java` launcher and `jvm_args`; a missing
    /// leading `-` on a JVM option is added.
    pub fn new(java: impl Into<PathBuf>, jvm_args: &[String], d8_jar: &Path) -> Self {
        let mut inv = ToolInvocation::new(java);
        push_jvm_args(&mut inv, jvm_args);
        inv.flag_path("-jar", d8_jar);
        Self { inv }
    }

    /// Produce intermediate (per-library) output.
    pub fn intermediate(mut self, value: bool) -> Self {
        if value {
            self.inv.arg("--intermediate");
        }
        self
    }

    /// Classes that must stay in the primary dex.
    pub fn main_dex_list(mut self, path: Option<&Path>) -> Self {
        if let Some(list) = path {
            self.inv.flag_path("--main-dex-list", list);
        }
        self
    }

    /// Extra arguments passed through verbatim.
    pub fn extra_args(mut self, args: &[String]) -> Self {
        self.inv.args.extend_from_slice(args);
        self
    }

    /// Release mode (strip debug info).
    pub fn release(mut self, value: bool) -> Self {
        if value {
            self.inv.arg("--release");
        }
        self
    }

    /// Minimum API level.
    pub fn min_api(mut self, level: Option<u32>) -> Self {
        if let Some(level) = level {
            self.inv.arg("--min-api");
            self.inv.arg(level.to_string());
        }
        self
    }

    /// Output directory.
    pub fn output(mut self, dir: &Path) -> Self {
        self.inv.flag_path("--output", dir);
        self
    }

    /// Platform `android.jar` used as library.
    pub fn platform_jar(mut self, jar: &Path) -> Self {
        self.inv.flag_path("--lib", jar);
        self
    }

    /// Compile-only classpath entries.
    pub fn classpath(mut self, entries: &[PathBuf]) -> Self {
        for entry in entries {
            self.inv.flag_path("--classpath", entry);
        }
        self
    }

    /// Class directories and jars to convert.
    pub fn inputs(mut self, inputs: &[PathBuf]) -> Self {
        for input in inputs {
            self.inv.path_arg(input);
        }
        self
    }

    /// Emit the invocation.
    pub fn build(self) -> ToolInvocation {
        self.inv
    }
}

/// `mainDexClasses --output <file> <inputs>` computing the primary-dex class list.
#[derive(Debug, Clone)]
pub struct MainDexListCommandBuilder {
    inv: ToolInvocation,
}

impl MainDexListCommandBuilder {
    /// Run the helper script at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            inv: ToolInvocation::new(program),
        }
    }

    /// Where the class list is written.
    pub fn output(mut self, path: &Path) -> Self {
        self.inv.flag_path("--output", path);
        self
    }

    /// Everything that will be dexed, as one search-path argument.
    pub fn inputs(mut self, inputs: &[PathBuf]) -> Self {
        self.inv.arg(join_paths(inputs));
        self
    }

    /// Emit the invocation.
    pub fn build(self) -> ToolInvocation {
        self.inv
    }
}
