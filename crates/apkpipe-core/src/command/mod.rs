//! Argument-list builders for every external tool.
//!
//! Builders are append-only: each call appends its arguments immediately, so
//! the argument list follows the call order and nothing is reordered or
//! deduplicated. Callers call methods in the order the tool expects. Existence
//! checks on optional directories happen when the directory is added.
//!
//! `jarsigner` and `zipalign` close with positional operands (alias, alignment
//! and file pair) that `build()` places last; `ndk-build` and ProGuard gather
//! values into make variables and a configuration file that are rendered
//! once. `build()` never fails and never runs anything; execution lives in
//! [`crate::exec`].

pub mod aapt;
pub mod aidl;
pub mod dex;
pub mod ndk;
pub mod proguard;
pub mod sign;

use std::fmt;
use std::path::{Path, PathBuf};

pub use aapt::{Aapt2CompileCommandBuilder, AaptPackageCommandBuilder};
pub use aidl::AidlCommandBuilder;
pub use dex::{D8CommandBuilder, DexCommandBuilder, DexCompiler, MainDexListCommandBuilder};
pub use ndk::{NdkBuildCommandBuilder, PrebuiltLibrary};
pub use proguard::{ProguardCommandBuilder, ProguardInput};
pub use sign::{JarsignerCommandBuilder, ZipalignCommandBuilder};

/// Separator between entries of a search-path argument.
#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
/// Separator between entries of a search-path argument.
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Environment overrides, in order.
    pub env: Vec<(String, String)>,
}

impl ToolInvocation {
    /// Invocation with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Short program name for messages.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map_or_else(|| self.program.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    pub(crate) fn arg(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    pub(crate) fn path_arg(&mut self, path: &Path) {
        self.args.push(path.display().to_string());
    }

    pub(crate) fn flag_path(&mut self, flag: &str, path: &Path) {
        self.arg(flag);
        self.path_arg(path);
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Resource tool generation.
///
/// `Legacy` drives `aapt` with a single `package` step; `Modern` drives
/// `aapt2` with separate `compile` and `link` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolDialect {
    /// `aapt`
    #[default]
    Legacy,
    /// `aapt2`
    Modern,
}

impl ToolDialect {
    /// Pick the dialect supported by a build-tools directory: `Modern` when it
    /// ships `aapt2`.
    pub fn probe(build_tools: &Path) -> Self {
        if build_tools.join(Self::Modern.executable()).is_file() {
            Self::Modern
        } else {
            Self::Legacy
        }
    }

    /// File name of the resource tool.
    pub fn executable(self) -> &'static str {
        match (self, cfg!(windows)) {
            (Self::Legacy, false) => "aapt",
            (Self::Modern, false) => "aapt2",
            (Self::Legacy, true) => "aapt.exe",
            (Self::Modern, true) => "aapt2.exe",
        }
    }

    /// Whether resources must be compiled before linking.
    pub fn has_compile_step(self) -> bool {
        self == Self::Modern
    }
}

/// Prefix JVM options with `-` when the user left it off (`Xmx1g` → `-Xmx1g`).
pub(crate) fn push_jvm_args(inv: &mut ToolInvocation, jvm_args: &[String]) {
    for arg in jvm_args {
        if arg.starts_with('-') {
            inv.arg(arg.clone());
        } else {
            inv.arg(format!("-{arg}"));
        }
    }
}

/// Join paths into one search-path argument.
pub(crate) fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_file;
    use tempfile::tempdir;

    #[test]
    fn test_dialect_probe() {
        let dir = tempdir().unwrap();
        assert_eq!(ToolDialect::probe(dir.path()), ToolDialect::Legacy);

        write_file(&dir.path().join(ToolDialect::Modern.executable()), b"");
        assert_eq!(ToolDialect::probe(dir.path()), ToolDialect::Modern);
    }

    #[test]
    fn test_jvm_args_get_dash() {
        let mut inv = ToolInvocation::new("java");
        push_jvm_args(&mut inv, &["Xmx1g".to_string(), "-Dfoo=bar".to_string()]);
        assert_eq!(inv.args, vec!["-Xmx1g", "-Dfoo=bar"]);
    }

    #[test]
    fn test_display() {
        let mut inv = ToolInvocation::new("/sdk/build-tools/aapt");
        inv.arg("package");
        inv.arg("-f");
        assert_eq!(inv.to_string(), "/sdk/build-tools/aapt package -f");
        assert_eq!(inv.tool_name(), "aapt");
    }
}
