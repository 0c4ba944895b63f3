//! `aidl` interface compiler.

use std::path::{Path, PathBuf};

use super::ToolInvocation;

/// `aidl -p<framework.aidl> -I<src>... <file.aidl> <out.java>`
#[derive(Debug, Clone)]
pub struct AidlCommandBuilder {
    inv: ToolInvocation,
}

impl AidlCommandBuilder {
    /// Run the `aidl` binary at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            inv: ToolInvocation::new(program),
        }
    }

    /// Platform `framework.aidl` preprocessed file.
    pub fn framework(mut self, path: &Path) -> Self {
        self.inv.arg(format!("-p{}", path.display()));
        self
    }

    /// Search root for imports.
    pub fn import_dir(mut self, dir: &Path) -> Self {
        self.inv.arg(format!("-I{}", dir.display()));
        self
    }

    /// `.aidl` source.
    pub fn input(mut self, path: &Path) -> Self {
        self.inv.path_arg(path);
        self
    }

    /// Generated `.java` file.
    pub fn output(mut self, path: &Path) -> Self {
        self.inv.path_arg(path);
        self
    }

    /// Emit the invocation.
    pub fn build(self) -> ToolInvocation {
        self.inv
    }
}

/// Output path of the interface generated from `source`, found under `source_root`.
///
/// `src/com/example/IFoo.aidl` becomes `<out_dir>/com/example/IFoo.java`.
pub fn generated_java_path(source_root: &Path, source: &Path, out_dir: &Path) -> PathBuf {
    let relative = source.strip_prefix(source_root).unwrap_or(source);
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = relative.parent().unwrap_or_else(|| Path::new(""));
    out_dir.join(parent).join(format!("{stem}.java"))
}
