//! ProGuard invocation.
//!
//! ProGuard takes most of its input from a configuration file. The builder
//! renders that file as text; the invocation references it with `@file`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::{ToolInvocation, push_jvm_args};

/// Entries stripped from the platform jar when JDK classes are not wanted.
pub const ANDROID_LIBRARY_EXCLUDED_FILTER: &[&str] =
    &["org/xml/**", "org/w3c/**", "java/**", "javax/**"];

/// Jar manifest entry.
pub const MANIFEST_FILTER: &str = "META-INF/MANIFEST.MF";

/// Maven descriptors embedded in jars.
pub const MAVEN_DESCRIPTOR_FILTER: &str = "META-INF/maven/**";

/// A jar or directory with entries to leave out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProguardInput {
    /// Jar or class directory.
    pub path: PathBuf,
    /// Entry filters excluded from this input.
    pub excludes: Vec<String>,
}

impl ProguardInput {
    /// Input with no filters.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            excludes: Vec::new(),
        }
    }

    /// Input excluding `filters`.
    pub fn with_excludes<S: AsRef<str>>(path: impl Into<PathBuf>, filters: &[S]) -> Self {
        Self {
            path: path.into(),
            excludes: filters.iter().map(|f| f.as_ref().to_string()).collect(),
        }
    }

    /// `path` or `path(!a,!b)`.
    pub fn to_arg(&self) -> String {
        if self.excludes.is_empty() {
            return self.path.display().to_string();
        }
        let filters = self
            .excludes
            .iter()
            .map(|f| format!("!{f}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({filters})", self.path.display())
    }
}

/// Renders the configuration file and the `java -jar proguard.jar` call.
#[derive(Debug, Clone)]
pub struct ProguardCommandBuilder {
    java: PathBuf,
    jvm_args: Vec<String>,
    proguard_jar: PathBuf,
    config_file: PathBuf,
    includes: Vec<PathBuf>,
    injars: Vec<ProguardInput>,
    libraryjars: Vec<ProguardInput>,
    outjar: Option<PathBuf>,
    report_dir: Option<PathBuf>,
    options: Vec<String>,
}

impl ProguardCommandBuilder {
    /// Run `proguard_jar` with `java`, reading options from `config_file`.
    pub fn new(
        java: impl Into<PathBuf>,
        proguard_jar: impl Into<PathBuf>,
        config_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            java: java.into(),
            jvm_args: Vec::new(),
            proguard_jar: proguard_jar.into(),
            config_file: config_file.into(),
            includes: Vec::new(),
            injars: Vec::new(),
            libraryjars: Vec::new(),
            outjar: None,
            report_dir: None,
            options: Vec::new(),
        }
    }

    /// JVM options; a missing leading `-` is added.
    pub fn jvm_args(mut self, args: &[String]) -> Self {
        self.jvm_args.extend_from_slice(args);
        self
    }

    /// Include another rules file (`@file`). Order is preserved.
    pub fn include(mut self, rules: &Path) -> Self {
        self.includes.push(rules.to_path_buf());
        self
    }

    /// Program input.
    pub fn injar(mut self, input: ProguardInput) -> Self {
        self.injars.push(input);
        self
    }

    /// Library input: referenced, not processed.
    pub fn libraryjar(mut self, input: ProguardInput) -> Self {
        self.libraryjars.push(input);
        self
    }

    /// Processed output jar.
    pub fn outjar(mut self, jar: &Path) -> Self {
        self.outjar = Some(jar.to_path_buf());
        self
    }

    /// Directory for `dump.txt`, `seeds.txt`, `usage.txt` and `mapping.txt`.
    pub fn report_dir(mut self, dir: &Path) -> Self {
        self.report_dir = Some(dir.to_path_buf());
        self
    }

    /// Raw option lines appended last.
    pub fn options(mut self, options: &[String]) -> Self {
        self.options.extend_from_slice(options);
        self
    }

    /// Contents of the configuration file, one directive per line.
    pub fn config_text(&self) -> String {
        let mut out = String::new();
        for rules in &self.includes {
            let _ = writeln!(out, "@{}", rules.display());
        }
        for input in &self.injars {
            let _ = writeln!(out, "-injars {}", input.to_arg());
        }
        for input in &self.libraryjars {
            let _ = writeln!(out, "-libraryjars {}", input.to_arg());
        }
        if let Some(jar) = &self.outjar {
            let _ = writeln!(out, "-outjars {}", jar.display());
        }
        if let Some(dir) = &self.report_dir {
            let _ = writeln!(out, "-dump {}", dir.join("dump.txt").display());
            let _ = writeln!(out, "-printseeds {}", dir.join("seeds.txt").display());
            let _ = writeln!(out, "-printusage {}", dir.join("usage.txt").display());
            let _ = writeln!(out, "-printmapping {}", dir.join("mapping.txt").display());
        }
        for option in &self.options {
            let _ = writeln!(out, "{option}");
        }
        out
    }

    /// Path the configuration file must be written to.
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Emit the invocation.
    pub fn build(&self) -> ToolInvocation {
        let mut inv = ToolInvocation::new(&self.java);
        push_jvm_args(&mut inv, &self.jvm_args);
        inv.flag_path("-jar", &self.proguard_jar);
        inv.arg(format!("@{}", self.config_file.display()));
        inv
    }
}
