//! Signing and alignment of the final package.

use std::path::{Path, PathBuf};

use super::ToolInvocation;

/// Password of the SDK-generated debug keystore.
pub const DEBUG_STORE_PASSWORD: &str = "android";

/// Key alias inside the debug keystore.
pub const DEBUG_KEY_ALIAS: &str = "androiddebugkey";

/// `jarsigner [-verbose] -keystore ks -storepass p -keypass k <apk> <alias>`
#[derive(Debug, Clone)]
pub struct JarsignerCommandBuilder {
    program: PathBuf,
    verbose: bool,
    keystore: PathBuf,
    store_password: String,
    key_password: String,
    alias: String,
    archive: Option<PathBuf>,
}

impl JarsignerCommandBuilder {
    /// Sign with `alias` from `keystore`.
    pub fn new(
        program: impl Into<PathBuf>,
        keystore: impl Into<PathBuf>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            verbose: false,
            keystore: keystore.into(),
            store_password: String::new(),
            key_password: String::new(),
            alias: alias.into(),
            archive: None,
        }
    }

    /// The SDK debug keystore under `~/.android`.
    pub fn debug(program: impl Into<PathBuf>, android_home: &Path) -> Self {
        Self::new(program, android_home.join("debug.keystore"), DEBUG_KEY_ALIAS)
            .store_password(DEBUG_STORE_PASSWORD)
            .key_password(DEBUG_STORE_PASSWORD)
    }

    /// Print every processed entry.
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Keystore password.
    pub fn store_password(mut self, password: impl Into<String>) -> Self {
        self.store_password = password.into();
        self
    }

    /// Private key password.
    pub fn key_password(mut self, password: impl Into<String>) -> Self {
        self.key_password = password.into();
        self
    }

    /// Package to sign in place.
    pub fn archive(mut self, apk: &Path) -> Self {
        self.archive = Some(apk.to_path_buf());
        self
    }

    /// Emit the invocation.
    pub fn build(self) -> ToolInvocation {
        let mut inv = ToolInvocation::new(self.program);
        if self.verbose {
            inv.arg("-verbose");
        }
        inv.flag_path("-keystore", &self.keystore);
        inv.arg("-storepass");
        inv.arg(self.store_password);
        inv.arg("-keypass");
        inv.arg(self.key_password);
        if let Some(apk) = &self.archive {
            inv.path_arg(apk);
        }
        inv.arg(self.alias);
        inv
    }
}

/// `zipalign [-v] -f 4 <in> <out>`
#[derive(Debug, Clone)]
pub struct ZipalignCommandBuilder {
    program: PathBuf,
    verbose: bool,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl ZipalignCommandBuilder {
    /// Run the `zipalign` binary at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            verbose: false,
            input: None,
            output: None,
        }
    }

    /// List every aligned entry.
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Unaligned package.
    pub fn input(mut self, path: &Path) -> Self {
        self.input = Some(path.to_path_buf());
        self
    }

    /// Aligned package, overwritten if present.
    pub fn output(mut self, path: &Path) -> Self {
        self.output = Some(path.to_path_buf());
        self
    }

    /// Emit the invocation.
    pub fn build(self) -> ToolInvocation {
        let mut inv = ToolInvocation::new(self.program);
        if self.verbose {
            inv.arg("-v");
        }
        inv.arg("-f");
        inv.arg("4");
        if let Some(input) = &self.input {
            inv.path_arg(input);
        }
        if let Some(output) = &self.output {
            inv.path_arg(output);
        }
        inv
    }
}
