//! End-to-end tests driving the `apkpipe` binary.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// A project directory with an `apkpipe.toml` and a fake SDK next to it.
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let sdk = temp_dir.path().join("sdk");
        fs::create_dir_all(sdk.join("platforms/android-34")).unwrap();
        fs::create_dir_all(sdk.join("build-tools/34.0.0")).unwrap();
        fs::create_dir_all(temp_dir.path().join("app")).unwrap();
        let ctx = Self { temp_dir };
        ctx.write_config("");
        ctx
    }

    fn app(&self) -> PathBuf {
        self.temp_dir.path().join("app")
    }

    fn write_config(&self, extra: &str) {
        let sdk = self.temp_dir.path().join("sdk");
        let text = format!(
            "[project]\nname = \"demo\"\n\n[sdk]\npath = \"{}\"\njava = \"/opt/jdk/bin/java\"\n\n{extra}",
            sdk.display()
        );
        fs::write(self.app().join("apkpipe.toml"), text).unwrap();
    }

    fn add_aar(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.app().join(format!("libs/{name}.aar"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("AndroidManifest.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<manifest package=\"com.example\"/>").unwrap();
        for (entry, bytes) in entries {
            zip.start_file(*entry, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn apkpipe(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_apkpipe"))
            .args(args)
            .current_dir(self.app())
            .env_remove("APKPIPE_CONFIG")
            .env("HOME", self.temp_dir.path())
            .env("RUST_LOG", "warn")
            .output()
            .expect("failed to run apkpipe")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.apkpipe(&["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Usage:"));
    assert!(out.contains("build"));
    assert!(out.contains("conflicts"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    assert!(ctx.apkpipe(&["--version"]).status.success());
}

#[test]
fn test_missing_config_is_reported() {
    let ctx = TestContext::new();
    let output = ctx.apkpipe(&["--config", "nope.toml", "clean"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load nope.toml"));
}

#[test]
fn test_unknown_stage_is_rejected() {
    let ctx = TestContext::new();
    let output = ctx.apkpipe(&["build", "--until", "deploy"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown stage 'deploy'"));
}

#[test]
fn test_toolchain_json() {
    let ctx = TestContext::new();
    let output = ctx.apkpipe(&["toolchain", "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["platform"], "android-34");
    assert_eq!(value["api_level"], 34);
    assert_eq!(value["dialect"], "legacy");
    assert_eq!(value["java"], "/opt/jdk/bin/java");
}

#[test]
fn test_unpack_and_clean() {
    let ctx = TestContext::new();
    let aar = ctx.add_aar("widgets", &[("res/values/strings.xml", b"<resources/>".as_slice())]);
    ctx.write_config(&format!(
        "[[dependency]]\ncoordinate = \"com.example:widgets:1.0\"\ntype = \"aar\"\nfile = \"{}\"\n",
        aar.display()
    ));

    let output = ctx.apkpipe(&["unpack"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("com.example:widgets:1.0"));
    assert!(out.contains("1 extracted, 0 up to date"));
    let staged = ctx.app().join("target/unpacked-libs");
    assert!(staged.is_dir());

    let again = stdout(&ctx.apkpipe(&["unpack"]));
    assert!(again.contains("0 extracted, 1 up to date"));

    let output = ctx.apkpipe(&["clean"]);
    assert!(output.status.success());
    assert!(!ctx.app().join("target").exists());
    assert!(stdout(&ctx.apkpipe(&["clean"])).contains("Nothing to clean."));
}

#[test]
fn test_conflicts_lists_winner_first() {
    let ctx = TestContext::new();
    let strings = ctx.app().join("res/values/strings.xml");
    fs::create_dir_all(strings.parent().unwrap()).unwrap();
    fs::write(&strings, "<resources/>").unwrap();
    let aar = ctx.add_aar("widgets", &[("res/values/strings.xml", b"<resources/>".as_slice())]);
    ctx.write_config(&format!(
        "[[dependency]]\ncoordinate = \"com.example:widgets:1.0\"\ntype = \"aar\"\nfile = \"{}\"\n",
        aar.display()
    ));

    let output = ctx.apkpipe(&["conflicts"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("res/values/strings.xml\n  * project\n    com.example:widgets:1.0\n"));
    assert!(out.contains("1 conflicting path(s)"));
}

#[test]
fn test_completions() {
    let ctx = TestContext::new();
    let output = ctx.apkpipe(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("apkpipe"));
}
