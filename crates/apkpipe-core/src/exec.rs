//! Running external tools.
//!
//! Stages never spawn processes directly; they hand a [`ToolInvocation`] to
//! the context's [`CommandRunner`]. [`ProcessRunner`] is the real thing,
//! [`RecordingRunner`] records invocations for dry runs and tests.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::command::ToolInvocation;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::paths::StagingLayout;

/// Captured result of a successful tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// Executes tool invocations.
pub trait CommandRunner: fmt::Debug {
    /// Run `invocation` with `cwd` as working directory.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Launch`] if the program cannot be started,
    /// [`PipelineError::Execution`] if it exits unsuccessfully.
    fn run(&self, invocation: &ToolInvocation, cwd: &Path) -> Result<ToolOutput>;
}

/// Spawns real subprocesses and waits for them.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    layout: Option<StagingLayout>,
}

impl ProcessRunner {
    /// Runner that keeps output only in memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write the output of failed tools below the layout's `logs/`.
    pub fn with_logs(layout: StagingLayout) -> Self {
        Self {
            layout: Some(layout),
        }
    }

    fn write_log(&self, invocation: &ToolInvocation, stdout: &str, stderr: &str) -> Option<PathBuf> {
        let layout = self.layout.as_ref()?;
        let dir = layout.log_dir();
        let path = layout.tool_log_path(&invocation.tool_name());
        let contents = format!("$ {invocation}\n\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}");
        let written = fs::create_dir_all(&dir).and_then(|()| fs::write(&path, contents));
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to write tool log {}: {e}", path.display());
                None
            }
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation, cwd: &Path) -> Result<ToolOutput> {
        let tool = invocation.tool_name();
        debug!(cwd = %cwd.display(), "$ {invocation}");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).current_dir(cwd);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        let output = cmd.output().map_err(|source| PipelineError::Launch {
            tool: tool.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines() {
            debug!(target: "apkpipe::tool", "[{tool}] {line}");
        }
        for line in stderr.lines() {
            debug!(target: "apkpipe::tool", "[{tool}] {line}");
        }

        if !output.status.success() {
            if let Some(log) = self.write_log(invocation, &stdout, &stderr) {
                warn!("{tool} failed, full output in {}", log.display());
            }
            return Err(PipelineError::Execution {
                tool,
                code: output.status.code(),
                stdout,
                stderr,
            });
        }
        Ok(ToolOutput { stdout, stderr })
    }
}

type Effect = Box<dyn Fn(&ToolInvocation, &Path) -> Result<()>>;

#[derive(Default)]
struct Recorded {
    invocations: Vec<(ToolInvocation, PathBuf)>,
    effects: Vec<(String, Effect)>,
}

/// Records invocations instead of running them.
///
/// Effects registered with [`RecordingRunner::on`] run for every invocation
/// whose tool name matches, standing in for the files a real tool would have
/// produced. Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    inner: Rc<RefCell<Recorded>>,
}

impl RecordingRunner {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `effect` whenever a tool named `tool` is invoked.
    pub fn on<F>(&self, tool: &str, effect: F) -> &Self
    where
        F: Fn(&ToolInvocation, &Path) -> Result<()> + 'static,
    {
        self.inner
            .borrow_mut()
            .effects
            .push((tool.to_string(), Box::new(effect)));
        self
    }

    /// Everything run so far, in order.
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.inner
            .borrow()
            .invocations
            .iter()
            .map(|(inv, _)| inv.clone())
            .collect()
    }

    /// Invocations of the tool named `tool`.
    pub fn invocations_of(&self, tool: &str) -> Vec<ToolInvocation> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.tool_name() == tool)
            .collect()
    }
}

impl fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("RecordingRunner")
            .field("invocations", &inner.invocations.len())
            .field("effects", &inner.effects.len())
            .finish()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &ToolInvocation, cwd: &Path) -> Result<ToolOutput> {
        debug!("(recorded) $ {invocation}");
        self.inner
            .borrow_mut()
            .invocations
            .push((invocation.clone(), cwd.to_path_buf()));
        let tool = invocation.tool_name();
        let inner = self.inner.borrow();
        for (name, effect) in &inner.effects {
            if *name == tool {
                effect(invocation, cwd)?;
            }
        }
        Ok(ToolOutput::default())
    }
}

/// Run `invocation`, then check that `expected` exists.
///
/// # Errors
///
/// Propagates runner errors; [`PipelineError::MissingOutput`] if the tool
/// succeeded without producing `expected`.
pub fn run_expecting(
    runner: &dyn CommandRunner,
    stage: &str,
    invocation: &ToolInvocation,
    cwd: &Path,
    expected: &Path,
) -> Result<ToolOutput> {
    let output = runner.run(invocation, cwd)?;
    if !expected.exists() {
        return Err(PipelineError::MissingOutput {
            stage: stage.to_string(),
            path: expected.to_path_buf(),
        });
    }
    Ok(output)
}

/// Write `contents` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] on failure.
pub fn write_with_parents(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).io_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, contents).io_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(unix)]
    #[test]
    fn test_process_runner_failure_carries_output() {
        let dir = tempdir().unwrap();
        let runner = ProcessRunner::with_logs(StagingLayout::new(dir.path()));
        let mut inv = ToolInvocation::new("/bin/sh");
        inv.args = vec!["-c".into(), "echo out; echo err >&2; exit 3".into()];

        let err = runner.run(&inv, dir.path()).unwrap_err();
        match err {
            PipelineError::Execution {
                tool,
                code,
                stdout,
                stderr,
            } => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(stdout.trim(), "out");
                assert_eq!(stderr.trim(), "err");
            }
            other => panic!("unexpected error: {other}"),
        }
        let logs: Vec<_> = fs::read_dir(dir.path().join("logs")).unwrap().collect();
        assert_eq!(logs.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_env_and_cwd() {
        let dir = tempdir().unwrap();
        let mut inv = ToolInvocation::new("/bin/sh");
        inv.args = vec!["-c".into(), "printf \"$GREETING\" > out.txt".into()];
        inv.env.push(("GREETING".into(), "hello".into()));

        ProcessRunner::new().run(&inv, dir.path()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_launch_failure() {
        let dir = tempdir().unwrap();
        let inv = ToolInvocation::new(dir.path().join("does-not-exist"));
        let err = ProcessRunner::new().run(&inv, dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Launch { .. }));
    }

    #[test]
    fn test_recording_runner_effects() {
        let dir = tempdir().unwrap();
        let runner = RecordingRunner::new();
        let target = dir.path().join("made.txt");
        let made = target.clone();
        runner.on("aapt", move |_, _| {
            fs::write(&made, b"x").map_err(|e| PipelineError::io("fake", e))
        });

        let inv = ToolInvocation::new("/sdk/aapt");
        run_expecting(&runner, "package", &inv, dir.path(), &target).unwrap();
        assert_eq!(runner.invocations_of("aapt").len(), 1);

        let missing = run_expecting(
            &runner,
            "package",
            &ToolInvocation::new("zipalign"),
            dir.path(),
            &dir.path().join("absent"),
        )
        .unwrap_err();
        assert!(matches!(missing, PipelineError::MissingOutput { .. }));
        assert_eq!(runner.invocations().len(), 2);
    }
}
