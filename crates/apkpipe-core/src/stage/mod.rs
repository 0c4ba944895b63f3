//! Build phases and the pipeline that runs them in order.
//!
//! Each stage moves `Pending -> Running -> {Succeeded, Skipped, Failed}`.
//! Stages run strictly in order; the first failure aborts the pipeline and
//! leaves the remaining stages `Pending`. Nothing is retried.

mod dex;
mod generate_sources;
mod native;
mod package;
mod proguard;

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use apkpipe_schema::Scope;

pub use dex::DexStage;
pub use generate_sources::GenerateSourcesStage;
pub use native::CompileNativeStage;
pub use package::PackageStage;
pub use proguard::ProguardStage;

use crate::classify::{ArtifactKind, classify};
use crate::context::BuildContext;
use crate::error::{PipelineError, Result};
use crate::filter::ArtifactFilter;

/// Lifecycle of one stage within a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Not started.
    Pending,
    /// In progress.
    Running,
    /// Completed with all declared outputs.
    Succeeded,
    /// Exited early on a skip condition.
    Skipped,
    /// Aborted the build.
    Failed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a stage ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Outputs produced.
    Completed,
    /// Nothing to do, with the reason.
    Skipped(String),
}

/// One build phase.
pub trait Stage: fmt::Debug {
    /// Phase name, e.g. `generate-sources`.
    fn name(&self) -> &'static str;

    /// Run the phase.
    ///
    /// # Errors
    ///
    /// Any error aborts the pipeline.
    fn run(&self, ctx: &mut BuildContext) -> Result<StageOutcome>;
}

/// Ordered stages and their states.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<(Box<dyn Stage>, StageState)>,
}

impl Pipeline {
    /// Run `stages` in the given order.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages: stages
                .into_iter()
                .map(|s| (s, StageState::Pending))
                .collect(),
        }
    }

    /// generate-sources, compile-native, process-classes, prepare-package, package.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(GenerateSourcesStage),
            Box::new(CompileNativeStage),
            Box::new(ProguardStage),
            Box::new(DexStage),
            Box::new(PackageStage),
        ])
    }

    /// The standard pipeline, stopping after the stage named `last`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for an unknown stage name.
    pub fn standard_until(last: &str) -> Result<Self> {
        let mut pipeline = Self::standard();
        let Some(pos) = pipeline.stages.iter().position(|(s, _)| s.name() == last) else {
            let names: Vec<_> = pipeline.stages.iter().map(|(s, _)| s.name()).collect();
            return Err(PipelineError::config(format!(
                "Unknown stage '{last}', expected one of: {}",
                names.join(", ")
            )));
        };
        pipeline.stages.truncate(pos + 1);
        Ok(pipeline)
    }

    /// Stage names and their current states.
    pub fn states(&self) -> Vec<(&'static str, StageState)> {
        self.stages.iter().map(|(s, st)| (s.name(), *st)).collect()
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; later stages stay `Pending`.
    pub fn run(&mut self, ctx: &mut BuildContext) -> Result<()> {
        for (stage, state) in &mut self.stages {
            let name = stage.name();
            *state = StageState::Running;
            ctx.reporter.stage_started(name);
            let started = Instant::now();

            match stage.run(ctx) {
                Ok(StageOutcome::Completed) => {
                    *state = StageState::Succeeded;
                    ctx.reporter
                        .stage_finished(name, started.elapsed().as_secs_f64());
                }
                Ok(StageOutcome::Skipped(reason)) => {
                    *state = StageState::Skipped;
                    ctx.reporter.stage_skipped(name, &reason);
                }
                Err(e) => {
                    *state = StageState::Failed;
                    ctx.reporter.stage_failed(name, &e.to_string());
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// A dependency jar contributing classes, identified by its coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClassJar {
    pub(crate) identity: String,
    pub(crate) path: PathBuf,
}

/// Jars whose classes go into the package, in resolution order: plain jars
/// and the classes jars of unpacked AARs.
///
/// # Errors
///
/// Fails on an invalid filter pattern.
pub(crate) fn packaged_class_jars(ctx: &BuildContext, filter: &ArtifactFilter) -> Result<Vec<ClassJar>> {
    let mut jars = Vec::new();
    for dep in filter.apply(&ctx.config.dependencies)? {
        if !dep.scope.is_packaged() {
            continue;
        }
        let path = match classify(dep) {
            ArtifactKind::JavaArchive => Some(dep.file.clone()),
            ArtifactKind::AndroidArchive => ctx
                .state
                .libraries
                .iter()
                .find(|l| l.coordinate == dep.coordinate)
                .and_then(|l| l.classes_jar.clone()),
            _ => None,
        };
        if let Some(path) = path {
            jars.push(ClassJar {
                identity: dep.coordinate.to_string(),
                path,
            });
        }
    }
    Ok(jars)
}

/// Jars on the compile classpath that the platform supplies at runtime.
pub(crate) fn provided_jars(ctx: &BuildContext) -> Vec<PathBuf> {
    ctx.config
        .dependencies
        .iter()
        .filter(|d| matches!(d.scope, Scope::Provided | Scope::System))
        .filter(|d| classify(d) == ArtifactKind::JavaArchive)
        .map(|d| d.file.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ToolInvocation;
    use crate::exec::RecordingRunner;
    use crate::testutil::{TestProject, write_file};
    use std::fs;
    use std::path::Path;

    #[derive(Debug)]
    struct Fixed(&'static str, fn() -> Result<StageOutcome>);

    impl Stage for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn run(&self, _ctx: &mut BuildContext) -> Result<StageOutcome> {
            (self.1)()
        }
    }

    #[test]
    fn test_failure_aborts_remaining_stages() {
        let project = TestProject::new();
        let (mut ctx, _runner) = project.context();
        let mut pipeline = Pipeline::new(vec![
            Box::new(Fixed("a", || Ok(StageOutcome::Completed))),
            Box::new(Fixed("b", || Ok(StageOutcome::Skipped("nothing".into())))),
            Box::new(Fixed("c", || Err(PipelineError::config("boom")))),
            Box::new(Fixed("d", || Ok(StageOutcome::Completed))),
        ]);

        let err = pipeline.run(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(
            pipeline.states(),
            vec![
                ("a", StageState::Succeeded),
                ("b", StageState::Skipped),
                ("c", StageState::Failed),
                ("d", StageState::Pending),
            ]
        );
    }

    #[test]
    fn test_standard_order() {
        let names: Vec<_> = Pipeline::standard()
            .states()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(
            names,
            vec![
                "generate-sources",
                "compile-native",
                "process-classes",
                "prepare-package",
                "package"
            ]
        );
    }

    #[test]
    fn test_standard_until() {
        let pipeline = Pipeline::standard_until("process-classes").unwrap();
        assert_eq!(pipeline.states().len(), 3);
        assert!(Pipeline::standard_until("deploy").is_err());
    }

    fn fake_tools(runner: &RecordingRunner) {
        runner.on("aapt", TestProject::fake_resource_tool);
        runner.on("java", |inv: &ToolInvocation, _: &Path| {
            let out = inv
                .args
                .iter()
                .find_map(|a| a.strip_prefix("--output="))
                .unwrap_or_default();
            write_file(Path::new(out), b"dex\n035");
            Ok(())
        });
    }

    #[test]
    fn test_rebuild_of_unchanged_project_is_identical() {
        let project = TestProject::new();
        write_file(&project.root().join("res/values/strings.xml"), b"<resources/>");
        write_file(&project.root().join("target/classes/com/example/Main.class"), b"");
        write_file(&project.root().join("target/classes/app.properties"), b"a=1");
        project.add_aar("widgets", &[("res/layout/widget.xml", b"<layout/>".as_slice())]);
        project.add_jar(
            "gson",
            &[
                ("com/google/gson/Gson.class", b"".as_slice()),
                ("gson.properties", b"v=2".as_slice()),
            ],
        );
        let config = || project.config("[package.sign]\nmode = \"none\"\n");

        let (mut first, first_runner) = project.context_with(config());
        fake_tools(&first_runner);
        Pipeline::standard().run(&mut first).unwrap();
        let apk = first.layout.apk("demo");
        let first_bytes = fs::read(&apk).unwrap();

        let (mut second, second_runner) = project.context_with(config());
        fake_tools(&second_runner);
        let mut pipeline = Pipeline::standard();
        pipeline.run(&mut second).unwrap();

        assert!(!first_runner.invocations().is_empty());
        assert_eq!(first_runner.invocations(), second_runner.invocations());
        assert_eq!(fs::read(&apk).unwrap(), first_bytes);
        assert!(
            pipeline
                .states()
                .iter()
                .all(|(_, s)| matches!(s, StageState::Succeeded | StageState::Skipped))
        );
    }
}
