//! prepare-package: convert class files to `classes*.dex`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Stage, StageOutcome, packaged_class_jars, provided_jars};
use crate::command::{D8CommandBuilder, DexCommandBuilder, DexCompiler, MainDexListCommandBuilder};
use crate::config::DexConfig;
use crate::conflict::sanitize_identity;
use crate::context::BuildContext;
use crate::error::{IoResultExt, Result};
use crate::exec::run_expecting;

/// Fourth phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct DexStage;

impl Stage for DexStage {
    fn name(&self) -> &'static str {
        "prepare-package"
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<StageOutcome> {
        let cfg = ctx.config.dex.clone();
        let dex_dir = ctx.layout.dex();
        if dex_dir.exists() {
            fs::remove_dir_all(&dex_dir)
                .io_context(|| format!("Failed to clear {}", dex_dir.display()))?;
        }
        fs::create_dir_all(&dex_dir)
            .io_context(|| format!("Failed to create {}", dex_dir.display()))?;

        let inputs = self.inputs(ctx, &cfg)?;
        if inputs.is_empty() {
            return Ok(StageOutcome::Skipped("no classes to dex".into()));
        }
        debug!("dexing {} input(s)", inputs.len());

        let invocation = match cfg.compiler {
            DexCompiler::Dx => {
                let mut main_dex_list = cfg.main_dex_list.clone();
                let mut minimal = cfg.minimal_main_dex;
                if cfg.multi_dex && main_dex_list.is_none() {
                    main_dex_list = Some(self.generate_main_dex_list(ctx, &inputs)?);
                    minimal = true;
                }
                let output = if cfg.multi_dex {
                    dex_dir.clone()
                } else {
                    dex_dir.join("classes.dex")
                };
                dx_builder(ctx, &cfg)
                    .multi_dex(cfg.multi_dex)
                    .main_dex_list(main_dex_list.as_deref())
                    .minimal_main_dex(minimal)
                    .output(&output)
                    .inputs(&inputs)
                    .build()
            }
            DexCompiler::D8 => D8CommandBuilder::new(
                &ctx.toolchain.java,
                &cfg.jvm_args,
                &ctx.toolchain.sdk.d8_jar(),
            )
            .intermediate(cfg.intermediate)
            .main_dex_list(cfg.main_dex_list.as_deref())
            .extra_args(&cfg.extra_args)
            .release(cfg.release)
            .min_api(cfg.min_api.or_else(|| ctx.toolchain.sdk.api_level()))
            .output(&dex_dir)
            .platform_jar(&ctx.toolchain.sdk.android_jar())
            .classpath(&provided_jars(ctx))
            .inputs(&inputs)
            .build(),
        };

        run_expecting(
            ctx.runner.as_ref(),
            self.name(),
            &invocation,
            &ctx.project_dir(),
            &dex_dir.join("classes.dex"),
        )?;
        info!(compiler = cfg.compiler.as_str(), "dex files written to {}", dex_dir.display());
        ctx.state.dex_dir = Some(dex_dir);
        Ok(StageOutcome::Completed)
    }
}

impl DexStage {
    /// The obfuscated jar when proguard ran, otherwise the project classes
    /// followed by every packaged dependency jar (predexed when enabled).
    fn inputs(&self, ctx: &BuildContext, cfg: &DexConfig) -> Result<Vec<PathBuf>> {
        if let Some(jar) = &ctx.state.obfuscated_jar {
            return Ok(vec![jar.clone()]);
        }
        let mut inputs = Vec::new();
        if ctx.config.project.classes_dir.is_dir() {
            inputs.push(ctx.config.project.classes_dir.clone());
        }
        let predex = cfg.predex && cfg.compiler == DexCompiler::Dx;
        for jar in packaged_class_jars(ctx, &cfg.filter)? {
            if predex {
                let out = ctx
                    .layout
                    .predex()
                    .join(format!("{}.jar", sanitize_identity(&jar.identity)));
                self.predex(ctx, cfg, &jar.path, &out)?;
                inputs.push(out);
            } else {
                inputs.push(jar.path);
            }
        }
        Ok(inputs)
    }

    /// Dex one dependency jar on its own, unless `out` is already newer.
    fn predex(&self, ctx: &BuildContext, cfg: &DexConfig, jar: &Path, out: &Path) -> Result<()> {
        if is_up_to_date(out, jar) {
            debug!("predexed {} is up to date", out.display());
            return Ok(());
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let inv = dx_builder(ctx, cfg)
            .output(out)
            .inputs(&[jar.to_path_buf()])
            .build();
        run_expecting(ctx.runner.as_ref(), self.name(), &inv, &ctx.project_dir(), out)?;
        Ok(())
    }

    fn generate_main_dex_list(&self, ctx: &BuildContext, inputs: &[PathBuf]) -> Result<PathBuf> {
        let list = ctx.layout.main_dex_classes();
        let inv = MainDexListCommandBuilder::new(ctx.toolchain.sdk.main_dex_classes())
            .output(&list)
            .inputs(inputs)
            .build();
        run_expecting(ctx.runner.as_ref(), self.name(), &inv, &ctx.project_dir(), &list)?;
        debug!("generated main dex list {}", list.display());
        Ok(list)
    }
}

fn dx_builder(ctx: &BuildContext, cfg: &DexConfig) -> DexCommandBuilder {
    DexCommandBuilder::new(&ctx.toolchain.java, &cfg.jvm_args, &ctx.toolchain.sdk.dx_jar())
        .optimize(cfg.optimize)
        .core_library(cfg.core_library)
        .incremental(cfg.incremental)
        .no_locals(cfg.no_locals)
        .force_jumbo(cfg.force_jumbo)
        .extra_args(&cfg.extra_args)
}

fn is_up_to_date(output: &Path, input: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(output), modified(input)) {
        (Some(out), Some(src)) => out >= src,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ToolInvocation;
    use crate::error::PipelineError;
    use crate::testutil::{TestProject, bump_mtime, flag_value, write_file};

    /// Writes whatever dx or d8 was asked to produce.
    fn fake_dexer(inv: &ToolInvocation, _cwd: &Path) -> Result<()> {
        let output = inv
            .args
            .iter()
            .find_map(|a| a.strip_prefix("--output="))
            .or_else(|| flag_value(inv, "--output"))
            .unwrap();
        let output = Path::new(output);
        if output.extension().is_some_and(|e| e == "dex" || e == "jar") {
            write_file(output, b"dex\n035");
        } else {
            write_file(&output.join("classes.dex"), b"dex\n035");
        }
        Ok(())
    }

    fn project_with_classes() -> TestProject {
        let project = TestProject::new();
        write_file(&project.root().join("target/classes/com/example/Main.class"), b"");
        project
    }

    #[test]
    fn test_single_dex_with_dependency_jar() {
        let project = project_with_classes();
        let gson = project.add_jar("gson", &[("com/google/gson/Gson.class", b"".as_slice())]);
        let (mut ctx, runner) = project.context();
        runner.on("java", fake_dexer);

        DexStage.run(&mut ctx).unwrap();

        let calls = runner.invocations_of("java");
        assert_eq!(calls.len(), 1);
        let args = &calls[0].args;
        assert_eq!(args[0], "-Xmx1024M");
        assert_eq!(args[1], "-jar");
        assert_eq!(args[3], "--dex");
        assert_eq!(
            args[args.len() - 3],
            format!("--output={}", ctx.layout.dex().join("classes.dex").display())
        );
        assert_eq!(
            args[args.len() - 2],
            project.root().join("target/classes").display().to_string()
        );
        assert_eq!(args[args.len() - 1], gson.display().to_string());
        assert_eq!(ctx.state.dex_dir, Some(ctx.layout.dex()));
    }

    #[test]
    fn test_obfuscated_jar_replaces_inputs() {
        let project = project_with_classes();
        project.add_jar("gson", &[("com/google/gson/Gson.class", b"".as_slice())]);
        let (mut ctx, runner) = project.context();
        runner.on("java", fake_dexer);
        ctx.state.obfuscated_jar = Some(ctx.layout.obfuscated_jar());

        DexStage.run(&mut ctx).unwrap();

        let calls = runner.invocations_of("java");
        assert_eq!(
            calls[0].args.last().unwrap(),
            &ctx.layout.obfuscated_jar().display().to_string()
        );
    }

    #[test]
    fn test_multi_dex_generates_main_dex_list() {
        let project = project_with_classes();
        let (mut ctx, runner) = project.context_with(project.config("[dex]\nmulti_dex = true\n"));
        runner.on("java", fake_dexer);
        runner.on("mainDexClasses", |inv, _| {
            write_file(Path::new(flag_value(inv, "--output").unwrap()), b"com/example/Main.class\n");
            Ok(())
        });

        DexStage.run(&mut ctx).unwrap();

        assert_eq!(runner.invocations_of("mainDexClasses").len(), 1);
        let args = &runner.invocations_of("java")[0].args;
        assert!(args.contains(&"--multi-dex".to_string()));
        assert!(args.contains(&format!(
            "--main-dex-list={}",
            ctx.layout.main_dex_classes().display()
        )));
        assert!(args.contains(&"--minimal-main-dex".to_string()));
        assert!(args.contains(&format!("--output={}", ctx.layout.dex().display())));
    }

    #[test]
    fn test_d8_arguments() {
        let project = project_with_classes();
        let (mut ctx, runner) = project.context_with(
            project.config("[dex]\ncompiler = \"d8\"\nrelease = true\n"),
        );
        runner.on("java", fake_dexer);

        DexStage.run(&mut ctx).unwrap();

        let args = &runner.invocations_of("java")[0].args;
        assert_eq!(args[2], ctx.toolchain.sdk.d8_jar().display().to_string());
        assert!(args.contains(&"--release".to_string()));
        let min_api = args.iter().position(|a| a == "--min-api").unwrap();
        assert_eq!(args[min_api + 1], "34");
        assert_eq!(flag_value(&runner.invocations_of("java")[0], "--lib"), Some(
            ctx.toolchain.sdk.android_jar().display().to_string().as_str()
        ));
    }

    #[test]
    fn test_predex_reuses_fresh_output() {
        let project = project_with_classes();
        let gson = project.add_jar("gson", &[("com/google/gson/Gson.class", b"".as_slice())]);
        let (mut ctx, runner) = project.context_with(project.config("[dex]\npredex = true\n"));
        runner.on("java", fake_dexer);

        DexStage.run(&mut ctx).unwrap();
        assert_eq!(runner.invocations_of("java").len(), 2);

        let predexed = ctx.layout.predex().join("com.example_gson_1.0.jar");
        assert!(predexed.is_file());
        bump_mtime(&predexed, 60);
        DexStage.run(&mut ctx).unwrap();
        assert_eq!(runner.invocations_of("java").len(), 3);
        let last = runner.invocations_of("java").pop().unwrap();
        assert_eq!(last.args.last().unwrap(), &predexed.display().to_string());
        assert!(!last.args.contains(&gson.display().to_string()));
    }

    #[test]
    fn test_missing_classes_dex_fails() {
        let project = project_with_classes();
        let (mut ctx, _runner) = project.context();
        let err = DexStage.run(&mut ctx).unwrap_err();
        assert!(matches!(err, PipelineError::MissingOutput { .. }));
    }

    #[test]
    fn test_nothing_to_dex_is_skipped() {
        let project = TestProject::new();
        let (mut ctx, runner) = project.context();
        assert!(matches!(DexStage.run(&mut ctx).unwrap(), StageOutcome::Skipped(_)));
        assert!(runner.invocations().is_empty());
    }
}
