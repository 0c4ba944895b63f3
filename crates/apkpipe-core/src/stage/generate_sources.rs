//! generate-sources: unpack libraries, merge manifests, assets and
//! resources, compile AIDL, generate `R` and the symbol table.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use super::{Stage, StageOutcome};
use crate::command::aidl::generated_java_path;
use crate::command::{Aapt2CompileCommandBuilder, AaptPackageCommandBuilder, AidlCommandBuilder, ToolDialect};
use crate::conflict::{Contributor, MergeSource, find_conflicts, write_duplicates};
use crate::context::BuildContext;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::exec::run_expecting;
use crate::symbols::SymbolTable;
use crate::unpack::android_libraries;

/// Identity of the project's own contributions.
pub(crate) const PROJECT: &str = "project";

/// First phase of the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateSourcesStage;

impl Stage for GenerateSourcesStage {
    fn name(&self) -> &'static str {
        "generate-sources"
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<StageOutcome> {
        let manifest = ctx.config.project.manifest.clone();
        if !manifest.is_file() {
            return Err(PipelineError::config(format!(
                "AndroidManifest.xml not found: {}",
                manifest.display()
            )));
        }

        unpack_libraries(ctx)?;
        merge_manifests(ctx, &manifest)?;

        let strict = ctx.config.project.strict;
        let mut displaced = merge_directories(
            &directory_sources(ctx, &ctx.config.project.assets, |l| l.assets.clone()),
            &ctx.layout.combined_assets(),
            strict,
            "assets",
        )?;
        displaced.extend(merge_directories(
            &directory_sources(ctx, &ctx.config.project.resources, |l| l.resources.clone()),
            &ctx.layout.merged_resources(),
            strict,
            "res",
        )?);
        if let Some(side) = write_duplicates(&displaced, &ctx.layout.duplicate_resources())? {
            ctx.reporter.warning(&format!(
                "{} duplicate resource(s) shadowed by higher-precedence sources, kept in {}",
                displaced.len(),
                side.display()
            ));
        }
        ctx.state.displaced = displaced;

        if ctx.config.generate_sources.aidl {
            compile_aidl(ctx)?;
        }
        generate_r(ctx)?;
        Ok(StageOutcome::Completed)
    }
}

fn unpack_libraries(ctx: &mut BuildContext) -> Result<()> {
    let deps: Vec<_> = android_libraries(&ctx.config.dependencies, &ctx.config.generate_sources.filter)?
        .into_iter()
        .cloned()
        .collect();

    ctx.state.libraries.clear();
    for dep in &deps {
        let unpacked = ctx.unpacker.unpack(dep)?;
        debug!("{} staged at {}", dep.coordinate, unpacked.root.display());
        ctx.state.libraries.push(unpacked);
    }
    let stats = ctx.unpacker.stats();
    info!(
        extracted = stats.extractions,
        reused = stats.disk_hits,
        "unpacked {} Android libraries",
        deps.len()
    );
    Ok(())
}

fn merge_manifests(ctx: &mut BuildContext, manifest: &Path) -> Result<()> {
    let libraries: Vec<PathBuf> = ctx
        .state
        .libraries
        .iter()
        .filter(|l| l.kind.is_unpacked())
        .filter_map(|l| l.manifest.clone())
        .collect();
    let out = ctx.layout.merged_manifest();
    let merged = ctx
        .merger
        .merge(ctx.runner.as_ref(), manifest, &libraries, &out)?;
    if merged {
        ctx.reporter
            .info(&format!("Merged {} library manifest(s)", libraries.len()));
    }
    ctx.state.manifest = Some(out);
    Ok(())
}

/// Project directory first, then each Android library's matching directory.
fn directory_sources<F>(ctx: &BuildContext, project_dir: &Path, pick: F) -> Vec<MergeSource>
where
    F: Fn(&crate::unpack::UnpackedArtifact) -> Option<PathBuf>,
{
    let mut sources = Vec::new();
    if project_dir.is_dir() {
        sources.push(MergeSource::directory(PROJECT, project_dir));
    }
    for lib in ctx.state.libraries.iter().filter(|l| l.kind.is_unpacked()) {
        if let Some(dir) = pick(lib) {
            sources.push(MergeSource::directory(lib.coordinate.to_string(), dir));
        }
    }
    sources
}

/// Merge directory sources into `dest` by precedence. Displaced contributions
/// are returned keyed under `prefix/`.
fn merge_directories(
    sources: &[MergeSource],
    dest: &Path,
    strict: bool,
    prefix: &str,
) -> Result<Vec<(String, Contributor)>> {
    if dest.exists() {
        fs::remove_dir_all(dest).io_context(|| format!("Failed to clear {}", dest.display()))?;
    }
    fs::create_dir_all(dest).io_context(|| format!("Failed to create {}", dest.display()))?;

    let report = find_conflicts(sources)?;
    let resolution = report.resolve(strict)?;
    let count = resolution.materialize(dest)?;
    debug!("{count} file(s) merged into {}", dest.display());
    Ok(resolution
        .displaced
        .into_iter()
        .map(|(path, contributor)| (format!("{prefix}/{path}"), contributor))
        .collect())
}

fn compile_aidl(ctx: &BuildContext) -> Result<()> {
    let mut roots: Vec<PathBuf> = ctx
        .config
        .project
        .sources
        .iter()
        .filter(|d| d.is_dir())
        .cloned()
        .collect();
    roots.extend(ctx.state.libraries.iter().filter_map(|l| l.sources.clone()));

    let out_dir = ctx.layout.generated_aidl();
    let mut count = 0;
    for root in &roots {
        let files = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|x| x == "aidl"));
        for file in files {
            let output = generated_java_path(root, file.path(), &out_dir);
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)
                    .io_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let mut builder = AidlCommandBuilder::new(ctx.toolchain.sdk.aidl())
                .framework(&ctx.toolchain.sdk.framework_aidl());
            for dir in &roots {
                builder = builder.import_dir(dir);
            }
            let inv = builder.input(file.path()).output(&output).build();
            run_expecting(ctx.runner.as_ref(), "generate-sources", &inv, &ctx.project_dir(), &output)?;
            count += 1;
        }
    }
    if count > 0 {
        info!("compiled {count} AIDL interface(s)");
    }
    Ok(())
}

/// Compile merged resources for the modern dialect. Returns the compiled
/// archive, or `None` when there is nothing to compile.
pub(crate) fn compile_resources(ctx: &BuildContext) -> Result<Option<PathBuf>> {
    let res = ctx.layout.merged_resources();
    let has_resources = res.is_dir()
        && fs::read_dir(&res)
            .io_context(|| format!("Failed to list {}", res.display()))?
            .next()
            .is_some();
    if ctx.dialect != ToolDialect::Modern || !has_resources {
        return Ok(None);
    }

    let out = ctx.layout.compiled_resources().join("resources.zip");
    fs::create_dir_all(ctx.layout.compiled_resources())
        .io_context(|| format!("Failed to create {}", ctx.layout.compiled_resources().display()))?;
    let inv = Aapt2CompileCommandBuilder::new(ctx.toolchain.sdk.resource_tool(ctx.dialect))
        .output(&out)
        .resource_dir(&res)
        .build();
    run_expecting(ctx.runner.as_ref(), "generate-sources", &inv, &ctx.project_dir(), &out)?;
    Ok(Some(out))
}

/// Resource link/package builder with the options shared by `R` generation
/// and packaging.
pub(crate) fn resource_builder(ctx: &BuildContext, compiled: Option<&Path>) -> AaptPackageCommandBuilder {
    let manifest = ctx
        .state
        .manifest
        .clone()
        .unwrap_or_else(|| ctx.config.project.manifest.clone());
    let cfg = &ctx.config.generate_sources;
    let mut builder = AaptPackageCommandBuilder::new(
        ctx.toolchain.sdk.resource_tool(ctx.dialect),
        ctx.dialect,
    )
    .manifest(&manifest)
    .add_resource_dir(&ctx.layout.merged_resources())
    .auto_add_overlay(true)
    .assets(&ctx.layout.combined_assets())
    .platform_jar(&ctx.toolchain.sdk.android_jar())
    .configurations(cfg.configurations.as_deref())
    .extra_args(&cfg.extra_args);
    if let Some(compiled) = compiled {
        builder = builder.add_compiled_resources(compiled);
    }
    builder
}

fn generate_r(ctx: &mut BuildContext) -> Result<()> {
    let compiled = compile_resources(ctx)?;
    let r_dir = ctx.layout.generated_r();
    fs::create_dir_all(&r_dir).io_context(|| format!("Failed to create {}", r_dir.display()))?;

    let mut builder = resource_builder(ctx, compiled.as_deref())
        .make_package_dirs(true)
        .r_java_dir(&r_dir)
        .custom_package(ctx.config.generate_sources.custom_package.as_deref())
        .symbols_dir(&r_dir)
        .non_final_ids(false);
    if !ctx.config.proguard.skip {
        fs::create_dir_all(ctx.layout.proguard())
            .io_context(|| format!("Failed to create {}", ctx.layout.proguard().display()))?;
        builder = builder.proguard_rules(&aapt_rules(ctx));
    }
    if ctx.dialect == ToolDialect::Modern {
        // aapt2 always links an output package.
        builder = builder.output(&ctx.layout.compiled_resources().join("r-only.ap_"));
    }

    let symbols = ctx.layout.symbol_table();
    run_expecting(
        ctx.runner.as_ref(),
        "generate-sources",
        &builder.build(),
        &ctx.project_dir(),
        &symbols,
    )?;
    let table = SymbolTable::load(&symbols)?;
    info!("generated R with {} symbol(s)", table.len());
    ctx.state.symbols = Some(table);
    Ok(())
}

/// Keep rules emitted by the resource tool.
pub(crate) fn aapt_rules(ctx: &BuildContext) -> PathBuf {
    ctx.layout.proguard().join("aapt_rules.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{TestProject, write_file, write_zip};
    use apkpipe_schema::{Coordinate, DependencyArtifact, PackageType};

    #[test]
    fn test_project_resource_wins_then_first_dependency() {
        let project = TestProject::new();
        write_file(&project.root().join("res/values/strings.xml"), b"project");
        project.add_aar(
            "first",
            &[
                ("res/values/strings.xml", b"first".as_slice()),
                ("res/layout/first.xml", b"layout".as_slice()),
            ],
        );
        project.add_aar(
            "second",
            &[
                ("res/values/strings.xml", b"second".as_slice()),
                ("res/layout/first.xml", b"other layout".as_slice()),
            ],
        );
        let (mut ctx, runner) = project.context();
        runner.on("aapt", TestProject::fake_resource_tool);

        GenerateSourcesStage.run(&mut ctx).unwrap();

        let merged = ctx.layout.merged_resources();
        assert_eq!(fs::read(merged.join("values/strings.xml")).unwrap(), b"project");
        assert_eq!(fs::read(merged.join("layout/first.xml")).unwrap(), b"layout");

        let side = ctx.layout.duplicate_resources();
        let names = crate::archive::entry_names(&side).unwrap();
        assert!(names.contains(&"com.example_first_1.0/res/values/strings.xml".to_string()));
        assert!(names.contains(&"com.example_second_1.0/res/values/strings.xml".to_string()));
        assert!(names.contains(&"com.example_second_1.0/res/layout/first.xml".to_string()));
        assert_eq!(ctx.state.displaced.len(), 3);
    }

    #[test]
    fn test_first_declared_dependency_wins_without_project_file() {
        let project = TestProject::new();
        project.add_aar("first", &[("res/values/strings.xml", b"first".as_slice())]);
        project.add_aar("second", &[("res/values/strings.xml", b"second".as_slice())]);
        let (mut ctx, runner) = project.context();
        runner.on("aapt", TestProject::fake_resource_tool);

        GenerateSourcesStage.run(&mut ctx).unwrap();

        let merged = ctx.layout.merged_resources();
        assert_eq!(fs::read(merged.join("values/strings.xml")).unwrap(), b"first");
        let side = crate::archive::read_entry(
            &ctx.layout.duplicate_resources(),
            "com.example_second_1.0/res/values/strings.xml",
        )
        .unwrap();
        assert_eq!(side, b"second");
    }

    #[test]
    fn test_strict_mode_fails_on_conflict() {
        let project = TestProject::new();
        project.add_aar("first", &[("assets/config.json", b"1".as_slice())]);
        project.add_aar("second", &[("assets/config.json", b"2".as_slice())]);
        let mut config = project.config("");
        config.project.strict = true;
        let (mut ctx, _runner) = project.context_with(config);

        let err = GenerateSourcesStage.run(&mut ctx).unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvedConflicts { .. }));
    }

    #[test]
    fn test_apklib_without_manifest_aborts() {
        let project = TestProject::new();
        let file = project.root().join("libs/broken.apklib");
        write_zip(&file, &[("res/values/strings.xml", b"x".as_slice())]);
        let mut config = project.config("");
        config.dependencies.push(DependencyArtifact::new(
            Coordinate::new("com.example", "broken", "1.0"),
            PackageType::Apklib,
            file,
        ));
        let (mut ctx, runner) = project.context_with(config);

        let err = GenerateSourcesStage.run(&mut ctx).unwrap_err();
        assert!(matches!(err, PipelineError::MissingManifest { .. }));
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn test_missing_project_manifest_is_configuration_error() {
        let project = TestProject::new();
        fs::remove_file(project.root().join("AndroidManifest.xml")).unwrap();
        let (mut ctx, runner) = project.context();
        let err = GenerateSourcesStage.run(&mut ctx).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn test_legacy_r_generation_arguments() {
        let project = TestProject::new();
        write_file(&project.root().join("res/values/strings.xml"), b"<resources/>");
        let (mut ctx, runner) = project.context();
        runner.on("aapt", TestProject::fake_resource_tool);

        GenerateSourcesStage.run(&mut ctx).unwrap();

        let calls = runner.invocations_of("aapt");
        assert_eq!(calls.len(), 1);
        let args = &calls[0].args;
        assert_eq!(args[0], "package");
        assert!(args.contains(&"-m".to_string()));
        let j = args.iter().position(|a| a == "-J").unwrap();
        assert_eq!(args[j + 1], ctx.layout.generated_r().display().to_string());
        let s = args.iter().position(|a| a == "-S").unwrap();
        assert_eq!(args[s + 1], ctx.layout.merged_resources().display().to_string());
        assert!(ctx.state.symbols.as_ref().unwrap().get("string", "app_name").is_some());
        assert_eq!(ctx.state.manifest, Some(ctx.layout.merged_manifest()));
    }

    #[test]
    fn test_modern_dialect_compiles_then_links() {
        let project = TestProject::new();
        project.use_modern_dialect();
        write_file(&project.root().join("res/values/strings.xml"), b"<resources/>");
        let (mut ctx, runner) = project.context();
        assert_eq!(ctx.dialect, ToolDialect::Modern);
        runner.on("aapt2", |inv, _| {
            if inv.args[0] == "compile" {
                let out = &inv.args[inv.args.iter().position(|a| a == "-o").unwrap() + 1];
                write_zip(Path::new(out), &[("values_strings.arsc.flat", b"".as_slice())]);
                Ok(())
            } else {
                TestProject::fake_resource_tool(inv, Path::new("."))
            }
        });

        GenerateSourcesStage.run(&mut ctx).unwrap();

        let calls = runner.invocations_of("aapt2");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[0], "compile");
        assert_eq!(calls[1].args[0], "link");
        assert!(calls[1].args.contains(&"-R".to_string()));
    }

    #[test]
    fn test_aidl_generation() {
        let project = TestProject::new();
        write_file(
            &project.root().join("src/com/example/IRemote.aidl"),
            b"interface IRemote {}",
        );
        let (mut ctx, runner) = project.context();
        runner.on("aapt", TestProject::fake_resource_tool);
        runner.on("aidl", |inv, _| {
            let out = inv.args.last().unwrap();
            write_file(Path::new(out), b"class IRemote {}");
            Ok(())
        });

        GenerateSourcesStage.run(&mut ctx).unwrap();

        let calls = runner.invocations_of("aidl");
        assert_eq!(calls.len(), 1);
        assert!(
            ctx.layout
                .generated_aidl()
                .join("com/example/IRemote.java")
                .is_file()
        );
    }
}
