//! process-classes: shrink and obfuscate with ProGuard.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::generate_sources::aapt_rules;
use super::{Stage, StageOutcome, packaged_class_jars, provided_jars};
use crate::command::proguard::{
    ANDROID_LIBRARY_EXCLUDED_FILTER, MANIFEST_FILTER, MAVEN_DESCRIPTOR_FILTER,
};
use crate::command::{ProguardCommandBuilder, ProguardInput};
use crate::context::BuildContext;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::exec::{run_expecting, write_with_parents};

/// Kept off the program jars and referenced as a library instead.
const SHIFTED_ARTIFACTS: &[&str] = &["commons-logging:commons-logging"];

/// Third phase. Skipped unless enabled and a rules file exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProguardStage;

impl Stage for ProguardStage {
    fn name(&self) -> &'static str {
        "process-classes"
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<StageOutcome> {
        let cfg = &ctx.config.proguard;
        if cfg.skip {
            return Ok(StageOutcome::Skipped("proguard disabled".into()));
        }
        if !cfg.config.is_file() {
            return Ok(StageOutcome::Skipped(format!(
                "Proguard skipped because the configuration file doesn't exist: {}",
                cfg.config.display()
            )));
        }

        let out_dir = ctx.layout.proguard();
        if out_dir.exists() && !out_dir.is_dir() {
            return Err(PipelineError::config(format!(
                "{} exists and is not a directory",
                out_dir.display()
            )));
        }
        fs::create_dir_all(&out_dir)
            .io_context(|| format!("Failed to create {}", out_dir.display()))?;

        let proguard_jar = cfg
            .proguard_jar
            .clone()
            .unwrap_or_else(|| ctx.toolchain.sdk.proguard_jar());
        let obfuscated = ctx.layout.obfuscated_jar();
        let mut builder = ProguardCommandBuilder::new(
            &ctx.toolchain.java,
            proguard_jar,
            ctx.layout.proguard_config(),
        )
        .jvm_args(&cfg.jvm_args)
        .include(&cfg.config);
        for rules in &cfg.configs {
            builder = builder.include(rules);
        }
        for rules in ctx.state.libraries.iter().filter_map(|l| l.proguard_rules.as_ref()) {
            builder = builder.include(rules);
        }
        let aapt = aapt_rules(ctx);
        if aapt.is_file() {
            builder = builder.include(&aapt);
        }

        if ctx.config.project.classes_dir.is_dir() {
            builder = builder.injar(ProguardInput::new(&ctx.config.project.classes_dir));
        }
        let excludes = input_excludes(cfg);
        let mut libraries = Vec::new();
        for jar in packaged_class_jars(ctx, &cfg.filter)? {
            if SHIFTED_ARTIFACTS.iter().any(|a| jar.identity.starts_with(&format!("{a}:"))) {
                debug!("{} referenced as a library jar", jar.identity);
                libraries.push(ProguardInput::new(jar.path));
            } else {
                builder = builder.injar(ProguardInput::with_excludes(jar.path, excludes.as_slice()));
            }
        }

        if cfg.include_jdk_libs {
            for name in ["jsse.jar", "jce.jar"] {
                if let Some(lib) = jdk_library(&ctx.toolchain.java, name) {
                    builder = builder.libraryjar(ProguardInput::new(lib));
                }
            }
            let runtime = jdk_library(&ctx.toolchain.java, "rt.jar")
                .or_else(|| jdk_library(&ctx.toolchain.java, "classes.jar"));
            if let Some(rt) = runtime {
                builder = builder.libraryjar(ProguardInput::new(rt));
            }
            builder = builder.libraryjar(ProguardInput::with_excludes(
                ctx.toolchain.sdk.android_jar(),
                ANDROID_LIBRARY_EXCLUDED_FILTER,
            ));
        } else {
            builder = builder.libraryjar(ProguardInput::new(ctx.toolchain.sdk.android_jar()));
        }
        for jar in provided_jars(ctx) {
            builder = builder.libraryjar(ProguardInput::new(jar));
        }
        for lib in libraries {
            builder = builder.libraryjar(lib);
        }

        builder = builder
            .outjar(&obfuscated)
            .report_dir(&out_dir)
            .options(&cfg.options);
        write_with_parents(builder.config_file(), &builder.config_text())?;

        run_expecting(
            ctx.runner.as_ref(),
            self.name(),
            &builder.build(),
            &ctx.project_dir(),
            &obfuscated,
        )?;
        info!("obfuscated classes written to {}", obfuscated.display());
        ctx.state.obfuscated_jar = Some(obfuscated);
        Ok(StageOutcome::Completed)
    }
}

fn input_excludes(cfg: &crate::config::ProguardConfig) -> Vec<String> {
    let mut excludes = Vec::new();
    if cfg.filter_manifest {
        excludes.push(MANIFEST_FILTER.to_string());
    }
    if cfg.filter_maven_descriptor {
        excludes.push(MAVEN_DESCRIPTOR_FILTER.to_string());
    }
    if let Some(custom) = &cfg.custom_filter {
        excludes.extend(
            custom
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(|f| f.trim_start_matches('!').to_string()),
        );
    }
    excludes
}

/// A jar from the runtime of the JDK whose launcher is `java`
/// (`<home>/jre/lib` or `<home>/lib`).
fn jdk_library(java: &Path, name: &str) -> Option<PathBuf> {
    let home = java.parent()?.parent()?;
    [home.join("jre").join("lib"), home.join("lib")]
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}
