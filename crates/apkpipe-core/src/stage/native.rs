//! compile-native: run `ndk-build` on the project's `Android.mk`.

use std::fs;

use tracing::{debug, info};

use super::{Stage, StageOutcome};
use crate::classify::{ArtifactKind, classify};
use crate::command::{NdkBuildCommandBuilder, PrebuiltLibrary};
use crate::context::BuildContext;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::exec::{run_expecting, write_with_parents};

/// Second phase; skipped when the project has no `Android.mk`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileNativeStage;

impl Stage for CompileNativeStage {
    fn name(&self) -> &'static str {
        "compile-native"
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<StageOutcome> {
        let native = &ctx.config.native;
        if !native.enabled {
            return Ok(StageOutcome::Skipped("native compilation disabled".into()));
        }
        if !native.makefile.is_file() {
            return Ok(StageOutcome::Skipped(format!(
                "no makefile at {}",
                native.makefile.display()
            )));
        }
        let Some(ndk) = &ctx.toolchain.ndk else {
            return Err(PipelineError::config(format!(
                "{} exists but no Android NDK was found: set [sdk].ndk or ANDROID_NDK_HOME",
                native.makefile.display()
            )));
        };

        let prebuilts: Vec<PrebuiltLibrary> = native
            .filter
            .apply(&ctx.config.dependencies)?
            .into_iter()
            .filter(|d| {
                matches!(
                    classify(d),
                    ArtifactKind::NativeShared(_) | ArtifactKind::NativeStatic(_)
                )
            })
            .map(|d| PrebuiltLibrary::from_file(&d.file))
            .collect();

        let libs_out = ctx.layout.ndk_libs_root();
        fs::create_dir_all(&libs_out)
            .io_context(|| format!("Failed to create {}", libs_out.display()))?;

        let target = native
            .target
            .clone()
            .unwrap_or_else(|| ctx.config.project.name.clone());
        let mut builder = NdkBuildCommandBuilder::new(ndk.ndk_build(), ctx.project_dir())
            .makefile(Some(&native.makefile))
            .jobs(native.jobs.unwrap_or_else(num_cpus::get))
            .architectures(&native.architectures)
            .libs_out(&libs_out)
            .obj_out(&ctx.layout.ndk_obj())
            .toolchain(native.toolchain.as_deref())
            .extra_args(native.extra_args.as_deref().unwrap_or_default())
            .target(&target);
        if !prebuilts.is_empty() {
            debug!("exposing {} native dependencies as prebuilts", prebuilts.len());
            builder = builder.prebuilts(&ctx.layout.prebuilt_makefile(), prebuilts);
        }
        if let Some((path, contents)) = builder.prebuilt_makefile() {
            write_with_parents(path, &contents)?;
        }

        run_expecting(
            ctx.runner.as_ref(),
            self.name(),
            &builder.build(),
            &ctx.project_dir(),
            &libs_out,
        )?;
        info!("native libraries built into {}", libs_out.display());
        Ok(StageOutcome::Completed)
    }
}
