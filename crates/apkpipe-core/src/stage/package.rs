//! package: link the resource package, assemble, sign and align the APK.

use std::path::{Path, PathBuf};

use apkpipe_schema::Arch;
use tracing::{debug, info, warn};

use super::generate_sources::{PROJECT, compile_resources, resource_builder};
use super::{Stage, StageOutcome, packaged_class_jars};
use crate::assemble::{NativeSource, PackageInput, PackageManifest, SigningState, assemble};
use crate::classify::{ArtifactKind, classify};
use crate::command::{JarsignerCommandBuilder, ToolInvocation, ZipalignCommandBuilder};
use crate::config::SignMode;
use crate::conflict::{MergeSource, write_duplicates};
use crate::context::BuildContext;
use crate::error::{PipelineError, Result};
use crate::exec::{run_expecting, write_with_parents};
use crate::sdk::{android_user_home, find_jarsigner};

/// Identity of libraries built by `ndk-build`.
const NDK_BUILD: &str = "ndk-build";

/// Last phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageStage;

impl Stage for PackageStage {
    fn name(&self) -> &'static str {
        "package"
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<StageOutcome> {
        let name = ctx.final_name().to_string();
        let resource_package = self.link_resources(ctx, &name)?;

        let input = self.package_input(ctx, resource_package)?;
        let mut manifest = assemble(&input)?;

        let apk = ctx.layout.apk(&name);
        let written = if ctx.config.package.zipalign {
            ctx.layout.unaligned_apk(&name)
        } else {
            apk.clone()
        };
        manifest.write(&written)?;

        manifest.signing = self.sign(ctx, &written)?;
        if ctx.config.package.zipalign {
            let inv = ZipalignCommandBuilder::new(ctx.toolchain.sdk.zipalign())
                .input(&written)
                .output(&apk)
                .build();
            run_expecting(ctx.runner.as_ref(), self.name(), &inv, &ctx.project_dir(), &apk)?;
            debug!("aligned {}", apk.display());
        }

        let report = ctx.layout.package_report(&name);
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| {
            PipelineError::config(format!("Failed to serialize package report: {e}"))
        })?;
        write_with_parents(&report, &json)?;

        self.record_duplicates(ctx, &manifest)?;
        info!(
            entries = manifest.len(),
            signing = ?manifest.signing,
            "package written to {}",
            apk.display()
        );
        ctx.state.package = Some((apk, manifest));
        Ok(StageOutcome::Completed)
    }
}

impl PackageStage {
    /// Link merged resources, assets and the manifest into `<name>.ap_`.
    fn link_resources(&self, ctx: &BuildContext, name: &str) -> Result<PathBuf> {
        let compiled = compile_resources(ctx)?;
        let out = ctx.layout.resource_package(name);
        let cfg = &ctx.config.package;
        let inv = resource_builder(ctx, compiled.as_deref())
            .force_overwrite(true)
            .debug_mode(cfg.debug)
            .rename_manifest_package(cfg.rename_manifest_package.as_deref())
            .rename_instrumentation_target(cfg.rename_instrumentation_target.as_deref())
            .output(&out)
            .build();
        run_expecting(ctx.runner.as_ref(), self.name(), &inv, &ctx.project_dir(), &out)?;
        Ok(out)
    }

    fn package_input(&self, ctx: &BuildContext, resource_package: PathBuf) -> Result<PackageInput> {
        let cfg = &ctx.config.package;
        let mut jars = Vec::new();
        if ctx.config.project.classes_dir.is_dir() {
            jars.push(MergeSource::directory(PROJECT, &ctx.config.project.classes_dir));
        }
        jars.extend(
            packaged_class_jars(ctx, &cfg.filter)?
                .into_iter()
                .map(|jar| MergeSource::archive(jar.identity, jar.path)),
        );

        Ok(PackageInput {
            resource_package,
            dex_dir: ctx.state.dex_dir.clone(),
            jars,
            natives: native_sources(ctx)?,
            meta_inf: cfg.meta_inf.clone(),
            exclude: cfg.exclude_jar_resources.clone(),
            transformers: cfg.transformers.clone(),
        })
    }

    fn sign(&self, ctx: &BuildContext, apk: &Path) -> Result<SigningState> {
        let sign = &ctx.config.package.sign;
        let (builder, state) = match sign.mode {
            SignMode::None => {
                debug!("leaving {} unsigned", apk.display());
                return Ok(SigningState::Unsigned);
            }
            SignMode::Debug => {
                let home = android_user_home().ok_or_else(|| {
                    PipelineError::config("Cannot locate the debug keystore: set ANDROID_USER_HOME")
                })?;
                (
                    JarsignerCommandBuilder::debug(jarsigner(ctx), &home),
                    SigningState::DebugSigned,
                )
            }
            SignMode::Release => {
                let (Some(keystore), Some(alias)) = (&sign.keystore, &sign.alias) else {
                    return Err(PipelineError::config(
                        "Release signing needs [package.sign] keystore and alias",
                    ));
                };
                let mut builder = JarsignerCommandBuilder::new(jarsigner(ctx), keystore, alias);
                if let Some(password) = &sign.store_password {
                    builder = builder.store_password(password);
                }
                if let Some(password) = sign.key_password.as_ref().or(sign.store_password.as_ref()) {
                    builder = builder.key_password(password);
                }
                (builder, SigningState::ReleaseSigned)
            }
        };
        let inv: ToolInvocation = builder.verbose(sign.verbose).archive(apk).build();
        run_expecting(ctx.runner.as_ref(), self.name(), &inv, &ctx.project_dir(), apk)?;
        Ok(state)
    }

    fn record_duplicates(&self, ctx: &mut BuildContext, manifest: &PackageManifest) -> Result<()> {
        if manifest.displaced().is_empty() {
            return Ok(());
        }
        warn!(
            "{} java resource(s) shadowed by higher-precedence jars",
            manifest.displaced().len()
        );
        ctx.state.displaced.extend_from_slice(manifest.displaced());
        write_duplicates(&ctx.state.displaced, &ctx.layout.duplicate_resources())?;
        Ok(())
    }
}

/// `jarsigner` next to the configured `java`, else from the JDK lookup.
fn jarsigner(ctx: &BuildContext) -> PathBuf {
    let sibling = ctx
        .toolchain
        .java
        .with_file_name(format!("jarsigner{}", std::env::consts::EXE_SUFFIX));
    if sibling.is_file() {
        return sibling;
    }
    find_jarsigner().unwrap_or(sibling)
}

/// Project prebuilts, then `ndk-build` output, then AAR natives, then
/// native dependencies.
fn native_sources(ctx: &BuildContext) -> Result<Vec<NativeSource>> {
    let mut natives = vec![
        NativeSource::Directory {
            identity: PROJECT.to_string(),
            arch: None,
            dir: ctx.config.project.native_libs.clone(),
        },
        NativeSource::Directory {
            identity: NDK_BUILD.to_string(),
            arch: None,
            dir: ctx.layout.ndk_libs_root(),
        },
    ];
    for lib in &ctx.state.libraries {
        for (arch, dir) in &lib.natives {
            natives.push(NativeSource::Directory {
                identity: lib.coordinate.to_string(),
                arch: Some(*arch),
                dir: dir.clone(),
            });
        }
    }
    for dep in ctx.config.package.filter.apply(&ctx.config.dependencies)? {
        let ArtifactKind::NativeShared(arch) = classify(dep) else {
            continue;
        };
        if !dep.scope.is_packaged() {
            continue;
        }
        let file_name = dep
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = if file_name.starts_with("lib") {
            file_name
        } else {
            format!("lib{}.so", dep.coordinate.artifact)
        };
        natives.push(NativeSource::Library {
            identity: dep.coordinate.to_string(),
            arch: arch.unwrap_or(Arch::Armeabi),
            file: dep.file.clone(),
            name,
        });
    }
    Ok(natives)
}
