//! Build command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use apkpipe_core::exec::ProcessRunner;
use apkpipe_core::{BuildContext, Pipeline, StageState, StagingLayout, Toolchain, TracingReporter};

/// Run the standard pipeline, optionally stopping after `until`.
pub fn build(config: &Path, until: Option<&str>, strict: bool) -> Result<()> {
    let mut config = crate::load_config(config)?;
    config.project.strict |= strict;
    let mut pipeline = match until {
        Some(last) => Pipeline::standard_until(last)?,
        None => Pipeline::standard(),
    };

    let toolchain = Toolchain::discover(&config).context("Failed to locate the Android toolchain")?;
    let layout = StagingLayout::new(&config.project.build_dir);
    let mut ctx = BuildContext::new(
        config,
        toolchain,
        Box::new(ProcessRunner::with_logs(layout)),
        Arc::new(TracingReporter),
    );

    let result = pipeline.run(&mut ctx);
    for (stage, state) in pipeline.states() {
        if state != StageState::Pending {
            println!("{stage:<18} {state}");
        }
    }
    result?;

    if let Some((apk, manifest)) = &ctx.state.package {
        println!("{} ({} entries)", apk.display(), manifest.len());
    }
    if !ctx.state.displaced.is_empty() {
        println!(
            "{} duplicate(s) kept in {}",
            ctx.state.displaced.len(),
            ctx.layout.duplicate_resources().display()
        );
    }
    Ok(())
}
