//! Clean command

use std::path::Path;

use anyhow::{Context, Result};

/// Remove the staging tree.
pub fn clean(config: &Path) -> Result<()> {
    let config = crate::load_config(config)?;
    let build_dir = &config.project.build_dir;
    if !build_dir.exists() {
        println!("Nothing to clean.");
        return Ok(());
    }
    std::fs::remove_dir_all(build_dir)
        .with_context(|| format!("Failed to remove {}", build_dir.display()))?;
    println!("Removed {}", build_dir.display());
    Ok(())
}
