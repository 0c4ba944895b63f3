//! Unpack command

use std::path::Path;

use anyhow::Result;
use apkpipe_core::StagingLayout;
use apkpipe_core::unpack::{Unpacker, android_libraries};

/// Stage every Android library and print where it went.
pub fn unpack(config: &Path) -> Result<()> {
    let config = crate::load_config(config)?;
    let deps = android_libraries(&config.dependencies, &config.generate_sources.filter)?;
    if deps.is_empty() {
        println!("No Android library dependencies.");
        return Ok(());
    }

    let mut unpacker = Unpacker::new(StagingLayout::new(&config.project.build_dir));
    for dep in deps {
        let unpacked = unpacker.unpack(dep)?;
        println!("{}  {}", dep.coordinate, unpacked.root.display());
    }
    let stats = unpacker.stats();
    println!(
        "{} extracted, {} up to date",
        stats.extractions, stats.disk_hits
    );
    Ok(())
}
