//! Conflicts command

use std::path::{Path, PathBuf};

use anyhow::Result;
use apkpipe_core::StagingLayout;
use apkpipe_core::conflict::{MergeSource, find_conflicts};
use apkpipe_core::unpack::{UnpackedArtifact, Unpacker, android_libraries};

/// List every `res/` and `assets/` path with more than one contributor,
/// winner first.
pub fn conflicts(config: &Path) -> Result<()> {
    let config = crate::load_config(config)?;
    let mut unpacker = Unpacker::new(StagingLayout::new(&config.project.build_dir));
    let libraries = android_libraries(&config.dependencies, &config.generate_sources.filter)?
        .into_iter()
        .map(|dep| unpacker.unpack(dep))
        .collect::<apkpipe_core::Result<Vec<_>>>()?;

    let total = report("res", &config.project.resources, &libraries, |l| l.resources.clone())?
        + report("assets", &config.project.assets, &libraries, |l| l.assets.clone())?;

    if total == 0 {
        println!("No conflicts.");
    } else {
        println!("{total} conflicting path(s); * marks the contribution that is kept");
    }
    Ok(())
}

fn report<F>(prefix: &str, project_dir: &Path, libraries: &[UnpackedArtifact], pick: F) -> Result<usize>
where
    F: Fn(&UnpackedArtifact) -> Option<PathBuf>,
{
    let mut sources = Vec::new();
    if project_dir.is_dir() {
        sources.push(MergeSource::directory("project", project_dir));
    }
    sources.extend(libraries.iter().filter_map(|lib| {
        pick(lib).map(|dir| MergeSource::directory(lib.coordinate.to_string(), dir))
    }));

    let mut count = 0;
    for entry in find_conflicts(&sources)?.conflicts() {
        count += 1;
        println!("{prefix}/{}", entry.path);
        for (i, contributor) in entry.contributors.iter().enumerate() {
            let marker = if i == 0 { '*' } else { ' ' };
            println!("  {marker} {}", contributor.identity);
        }
    }
    Ok(count)
}
