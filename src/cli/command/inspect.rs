use std::path::Path;

use anyhow::{Context, Result};
use era5daily::archive::{ArchiveExtractor, ArchiveLayout, MemberRole};

/// Lists an archive's members with the role each one satisfies.
pub fn inspect(archive: &Path, layout: ArchiveLayout) -> Result<Vec<(String, Option<MemberRole>)>> {
    let extractor = ArchiveExtractor::new(layout);
    let names = extractor
        .list(archive)
        .with_context(|| format!("reading {}", archive.display()))?;

    Ok(names
        .into_iter()
        .map(|name| {
            let role = extractor.layout().role_of(&name);
            (name, role)
        })
        .collect())
}

// -- Tests -------------------------------------------------------------------
