use anyhow::{Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};

/// Resolves an Xcode project argument against `base`.
///
/// A path already ending in `.xcodeproj` is used as-is. Otherwise the
/// directory and everything below it is searched, and the first project
/// (in path order) is used. The result is absolute whenever `base` is.
pub fn find_xcodeproj(base: &Path, path: &str) -> Result<PathBuf> {
    let root = base.join(path);
    if path.trim_end_matches(['/', '\\']).ends_with(".xcodeproj") {
        return Ok(root);
    }

    let pattern = Path::new(&glob::Pattern::escape(&root.to_string_lossy()))
        .join("**")
        .join("*.xcodeproj");
    let pattern = pattern.to_string_lossy();
    debug!("Searching for Xcode projects with {}", pattern);

    let mut matches: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| anyhow!("Invalid search path {}: {}", path, e))?
        .filter_map(|entry| entry.ok())
        .collect();
    matches.sort();

    matches
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Unable to find a xcodeproj in {}", path))
}
