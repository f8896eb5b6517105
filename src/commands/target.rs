use anyhow::Result;
use std::io::Write;

use crate::manifest::Manifest;
use crate::runtime::Runtime;
use crate::settings::{self, TargetOs};

use super::config::{GlobalOptions, resolve_config_dir};

/// `toolchain_targetver <version>`
pub fn target_version<R: Runtime>(
    runtime: &R,
    options: &GlobalOptions,
    version: &str,
    force: bool,
) -> Result<String> {
    let config_dir = resolve_config_dir(runtime, options.config_dir.clone())?;
    settings::set_target_build_version(runtime, &config_dir, version, force)
}

/// `toolchain_targetos <os>...`
pub fn target_os<R: Runtime>(
    runtime: &R,
    options: &GlobalOptions,
    targets: &[String],
) -> Result<Vec<TargetOs>> {
    let config_dir = resolve_config_dir(runtime, options.config_dir.clone())?;
    settings::set_target_os(runtime, &config_dir, targets)
}

/// Prints the manifest as JSON, or one pip requirement per line
pub fn print_manifest<W: Write>(out: &mut W, requirements: bool) -> Result<()> {
    let manifest = Manifest::current()?;
    manifest.validate()?;

    if requirements {
        for dependency in &manifest.dependencies {
            writeln!(out, "{}", dependency.requirement())?;
        }
    } else {
        writeln!(out, "{}", serde_json::to_string_pretty(&manifest)?)?;
    }
    Ok(())
}
