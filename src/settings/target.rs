use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::runtime::Runtime;

/// File holding the persisted build target, inside the config directory
pub const TARGET_FILE_NAME: &str = "buildtarget.json";

/// Operating systems a package build can be requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Host,
    Android,
    Ios,
}

impl TargetOs {
    pub const SUPPORTED: [TargetOs; 3] = [TargetOs::Host, TargetOs::Android, TargetOs::Ios];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetOs::Host => "host",
            TargetOs::Android => "android",
            TargetOs::Ios => "ios",
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetOs {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        TargetOs::SUPPORTED
            .into_iter()
            .find(|os| os.as_str() == lower)
            .ok_or_else(|| TargetError::UnknownTargetOs(s.to_string()))
    }
}

/// Errors from reading or changing the build target.
/// Each maps to a distinct process exit code.
#[derive(Debug, PartialEq, Eq)]
pub enum TargetError {
    InvalidVersion(String),
    VersionAlreadySet(String),
    UnknownTargetOs(String),
    NoTargetOs,
    NotConfigured,
}

impl TargetError {
    pub fn exit_code(&self) -> i32 {
        match self {
            TargetError::VersionAlreadySet(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::InvalidVersion(v) => write!(
                f,
                "Invalid version '{}'. Version string should be like '3.11.8'",
                v
            ),
            TargetError::VersionAlreadySet(v) => write!(
                f,
                "Build target version is already set to {}. Use --force to replace it.",
                v
            ),
            TargetError::UnknownTargetOs(os) => {
                let supported: Vec<&str> = TargetOs::SUPPORTED.iter().map(|t| t.as_str()).collect();
                write!(
                    f,
                    "Unknown target os '{}'. This tool only supports package builds for os type ({})",
                    os,
                    supported.join(", ")
                )
            }
            TargetError::NoTargetOs => write!(f, "At least one target os is required"),
            TargetError::NotConfigured => write!(
                f,
                "Could not find python build target version setting file. \
                 Please run 'toolchain_targetver' and 'toolchain_targetos' first."
            ),
        }
    }
}

impl std::error::Error for TargetError {}

/// Target python version and target operating systems, persisted as JSON
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub target: Vec<TargetOs>,
}

impl BuildTarget {
    pub fn path(config_dir: &Path) -> PathBuf {
        config_dir.join(TARGET_FILE_NAME)
    }

    /// Loads the build target, or an empty one if nothing was saved yet
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, config_dir: &Path) -> Result<Self> {
        let path = Self::path(config_dir);
        if !runtime.exists(&path) {
            debug!("No build target at {:?}", path);
            return Ok(Self::default());
        }
        let content = runtime.read_to_string(&path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse build target file {:?}", path))
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, config_dir: &Path) -> Result<()> {
        runtime
            .create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;
        let json = serde_json::to_string_pretty(self)?;
        runtime.write(&Self::path(config_dir), json.as_bytes())
    }
}

/// Normalises a version argument: `Python3.11.8` and `3.11.8` both yield `3.11.8`.
/// Exactly three numeric components are required.
pub fn parse_version(raw: &str) -> Result<String, TargetError> {
    let lower = raw.trim().to_lowercase();
    let version = lower.strip_prefix("python").unwrap_or(&lower);

    let parts: Vec<&str> = version.split('.').collect();
    let well_formed = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

    if well_formed {
        Ok(version.to_string())
    } else {
        Err(TargetError::InvalidVersion(raw.to_string()))
    }
}

/// Parses target os names, collapsing duplicates and keeping first-seen order
pub fn parse_target_os<S: AsRef<str>>(args: &[S]) -> Result<Vec<TargetOs>, TargetError> {
    if args.is_empty() {
        return Err(TargetError::NoTargetOs);
    }
    let mut targets = Vec::new();
    for arg in args {
        let os = arg.as_ref().parse::<TargetOs>()?;
        if !targets.contains(&os) {
            targets.push(os);
        }
    }
    Ok(targets)
}

/// Stores the target python version. Refuses to replace an existing one unless `force`.
#[tracing::instrument(skip(runtime))]
pub fn set_target_build_version<R: Runtime>(
    runtime: &R,
    config_dir: &Path,
    raw: &str,
    force: bool,
) -> Result<String> {
    let version = parse_version(raw)?;
    let mut target = BuildTarget::load(runtime, config_dir)?;

    if let Some(existing) = &target.version
        && !force
    {
        return Err(TargetError::VersionAlreadySet(existing.clone()).into());
    }

    target.version = Some(version.clone());
    target.save(runtime, config_dir)?;
    info!("Build target version is set to {}", version);
    Ok(version)
}

/// Replaces the list of target operating systems.
#[tracing::instrument(skip(runtime, args))]
pub fn set_target_os<R: Runtime, S: AsRef<str>>(
    runtime: &R,
    config_dir: &Path,
    args: &[S],
) -> Result<Vec<TargetOs>> {
    let targets = parse_target_os(args)?;
    let mut target = BuildTarget::load(runtime, config_dir)?;
    target.target = targets.clone();
    target.save(runtime, config_dir)?;

    let names: Vec<&str> = targets.iter().map(|t| t.as_str()).collect();
    info!("Build target os is set to [{}]", names.join(", "));
    Ok(targets)
}
