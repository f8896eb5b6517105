//! Distribution manifest.
//!
//! Static description of this package: identity, the module tree it ships,
//! the python-side requirements of the delegated platform toolchains, and the
//! command-line entry points with the callables they resolve to.

use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

const ENTRY_POINTS: [&str; 3] = [
    "toolchain=toolchain::commands:run_toolchain",
    "toolchain_targetver=toolchain::settings:set_target_build_version",
    "toolchain_targetos=toolchain::settings:set_target_os",
];

const REQUIREMENTS: [&str; 3] = [
    "git+https://github.com/thisisthepy/toolchain-ios.git@python3.11",
    "setuptools",
    "requests",
];

const PACKAGE_PATTERNS: [&str; 2] = ["toolchain", "toolchain.*"];

/// Callables an entry point may resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTarget {
    RunToolchain,
    SetTargetBuildVersion,
    SetTargetOs,
}

impl EntryTarget {
    fn resolve(module: &str, callable: &str) -> Option<Self> {
        match (module, callable) {
            ("toolchain::commands", "run_toolchain") => Some(EntryTarget::RunToolchain),
            ("toolchain::settings", "set_target_build_version") => {
                Some(EntryTarget::SetTargetBuildVersion)
            }
            ("toolchain::settings", "set_target_os") => Some(EntryTarget::SetTargetOs),
            _ => None,
        }
    }
}

/// A named command, written as `name=module:callable`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    pub name: String,
    pub module: String,
    pub callable: String,
}

impl EntryPoint {
    pub fn target(&self) -> Option<EntryTarget> {
        EntryTarget::resolve(&self.module, &self.callable)
    }
}

impl FromStr for EntryPoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, path) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("Entry point '{}' is missing '='", s))?;
        let (module, callable) = path
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow!("Entry point '{}' is missing ':'", s))?;

        let name = name.trim();
        if name.is_empty() {
            bail!("Entry point '{}' has an empty name", s);
        }
        if module.is_empty() || !module.split("::").all(is_identifier) {
            bail!("Entry point '{}' has an invalid module path", s);
        }
        if !is_identifier(callable) {
            bail!("Entry point '{}' has an invalid callable", s);
        }

        Ok(Self {
            name: name.to_string(),
            module: module.to_string(),
            callable: callable.to_string(),
        })
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.name, self.module, self.callable)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A requirement either from the package index or pinned to a VCS branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Dependency {
    Registry { name: String },
    Vcs { egg: String, url: String, branch: String },
}

impl Dependency {
    pub fn name(&self) -> &str {
        match self {
            Dependency::Registry { name } => name,
            Dependency::Vcs { egg, .. } => egg,
        }
    }

    /// Requirement line understood by pip
    pub fn requirement(&self) -> String {
        match self {
            Dependency::Registry { name } => name.clone(),
            Dependency::Vcs { egg, url, branch } => format!("{} @ git+{}@{}", egg, url, branch),
        }
    }
}

impl FromStr for Dependency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(rest) = s.strip_prefix("git+") else {
            if s.is_empty() || s.contains(char::is_whitespace) {
                bail!("Invalid dependency name '{}'", s);
            }
            return Ok(Dependency::Registry {
                name: s.to_string(),
            });
        };

        let (url, branch) = rest
            .rsplit_once('@')
            .filter(|(url, _)| url.contains("://"))
            .ok_or_else(|| anyhow!("VCS dependency '{}' must be pinned with '@<branch>'", s))?;
        let egg = url
            .rsplit('/')
            .next()
            .map(|last| last.trim_end_matches(".git"))
            .filter(|egg| !egg.is_empty())
            .ok_or_else(|| anyhow!("Cannot derive package name from '{}'", s))?;

        Ok(Dependency::Vcs {
            egg: egg.to_string(),
            url: url.to_string(),
            branch: branch.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub author_email: String,
    pub url: String,
    pub packages: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub entry_points: Vec<EntryPoint>,
}

impl Manifest {
    /// The manifest of this build of the toolchain
    pub fn current() -> Result<Self> {
        Ok(Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: env!("CARGO_PKG_DESCRIPTION").to_string(),
            author: "thisisthepy".to_string(),
            author_email: String::new(),
            url: env!("CARGO_PKG_REPOSITORY").to_string(),
            packages: PACKAGE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            dependencies: REQUIREMENTS
                .iter()
                .map(|r| r.parse())
                .collect::<Result<_>>()?,
            entry_points: ENTRY_POINTS
                .iter()
                .map(|e| e.parse())
                .collect::<Result<_>>()?,
        })
    }

    pub fn entry_point(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|e| e.name == name)
    }

    /// Whether a dotted module name is covered by the package patterns
    pub fn includes_module(&self, module: &str) -> bool {
        self.packages.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(module))
                .unwrap_or(false)
        })
    }

    /// Checks the structural invariants of the manifest
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("Manifest name must not be empty");
        }
        if self.version.is_empty() {
            bail!("Manifest version must not be empty");
        }

        let mut seen = HashSet::new();
        for entry in &self.entry_points {
            if !seen.insert(entry.name.as_str()) {
                bail!("Duplicate entry point '{}'", entry.name);
            }
            if entry.target().is_none() {
                bail!("Entry point '{}' does not resolve to a known callable", entry);
            }
        }

        for pattern in &self.packages {
            glob::Pattern::new(pattern)
                .map_err(|e| anyhow!("Invalid package pattern '{}': {}", pattern, e))?;
        }
        if !self.includes_module(&self.name) {
            bail!("Package patterns do not include the root module '{}'", self.name);
        }
        Ok(())
    }
}
