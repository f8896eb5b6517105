use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use crate::runtime::{ProcessSpec, Runtime};

/// An installed python prefix (`<dist>/python3`) with pip available
pub(crate) struct PythonPrefix {
    pub dist_dir: PathBuf,
    pub python: PathBuf,
}

impl PythonPrefix {
    /// `bin_name` is the interpreter file name inside `<dist>/python3/bin`
    pub fn new(dist_dir: &Path, bin_name: &str) -> Self {
        Self {
            dist_dir: dist_dir.to_path_buf(),
            python: dist_dir.join("python3").join("bin").join(bin_name),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dist_dir.join("python3")
    }

    pub fn wheel_dir(&self) -> PathBuf {
        self.dist_dir.join("wheels")
    }

    pub fn is_installed<R: Runtime>(&self, runtime: &R) -> bool {
        runtime.exists(&self.python)
    }

    fn require<R: Runtime>(&self, runtime: &R, name: &str) -> Result<()> {
        if !self.is_installed(runtime) {
            bail!(
                "{} environment is not initialized yet. Run 'toolchain init' first.",
                name
            );
        }
        Ok(())
    }

    fn interpreter(&self) -> ProcessSpec {
        ProcessSpec::new(self.python.to_string_lossy()).args(["-m", "pip"])
    }

    /// `python -m pip <args>`
    pub fn pip<R: Runtime>(&self, runtime: &R, name: &str, args: &[String]) -> Result<()> {
        self.require(runtime, name)?;
        runtime.run(&self.interpreter().args(args.iter().cloned()))
    }

    /// `python -m pip wheel <args> --wheel-dir <dist>/wheels`
    pub fn build_wheels<R: Runtime>(&self, runtime: &R, name: &str, args: &[String]) -> Result<()> {
        self.require(runtime, name)?;
        if args.is_empty() {
            bail!("Nothing to build. Usage: toolchain build <recipe>...");
        }
        let wheel_dir = self.wheel_dir();
        runtime.create_dir_all(&wheel_dir)?;
        runtime.run(
            &self
                .interpreter()
                .arg("wheel")
                .args(args.iter().cloned())
                .arg("--wheel-dir")
                .arg(wheel_dir.to_string_lossy()),
        )
    }

    /// Removes wheels built for the given recipes, or the whole dist dir without args
    pub fn clean<R: Runtime>(&self, runtime: &R, args: &[String]) -> Result<()> {
        if args.is_empty() {
            if runtime.exists(&self.dist_dir) {
                runtime.remove_dir_all(&self.dist_dir)?;
            }
            return Ok(());
        }

        let wheel_dir = self.wheel_dir();
        if !runtime.exists(&wheel_dir) {
            return Ok(());
        }
        for wheel in runtime.read_dir(&wheel_dir)? {
            let file_name = wheel
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if args
                .iter()
                .any(|recipe| wheel_matches(&file_name, recipe))
            {
                runtime.remove_file(&wheel)?;
            }
        }
        Ok(())
    }
}

/// Wheel files are named `<distribution>-<version>-...whl`, with `-` in names normalised to `_`
fn wheel_matches(file_name: &str, recipe: &str) -> bool {
    let normalised = recipe.to_lowercase().replace('-', "_");
    file_name.ends_with(".whl") && file_name.starts_with(&format!("{}-", normalised))
}
