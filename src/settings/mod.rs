//! Build target settings.
//!
//! The user picks a target python version and a list of target operating
//! systems once (`toolchain_targetver`, `toolchain_targetos`). Everything the
//! environments need (download URLs, work directories) is derived from that
//! into a [`Settings`] value.

mod target;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

pub use target::{
    BuildTarget, TARGET_FILE_NAME, TargetError, TargetOs, parse_target_os, parse_version,
    set_target_build_version, set_target_os,
};

pub const DEFAULT_PYTHON_URL: &str = "https://www.python.org";
pub const DEFAULT_MSYS2_URL: &str = "https://repo.msys2.org/mingw/mingw64/";

/// Base URLs the environments download from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Urls {
    pub python: String,
    pub msys2: String,
}

impl Default for Urls {
    fn default() -> Self {
        Self {
            python: DEFAULT_PYTHON_URL.to_string(),
            msys2: DEFAULT_MSYS2_URL.to_string(),
        }
    }
}

/// A prebuilt package published with numbered revisions,
/// e.g. `<base>mingw-w64-x86_64-python-3.11.8-<rev>-any.pkg.tar.zst`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySource {
    pub base_url: String,
    pub file_prefix: String,
    pub extension: String,
}

impl BinarySource {
    pub fn file_name(&self, revision: u32) -> String {
        format!("{}-{}{}", self.file_prefix, revision, self.extension)
    }

    pub fn url(&self, revision: u32) -> String {
        format!("{}{}", self.base_url, self.file_name(revision))
    }

    /// Extracts the revision from a file name produced by [`BinarySource::file_name`]
    pub fn parse_revision(&self, file_name: &str) -> Option<u32> {
        file_name
            .strip_prefix(&self.file_prefix)?
            .strip_prefix('-')?
            .strip_suffix(&self.extension)?
            .parse()
            .ok()
    }
}

/// Everything derived from a complete [`BuildTarget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub target_version: String,
    pub target_version_short: String,
    pub target_os: Vec<TargetOs>,
    pub work_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub source_url: String,
    pub mingw_binary: BinarySource,
}

impl Settings {
    pub fn new(target: BuildTarget, work_dir: PathBuf, urls: &Urls) -> Result<Self, TargetError> {
        let version = target.version.ok_or(TargetError::NotConfigured)?;
        if target.target.is_empty() {
            return Err(TargetError::NotConfigured);
        }

        let target_version_short = version.split('.').take(2).collect::<Vec<_>>().join(".");
        let python_base = urls.python.trim_end_matches('/');
        let msys2_base = format!("{}/", urls.msys2.trim_end_matches('/'));

        Ok(Self {
            source_url: format!(
                "{}/ftp/python/{}/Python-{}.tgz",
                python_base, version, version
            ),
            mingw_binary: BinarySource {
                base_url: msys2_base,
                file_prefix: format!("mingw-w64-x86_64-python-{}", version),
                extension: "-any.pkg.tar.zst".to_string(),
            },
            cache_dir: work_dir.join(".cache"),
            work_dir,
            target_version: version,
            target_version_short,
            target_os: target.target,
        })
    }

    /// Loads the persisted build target and derives settings from it
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(
        runtime: &R,
        config_dir: &Path,
        work_dir: PathBuf,
        urls: &Urls,
    ) -> Result<Self> {
        let target = BuildTarget::load(runtime, config_dir)?;
        Ok(Self::new(target, work_dir, urls)?)
    }

    /// File name of the CPython source tarball
    pub fn source_file_name(&self) -> String {
        format!("Python-{}.tgz", self.target_version)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    #[test]
    fn test_settings_derives_paths_and_urls() {
        let target = BuildTarget {
            version: Some("3.11.8".to_string()),
            target: vec![TargetOs::Host, TargetOs::Ios],
        };
        let settings = Settings::new(target, PathBuf::from("/w/dist/toolchain"), &Urls::default()).unwrap();

        assert_eq!(settings.target_version, "3.11.8");
        assert_eq!(settings.target_version_short, "3.11");
        assert_eq!(settings.target_os, vec![TargetOs::Host, TargetOs::Ios]);
        assert_eq!(settings.cache_dir, PathBuf::from("/w/dist/toolchain/.cache"));
        assert_eq!(
            settings.source_url,
            "https://www.python.org/ftp/python/3.11.8/Python-3.11.8.tgz"
        );
        assert_eq!(settings.source_file_name(), "Python-3.11.8.tgz");
        assert_eq!(
            settings.mingw_binary.url(2),
            "https://repo.msys2.org/mingw/mingw64/mingw-w64-x86_64-python-3.11.8-2-any.pkg.tar.zst"
        );
    }

    #[test]
    fn test_settings_normalises_base_urls() {
        let urls = Urls {
            python: "http://127.0.0.1:1234/".to_string(),
            msys2: "http://127.0.0.1:1234/msys".to_string(),
        };
        let settings = test_support::settings(Path::new("/w"), &urls);

        assert_eq!(
            settings.source_url,
            "http://127.0.0.1:1234/ftp/python/3.11.8/Python-3.11.8.tgz"
        );
        assert_eq!(settings.mingw_binary.base_url, "http://127.0.0.1:1234/msys/");
    }

    #[test]
    fn test_settings_requires_version_and_targets() {
        let no_version = BuildTarget {
            version: None,
            target: vec![TargetOs::Host],
        };
        assert_eq!(
            Settings::new(no_version, PathBuf::from("/w"), &Urls::default()),
            Err(TargetError::NotConfigured)
        );

        let no_targets = BuildTarget {
            version: Some("3.11.8".to_string()),
            target: vec![],
        };
        assert_eq!(
            Settings::new(no_targets, PathBuf::from("/w"), &Urls::default()),
            Err(TargetError::NotConfigured)
        );
    }

    #[test]
    fn test_settings_load_without_file_is_not_configured() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);

        let err = Settings::load(&runtime, Path::new("/cfg"), PathBuf::from("/w"), &Urls::default())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<TargetError>(),
            Some(&TargetError::NotConfigured)
        );
    }

    #[test]
    fn test_binary_source_revision_round_trip() {
        let source = test_support::settings(Path::new("/w"), &Urls::default()).mingw_binary;

        assert_eq!(
            source.file_name(3),
            "mingw-w64-x86_64-python-3.11.8-3-any.pkg.tar.zst"
        );
        assert_eq!(source.parse_revision(&source.file_name(3)), Some(3));
        assert_eq!(
            source.parse_revision("mingw-w64-x86_64-python-3.11.8-x-any.pkg.tar.zst"),
            None
        );
        assert_eq!(
            source.parse_revision("mingw-w64-x86_64-python-3.12.1-1-any.pkg.tar.zst"),
            None
        );
        assert_eq!(source.parse_revision("unrelated.txt"), None);
    }
}
