use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;

use super::python::PythonPrefix;
use super::{EnvType, Environment};
use crate::archive::{ArchiveExtractor, ArchiveExtractorImpl};
use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::download::fetch_cached;
use crate::http::HttpClient;
use crate::platform::HostPlatform;
use crate::runtime::Runtime;
use crate::settings::Settings;

/// Revisions are checked up to, but not including, this number
const MAX_REVISION: u32 = 10;

/// Directory the MSYS2 package unpacks into
const PACKAGE_ROOT: &str = "mingw64";

/// Host environment for Windows, using the prebuilt MSYS2 mingw-w64 python
pub struct MinGwEnv<R: Runtime> {
    runtime: Arc<R>,
    http: HttpClient,
    settings: Arc<Settings>,
    extractor: ArchiveExtractorImpl,
    prefix: PythonPrefix,
    cleanup: SharedCleanupContext,
}

impl<R: Runtime> MinGwEnv<R> {
    pub fn new(
        runtime: Arc<R>,
        http: HttpClient,
        settings: Arc<Settings>,
        cleanup: SharedCleanupContext,
    ) -> Self {
        let dist_dir = settings.work_dir.join("mingw");
        Self {
            prefix: PythonPrefix::new(&dist_dir, HostPlatform::MinGW.python_executable()),
            runtime,
            http,
            settings,
            extractor: ArchiveExtractorImpl::new(),
            cleanup,
        }
    }

    fn dist_dir(&self) -> &Path {
        &self.prefix.dist_dir
    }

    /// Highest revision already sitting in the download cache
    fn cached_revision(&self) -> Result<Option<u32>> {
        let cache_dir = &self.settings.cache_dir;
        if !self.runtime.exists(cache_dir) {
            return Ok(None);
        }
        let source = &self.settings.mingw_binary;
        Ok(self
            .runtime
            .read_dir(cache_dir)?
            .iter()
            .filter_map(|p| p.file_name())
            .filter_map(|name| source.parse_revision(&name.to_string_lossy()))
            .max())
    }

    /// Finds the newest published revision, starting from the cached one.
    /// Falls back to the cached revision when the repository cannot be reached.
    #[tracing::instrument(skip(self))]
    async fn find_latest_revision(&self) -> Result<u32> {
        let cached = self.cached_revision()?;
        let source = &self.settings.mingw_binary;
        let version = &self.settings.target_version;
        let mut found = None;

        for revision in cached.unwrap_or(1)..MAX_REVISION {
            match self.http.exists(&source.url(revision)).await {
                Ok(true) => {
                    info!(
                        "Revision {} of Python {} is found. Looking for a newer revision...",
                        revision, version
                    );
                    found = Some(revision);
                }
                Ok(false) if found.is_some() => {
                    debug!("Revision {} not found, stopping", revision);
                    break;
                }
                Ok(false) => debug!("Revision {} not found", revision),
                Err(e) if cached.is_some() => {
                    warn!("Cannot reach MSYS2 repository ({}), using cached package", e);
                    found = found.or(cached);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let revision = found.ok_or_else(|| {
            anyhow!(
                "Cannot fetch MinGW python binary from MSYS2 repository ({}). \
                 Please check the url information.",
                source.url(1)
            )
        })?;
        info!("The latest MinGW build of Python {} is revision {}", version, revision);
        Ok(revision)
    }

    async fn install(&self, revision: u32) -> Result<()> {
        let source = &self.settings.mingw_binary;
        let archive = fetch_cached(
            self.runtime.as_ref(),
            &self.http,
            &source.url(revision),
            &self.settings.cache_dir,
            &source.file_name(revision),
            self.cleanup.clone(),
        )
        .await?;

        let dist_dir = self.dist_dir().to_path_buf();
        if self.runtime.exists(&dist_dir) {
            self.runtime.remove_dir_all(&dist_dir)?;
        }
        let guard = CleanupGuard::new(self.cleanup.clone(), dist_dir.clone());

        if let Err(e) = self.unpack(&archive) {
            // Leave nothing half-extracted behind
            let _ = self.runtime.remove_dir_all(&dist_dir);
            guard.success();
            return Err(e);
        }
        guard.success();
        Ok(())
    }

    fn unpack(&self, archive: &Path) -> Result<()> {
        let dist_dir = self.dist_dir();
        info!("Extracting {} ...", archive.display());
        self.extractor
            .extract(self.runtime.as_ref(), archive, dist_dir)
            .with_context(|| format!("Failed to extract {:?}", archive))?;

        let unpacked = dist_dir.join(PACKAGE_ROOT);
        if !self.runtime.is_dir(&unpacked) {
            bail!(
                "Package {:?} does not contain a '{}' directory",
                archive,
                PACKAGE_ROOT
            );
        }
        self.runtime.rename(&unpacked, &self.prefix.root())?;
        Ok(())
    }
}

#[async_trait]
impl<R: Runtime + 'static> Environment for MinGwEnv<R> {
    fn env_type(&self) -> EnvType {
        EnvType::Host
    }

    fn name(&self) -> String {
        HostPlatform::MinGW.to_string()
    }

    fn is_initialized(&self) -> bool {
        self.prefix.is_installed(self.runtime.as_ref())
    }

    async fn init(&self) -> Result<()> {
        let revision = self.find_latest_revision().await?;
        self.install(revision).await
    }

    async fn build(&self, args: &[String]) -> Result<()> {
        self.prefix
            .build_wheels(self.runtime.as_ref(), &self.name(), args)
    }

    async fn clean(&self, args: &[String]) -> Result<()> {
        self.prefix.clean(self.runtime.as_ref(), args)
    }

    async fn pip(&self, args: &[String]) -> Result<()> {
        self.prefix.pip(self.runtime.as_ref(), &self.name(), args)
    }

    async fn passthrough(&self, command: &str, _args: &[String]) -> Result<()> {
        bail!("Unrecognized command '{}' for the {} environment", command, self.name())
    }
}
