use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use super::python::PythonPrefix;
use super::{EnvType, Environment};
use crate::archive::{ArchiveExtractor, ArchiveExtractorImpl};
use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::download::fetch_cached;
use crate::http::HttpClient;
use crate::platform::HostPlatform;
use crate::runtime::{ProcessSpec, Runtime};
use crate::settings::Settings;

/// Host environment that compiles CPython from the python.org source tarball
pub struct SourceBuildEnv<R: Runtime> {
    runtime: Arc<R>,
    http: HttpClient,
    settings: Arc<Settings>,
    platform: HostPlatform,
    extractor: ArchiveExtractorImpl,
    prefix: PythonPrefix,
    build_dir: PathBuf,
    jobs: usize,
    cleanup: SharedCleanupContext,
}

impl<R: Runtime> SourceBuildEnv<R> {
    pub fn new(
        runtime: Arc<R>,
        http: HttpClient,
        settings: Arc<Settings>,
        platform: HostPlatform,
        cleanup: SharedCleanupContext,
    ) -> Self {
        let dist_dir = settings.work_dir.join(platform.as_str());
        let build_dir = settings.work_dir.join("build").join(platform.as_str());
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            prefix: PythonPrefix::new(&dist_dir, platform.python_executable()),
            build_dir,
            runtime,
            http,
            settings,
            platform,
            extractor: ArchiveExtractorImpl::new(),
            jobs,
            cleanup,
        }
    }

    #[cfg(test)]
    fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// `Python-<version>` directory inside the build dir
    fn source_dir(&self) -> PathBuf {
        self.build_dir
            .join(format!("Python-{}", self.settings.target_version))
    }

    async fn unpack_sources(&self) -> Result<PathBuf> {
        let archive = fetch_cached(
            self.runtime.as_ref(),
            &self.http,
            &self.settings.source_url,
            &self.settings.cache_dir,
            &self.settings.source_file_name(),
            self.cleanup.clone(),
        )
        .await?;

        if self.runtime.exists(&self.build_dir) {
            self.runtime.remove_dir_all(&self.build_dir)?;
        }
        let guard = CleanupGuard::new(self.cleanup.clone(), self.build_dir.clone());
        self.extractor
            .extract(self.runtime.as_ref(), &archive, &self.build_dir)
            .with_context(|| format!("Failed to extract {:?}", archive))?;
        guard.success();

        let source_dir = self.source_dir();
        if !self.runtime.is_dir(&source_dir) {
            bail!("Source archive did not unpack into {:?}", source_dir);
        }
        Ok(source_dir)
    }

    fn compile(&self, source_dir: &std::path::Path) -> Result<()> {
        let prefix = self.prefix.root();
        let steps = [
            ProcessSpec::new("./configure")
                .arg(format!("--prefix={}", prefix.to_string_lossy()))
                .current_dir(source_dir),
            ProcessSpec::new("make")
                .arg(format!("-j{}", self.jobs))
                .current_dir(source_dir),
            ProcessSpec::new("make")
                .arg("install")
                .current_dir(source_dir),
        ];

        for step in &steps {
            info!("[{}] {}", self.platform, step);
            self.runtime
                .run(step)
                .with_context(|| format!("Building Python {} failed", self.settings.target_version))?;
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Runtime + 'static> Environment for SourceBuildEnv<R> {
    fn env_type(&self) -> EnvType {
        EnvType::Host
    }

    fn name(&self) -> String {
        self.platform.to_string()
    }

    fn is_initialized(&self) -> bool {
        self.prefix.is_installed(self.runtime.as_ref())
    }

    async fn init(&self) -> Result<()> {
        let source_dir = self.unpack_sources().await?;
        self.compile(&source_dir)?;
        info!(
            "Python {} installed into {}",
            self.settings.target_version,
            self.prefix.root().display()
        );
        Ok(())
    }

    async fn build(&self, args: &[String]) -> Result<()> {
        self.prefix
            .build_wheels(self.runtime.as_ref(), &self.name(), args)
    }

    async fn clean(&self, args: &[String]) -> Result<()> {
        if args.is_empty() && self.runtime.exists(&self.build_dir) {
            self.runtime.remove_dir_all(&self.build_dir)?;
        }
        self.prefix.clean(self.runtime.as_ref(), args)
    }

    async fn pip(&self, args: &[String]) -> Result<()> {
        self.prefix.pip(self.runtime.as_ref(), &self.name(), args)
    }

    async fn passthrough(&self, command: &str, _args: &[String]) -> Result<()> {
        bail!("Unrecognized command '{}' for the {} environment", command, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_archives;
    use crate::cleanup;
    use crate::runtime::MockRuntime;
    use crate::settings::{Urls, test_support::settings};
    use mockall::Sequence;
    use mockall::predicate::eq;
    use reqwest::Client;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn env_for(runtime: MockRuntime, work: &Path, url: &str) -> SourceBuildEnv<MockRuntime> {
        let urls = Urls {
            python: url.to_string(),
            msys2: url.to_string(),
        };
        SourceBuildEnv::new(
            Arc::new(runtime),
            HttpClient::new(Client::new()),
            Arc::new(settings(work, &urls)),
            HostPlatform::Linux,
            cleanup::new_shared(),
        )
        .with_jobs(4)
    }

    #[test]
    fn test_layout() {
        let env = env_for(MockRuntime::new(), Path::new("/w"), "http://localhost");
        assert_eq!(env.name(), "linux");
        assert_eq!(env.env_type(), EnvType::Host);
        assert_eq!(env.source_dir(), PathBuf::from("/w/build/linux/Python-3.11.8"));
        assert_eq!(env.prefix.python, PathBuf::from("/w/linux/python3/bin/python3"));
    }

    #[test]
    fn test_compile_runs_configure_make_install_in_order() {
        let src = PathBuf::from("/w/build/linux/Python-3.11.8");
        let mut runtime = MockRuntime::new();
        let mut seq = Sequence::new();

        for spec in [
            ProcessSpec::new("./configure")
                .arg("--prefix=/w/linux/python3")
                .current_dir(&src),
            ProcessSpec::new("make").arg("-j4").current_dir(&src),
            ProcessSpec::new("make").arg("install").current_dir(&src),
        ] {
            runtime
                .expect_run()
                .with(eq(spec))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let env = env_for(runtime, Path::new("/w"), "http://localhost");
        env.compile(&src).unwrap();
    }

    #[test]
    fn test_compile_stops_on_failing_step() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_run()
            .times(1)
            .returning(|spec| Err(anyhow::anyhow!("`{}` exited with exit status: 1", spec)));

        let env = env_for(runtime, Path::new("/w"), "http://localhost");
        let err = env
            .compile(Path::new("/w/build/linux/Python-3.11.8"))
            .unwrap_err();
        assert!(err.to_string().contains("Building Python 3.11.8 failed"));
    }

    #[tokio::test]
    async fn test_init_downloads_unpacks_and_builds() {
        let mut server = mockito::Server::new_async().await;
        let tarball = test_archives::tar_gz(&[
            ("Python-3.11.8/configure", "#!/bin/sh", 0o755),
            ("Python-3.11.8/Makefile.pre.in", "all:", 0o644),
        ])
        .unwrap();
        let download = server
            .mock("GET", "/ftp/python/3.11.8/Python-3.11.8.tgz")
            .with_status(200)
            .with_body(tarball)
            .create_async()
            .await;

        let work = tempdir().unwrap();
        let runtime = real_fs_runtime_with_recorded_runs();
        let runs = runtime.1.clone();
        let env = env_for(runtime.0, work.path(), &server.url());

        env.init().await.unwrap();

        download.assert_async().await;
        let src = work.path().join("build/linux/Python-3.11.8");
        assert!(src.join("configure").exists());
        let runs = runs.lock().unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].program, "./configure");
        assert_eq!(runs[0].cwd.as_deref(), Some(src.as_path()));
        assert_eq!(runs[2].args, vec!["install"]);
    }

    #[tokio::test]
    async fn test_pip_before_init_fails() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);

        let env = env_for(runtime, Path::new("/w"), "http://localhost");
        let err = env.pip(&["install".to_string(), "six".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("Run 'toolchain init' first"));
    }

    #[tokio::test]
    async fn test_clean_without_args_removes_build_and_dist() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_remove_dir_all()
            .with(eq(PathBuf::from("/w/build/linux")))
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_remove_dir_all()
            .with(eq(PathBuf::from("/w/linux")))
            .times(1)
            .returning(|_| Ok(()));

        let env = env_for(runtime, Path::new("/w"), "http://localhost");
        env.clean(&[]).await.unwrap();
    }

    /// MockRuntime delegating file operations to the real file system
    /// while recording (not running) child processes.
    fn real_fs_runtime_with_recorded_runs() -> (MockRuntime, Arc<Mutex<Vec<ProcessSpec>>>) {
        use crate::runtime::RealRuntime;

        let runs = Arc::new(Mutex::new(Vec::new()));
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|p| RealRuntime.exists(p));
        runtime.expect_is_dir().returning(|p| RealRuntime.is_dir(p));
        runtime
            .expect_create_dir_all()
            .returning(|p| RealRuntime.create_dir_all(p));
        runtime
            .expect_remove_dir_all()
            .returning(|p| RealRuntime.remove_dir_all(p));
        runtime
            .expect_create_file()
            .returning(|p| RealRuntime.create_file(p));
        runtime.expect_open().returning(|p| RealRuntime.open(p));
        runtime
            .expect_rename()
            .returning(|a, b| RealRuntime.rename(a, b));
        runtime
            .expect_set_permissions()
            .returning(|p, m| RealRuntime.set_permissions(p, m));
        let recorded = runs.clone();
        runtime.expect_run().returning(move |spec| {
            recorded.lock().unwrap().push(spec.clone());
            Ok(())
        });
        (runtime, runs)
    }
}
