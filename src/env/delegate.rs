use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use super::xcode::find_xcodeproj;
use super::{EnvType, Environment};
use crate::runtime::{ProcessSpec, Runtime};
use crate::settings::Settings;

/// Written into the work dir once the external toolchain finished its init
const INITIALIZED_MARKER: &str = ".toolchain-initialized";

const NDK_VARIABLES: [&str; 2] = ["ANDROID_NDK_HOME", "ANDROID_NDK_ROOT"];

/// External toolchain a target environment hands its commands to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateKind {
    /// kivy-ios, shipped by the `toolchain-ios` requirement
    Ios,
    /// python-for-android
    Android,
}

impl DelegateKind {
    pub fn env_type(self) -> EnvType {
        match self {
            DelegateKind::Ios => EnvType::Ios,
            DelegateKind::Android => EnvType::Android,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DelegateKind::Ios => "ios",
            DelegateKind::Android => "android",
        }
    }

    /// Program plus leading arguments used for every command
    fn command(self) -> ProcessSpec {
        match self {
            DelegateKind::Ios => ProcessSpec::new("python3").args(["-m", "kivy_ios.toolchain"]),
            DelegateKind::Android => ProcessSpec::new("p4a"),
        }
    }

    fn init_args(self) -> &'static [&'static str] {
        match self {
            DelegateKind::Ios => &["build", "python3"],
            DelegateKind::Android => &["create", "--requirements=python3", "--dist-name=toolchain"],
        }
    }

    /// Android needs an NDK; iOS availability is decided by the host platform
    pub fn is_available<R: Runtime>(self, runtime: &R) -> bool {
        match self {
            DelegateKind::Ios => true,
            DelegateKind::Android => NDK_VARIABLES.iter().any(|v| runtime.env_var(v).is_ok()),
        }
    }
}

/// Target environment driven by an external platform toolchain
pub struct DelegateEnv<R: Runtime> {
    runtime: Arc<R>,
    settings: Arc<Settings>,
    kind: DelegateKind,
    work_dir: PathBuf,
}

impl<R: Runtime> DelegateEnv<R> {
    pub fn new(runtime: Arc<R>, settings: Arc<Settings>, kind: DelegateKind) -> Self {
        let work_dir = settings.work_dir.join(kind.name());
        Self {
            runtime,
            settings,
            kind,
            work_dir,
        }
    }

    fn spec<I, S>(&self, command: &str, args: I) -> ProcessSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let settings = &self.settings;
        let build_dir = settings.work_dir.join("build").join(self.kind.name());
        self.kind
            .command()
            .arg(command)
            .args(args)
            .current_dir(&self.work_dir)
            .env("TOOLCHAIN_PYTHON_VERSION", settings.target_version.as_str())
            .env("TOOLCHAIN_PYTHON_URL", settings.source_url.as_str())
            .env("TOOLCHAIN_BUILD_DIR", build_dir.to_string_lossy())
            .env("TOOLCHAIN_CACHE_DIR", settings.cache_dir.to_string_lossy())
            .env("TOOLCHAIN_DIST_DIR", self.work_dir.to_string_lossy())
    }

    fn forward(&self, command: &str, args: &[String]) -> Result<()> {
        self.runtime
            .create_dir_all(&self.work_dir)
            .with_context(|| format!("Failed to create {:?}", self.work_dir))?;
        let spec = self.spec(command, args.iter().cloned());
        info!("[{}] {}", self.kind.name(), spec);
        self.runtime.run(&spec)
    }
}

#[async_trait]
impl<R: Runtime + 'static> Environment for DelegateEnv<R> {
    fn env_type(&self) -> EnvType {
        self.kind.env_type()
    }

    fn name(&self) -> String {
        self.kind.name().to_string()
    }

    fn is_initialized(&self) -> bool {
        self.runtime.exists(&self.work_dir.join(INITIALIZED_MARKER))
    }

    async fn init(&self) -> Result<()> {
        let (command, rest) = match self.kind.init_args().split_first() {
            Some((command, rest)) => (*command, rest),
            None => return Ok(()),
        };
        let rest: Vec<String> = rest.iter().map(|s| s.to_string()).collect();
        self.forward(command, &rest)?;
        self.runtime.write(
            &self.work_dir.join(INITIALIZED_MARKER),
            self.settings.target_version.as_bytes(),
        )
    }

    async fn build(&self, args: &[String]) -> Result<()> {
        self.forward("build", args)
    }

    async fn clean(&self, args: &[String]) -> Result<()> {
        self.forward("clean", args)
    }

    async fn pip(&self, args: &[String]) -> Result<()> {
        self.forward("pip", args)
    }

    async fn passthrough(&self, command: &str, args: &[String]) -> Result<()> {
        if self.kind == DelegateKind::Ios
            && command == "update"
            && let Some((project, rest)) = args.split_first()
        {
            // Absolute, since the child runs in the work dir
            let cwd = self.runtime.current_dir()?;
            let mut resolved = vec![find_xcodeproj(&cwd, project)?.to_string_lossy().to_string()];
            resolved.extend(rest.iter().cloned());
            return self.forward(command, &resolved);
        }
        self.forward(command, args)
    }
}
