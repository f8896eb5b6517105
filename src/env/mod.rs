//! Build environments.
//!
//! An [`Environment`] knows how to prepare a python distribution for one
//! platform and how to run `build`, `clean` and `pip` against it. The host
//! environment is chosen from the detected [`HostPlatform`]; target
//! environments (iOS, Android) are only registered where their external
//! toolchains can run.

mod delegate;
mod mingw;
mod python;
mod source;
mod xcode;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::fmt;
use std::sync::Arc;

use crate::cleanup::SharedCleanupContext;
use crate::http::HttpClient;
use crate::platform::HostPlatform;
use crate::runtime::Runtime;
use crate::settings::{Settings, TargetOs};

pub use delegate::{DelegateEnv, DelegateKind};
pub use mingw::MinGwEnv;
pub use source::SourceBuildEnv;
pub use xcode::find_xcodeproj;

/// Slot an environment occupies in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvType {
    Host,
    Android,
    Ios,
}

impl EnvType {
    pub fn label(self) -> &'static str {
        match self {
            EnvType::Host => "Host",
            EnvType::Android => "Android",
            EnvType::Ios => "iOS",
        }
    }
}

impl fmt::Display for EnvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<TargetOs> for EnvType {
    fn from(os: TargetOs) -> Self {
        match os {
            TargetOs::Host => EnvType::Host,
            TargetOs::Android => EnvType::Android,
            TargetOs::Ios => EnvType::Ios,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Environment: Send + Sync {
    fn env_type(&self) -> EnvType;

    /// Human readable name, e.g. `mingw` or `ios`
    fn name(&self) -> String;

    fn is_initialized(&self) -> bool;

    /// Prepare the python distribution. Called only when not yet initialized.
    async fn init(&self) -> Result<()>;

    async fn build(&self, args: &[String]) -> Result<()>;

    async fn clean(&self, args: &[String]) -> Result<()>;

    async fn pip(&self, args: &[String]) -> Result<()>;

    /// Any other command. Environments without extra commands reject it.
    async fn passthrough(&self, command: &str, args: &[String]) -> Result<()>;
}

/// Runs `env.init()` unless the environment is already initialized
pub async fn init_env(env: &dyn Environment) -> Result<()> {
    if env.is_initialized() {
        info!("{} environment is already initialized.", env.name());
        return Ok(());
    }
    info!("Initializing {} environment...", env.name());
    env.init().await?;
    info!("{} environment is ready.", env.name());
    Ok(())
}

/// Environments available on this machine, at most one per [`EnvType`]
#[derive(Default)]
pub struct EnvRegistry {
    envs: Vec<Box<dyn Environment>>,
}

impl EnvRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an environment, replacing any previous one of the same type
    pub fn register(&mut self, env: Box<dyn Environment>) {
        let env_type = env.env_type();
        if let Some(pos) = self.envs.iter().position(|e| e.env_type() == env_type) {
            warn!("Replacing {} environment '{}'", env_type, self.envs[pos].name());
            self.envs.remove(pos);
        }
        self.envs.push(env);
    }

    pub fn get(&self, env_type: EnvType) -> Option<&dyn Environment> {
        self.envs
            .iter()
            .find(|e| e.env_type() == env_type)
            .map(|e| e.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Environment> {
        self.envs.iter().map(|e| e.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.envs.iter().map(|e| e.name()).collect()
    }

    /// Registers the host environment for `host` plus every target
    /// environment usable on this machine.
    pub fn discover<R: Runtime + 'static>(
        runtime: Arc<R>,
        http: HttpClient,
        settings: Arc<Settings>,
        host: HostPlatform,
        cleanup: SharedCleanupContext,
    ) -> Self {
        let mut registry = Self::new();

        match host {
            HostPlatform::MinGW => registry.register(Box::new(MinGwEnv::new(
                runtime.clone(),
                http,
                settings.clone(),
                cleanup,
            ))),
            HostPlatform::Linux | HostPlatform::Darwin => {
                registry.register(Box::new(SourceBuildEnv::new(
                    runtime.clone(),
                    http,
                    settings.clone(),
                    host,
                    cleanup,
                )))
            }
        }

        if host == HostPlatform::Darwin {
            registry.register(Box::new(DelegateEnv::new(
                runtime.clone(),
                settings.clone(),
                DelegateKind::Ios,
            )));
        }

        if DelegateKind::Android.is_available(runtime.as_ref()) {
            registry.register(Box::new(DelegateEnv::new(
                runtime,
                settings,
                DelegateKind::Android,
            )));
        }

        registry
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::mock_env;
    use super::*;
    use crate::cleanup;
    use crate::runtime::MockRuntime;
    use crate::settings::{Urls, test_support::settings};
    use mockall::predicate::eq;
    use reqwest::Client;
    use std::path::Path;

    fn discover(host: HostPlatform, ndk: bool) -> EnvRegistry {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq("ANDROID_NDK_HOME"))
            .returning(move |_| {
                if ndk {
                    Ok("/opt/android-ndk".to_string())
                } else {
                    Err(std::env::VarError::NotPresent)
                }
            });
        runtime
            .expect_env_var()
            .with(eq("ANDROID_NDK_ROOT"))
            .returning(|_| Err(std::env::VarError::NotPresent));

        EnvRegistry::discover(
            Arc::new(runtime),
            HttpClient::new(Client::new()),
            Arc::new(settings(Path::new("/w"), &Urls::default())),
            host,
            cleanup::new_shared(),
        )
    }

    #[test]
    fn test_discover_linux_host_only() {
        let registry = discover(HostPlatform::Linux, false);
        assert_eq!(registry.names(), vec!["linux"]);
        assert!(registry.get(EnvType::Host).is_some());
        assert!(registry.get(EnvType::Ios).is_none());
        assert!(registry.get(EnvType::Android).is_none());
    }

    #[test]
    fn test_discover_darwin_registers_ios() {
        let registry = discover(HostPlatform::Darwin, false);
        assert_eq!(registry.names(), vec!["darwin", "ios"]);
    }

    #[test]
    fn test_discover_mingw_with_android_ndk() {
        let registry = discover(HostPlatform::MinGW, true);
        assert_eq!(registry.names(), vec!["mingw", "android"]);
        assert_eq!(
            registry.get(EnvType::Android).map(|e| e.name()),
            Some("android".to_string())
        );
    }

    #[test]
    fn test_register_replaces_same_type() {
        let mut registry = EnvRegistry::new();
        registry.register(Box::new(mock_env(EnvType::Host, "first")));
        registry.register(Box::new(mock_env(EnvType::Ios, "ios")));
        registry.register(Box::new(mock_env(EnvType::Host, "second")));

        assert_eq!(registry.names(), vec!["ios", "second"]);
    }

    #[tokio::test]
    async fn test_init_env_skips_initialized() {
        let mut env = mock_env(EnvType::Host, "linux");
        env.expect_is_initialized().return_const(true);
        env.expect_init().never();

        init_env(&env).await.unwrap();
    }

    #[tokio::test]
    async fn test_init_env_runs_init_once() {
        let mut env = mock_env(EnvType::Host, "linux");
        env.expect_is_initialized().return_const(false);
        env.expect_init().times(1).returning(|| Ok(()));

        init_env(&env).await.unwrap();
    }

    #[test]
    fn test_env_type_from_target_os() {
        assert_eq!(EnvType::from(TargetOs::Host), EnvType::Host);
        assert_eq!(EnvType::from(TargetOs::Android), EnvType::Android);
        assert_eq!(EnvType::from(TargetOs::Ios).to_string(), "iOS");
    }
}
