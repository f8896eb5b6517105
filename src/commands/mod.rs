//! Command dispatch onto the registered build environments.

mod config;
mod target;

use anyhow::{Result, bail};
use log::{info, warn};
use std::fmt;
use std::sync::Arc;

use crate::cleanup::{self, spawn_ctrl_c_handler};
use crate::env::{EnvRegistry, EnvType, Environment, init_env};
use crate::platform::{HostPlatform, host_arch};
use crate::runtime::Runtime;
use crate::settings::{Settings, TargetError, TargetOs};

pub use config::{Config, GlobalOptions, resolve_config_dir};
pub use target::{print_manifest, target_os, target_version};

/// Commands run on every selected environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Build,
    Clean,
    Pip,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Build => "build",
            Action::Clean => "clean",
            Action::Pip => "pip",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainCommand {
    /// Initialize every registered environment
    Init,
    /// Run an action on the environments selected by the build target
    Run { action: Action, args: Vec<String> },
    /// Run any command on a single environment
    On {
        target: TargetOs,
        command: String,
        args: Vec<String>,
    },
}

/// Routes a command name to the matching [`Environment`] operation
pub async fn dispatch(env: &dyn Environment, command: &str, args: &[String]) -> Result<()> {
    match command {
        "init" => init_env(env).await,
        "build" => env.build(args).await,
        "clean" => env.clean(args).await,
        "pip" | "pip3" => env.pip(args).await,
        other => env.passthrough(other, args).await,
    }
}

/// Registered environments plus the subset chosen by the build target
pub struct Toolchain {
    registry: EnvRegistry,
    selected: Vec<EnvType>,
}

impl Toolchain {
    pub fn new(registry: EnvRegistry, targets: &[TargetOs]) -> Self {
        let mut selected: Vec<EnvType> = Vec::new();
        for env_type in targets.iter().copied().map(EnvType::from) {
            if !selected.contains(&env_type) {
                selected.push(env_type);
            }
        }
        Self { registry, selected }
    }

    pub fn registry(&self) -> &EnvRegistry {
        &self.registry
    }

    pub async fn init(&self) -> Result<()> {
        for env in self.registry.iter() {
            init_env(env).await?;
        }
        Ok(())
    }

    /// Runs `action` on each selected environment, skipping unregistered ones
    pub async fn run(&self, action: Action, args: &[String]) -> Result<()> {
        for env_type in &self.selected {
            match self.registry.get(*env_type) {
                Some(env) => {
                    info!("[{}] {} {}", env.name(), action, args.join(" "));
                    dispatch(env, action.as_str(), args).await?;
                }
                None => warn!(
                    "{} target is not available on this machine, skipping {}",
                    env_type, action
                ),
            }
        }
        Ok(())
    }

    pub async fn run_on(&self, env_type: EnvType, command: &str, args: &[String]) -> Result<()> {
        let Some(env) = self.registry.get(env_type) else {
            bail!("{} target is not initialized yet.", env_type);
        };
        dispatch(env, command, args).await
    }
}

/// Process exit code for a failed command: [`TargetError`] carries its own,
/// everything else exits with 1
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<TargetError>()
        .map(|e| e.exit_code() as u8)
        .unwrap_or(1)
}

/// Entry point of the `toolchain` binary
pub async fn run_toolchain<R: Runtime + 'static>(
    config: Config<R>,
    command: ToolchainCommand,
) -> Result<()> {
    let settings = Arc::new(Settings::load(
        config.runtime.as_ref(),
        &config.config_dir,
        config.work_dir.clone(),
        &config.urls,
    )?);

    let host = HostPlatform::detect();
    info!("Host platform: {} ({})", host, host_arch());
    info!(
        "Python {} for [{}], work dir {}",
        settings.target_version,
        settings
            .target_os
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        settings.work_dir.display()
    );

    let cleanup_ctx = cleanup::new_shared();
    let registry = EnvRegistry::discover(
        config.runtime.clone(),
        config.http.clone(),
        settings.clone(),
        host,
        cleanup_ctx.clone(),
    );
    info!("Registered environments: {}", registry.names().join(", "));
    let toolchain = Toolchain::new(registry, &settings.target_os);

    let ctrl_c = spawn_ctrl_c_handler(cleanup_ctx);
    let result = match command {
        ToolchainCommand::Init => toolchain.init().await,
        ToolchainCommand::Run { action, args } => toolchain.run(action, &args).await,
        ToolchainCommand::On {
            target,
            command,
            args,
        } => toolchain.run_on(target.into(), &command, &args).await,
    };
    ctrl_c.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::test_support::mock_env;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_only_touches_selected_envs() {
        let mut host = mock_env(EnvType::Host, "linux");
        host.expect_build()
            .with(eq(args(&["numpy"])))
            .times(1)
            .returning(|_| Ok(()));
        let mut ios = mock_env(EnvType::Ios, "ios");
        ios.expect_build().never();
        let mut android = mock_env(EnvType::Android, "android");
        android
            .expect_build()
            .with(eq(args(&["numpy"])))
            .times(1)
            .returning(|_| Ok(()));

        let mut registry = EnvRegistry::new();
        registry.register(Box::new(host));
        registry.register(Box::new(ios));
        registry.register(Box::new(android));

        let toolchain = Toolchain::new(registry, &[TargetOs::Host, TargetOs::Android]);
        toolchain.run(Action::Build, &args(&["numpy"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_skips_unregistered_targets() {
        let mut host = mock_env(EnvType::Host, "mingw");
        host.expect_pip().times(1).returning(|_| Ok(()));

        let mut registry = EnvRegistry::new();
        registry.register(Box::new(host));

        let toolchain = Toolchain::new(registry, &[TargetOs::Ios, TargetOs::Host]);
        toolchain
            .run(Action::Pip, &args(&["install", "requests"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_at_first_failure() {
        let mut host = mock_env(EnvType::Host, "linux");
        host.expect_clean()
            .returning(|_| Err(anyhow::anyhow!("permission denied")));
        let mut android = mock_env(EnvType::Android, "android");
        android.expect_clean().never();

        let mut registry = EnvRegistry::new();
        registry.register(Box::new(host));
        registry.register(Box::new(android));

        let toolchain = Toolchain::new(registry, &[TargetOs::Host, TargetOs::Android]);
        let err = toolchain.run(Action::Clean, &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
    }

    #[tokio::test]
    async fn test_init_covers_all_registered_envs() {
        let mut host = mock_env(EnvType::Host, "darwin");
        host.expect_is_initialized().return_const(true);
        host.expect_init().never();
        let mut ios = mock_env(EnvType::Ios, "ios");
        ios.expect_is_initialized().return_const(false);
        ios.expect_init().times(1).returning(|| Ok(()));

        let mut registry = EnvRegistry::new();
        registry.register(Box::new(host));
        registry.register(Box::new(ios));

        // Only the host is selected, init still prepares every environment
        let toolchain = Toolchain::new(registry, &[TargetOs::Host]);
        toolchain.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_on_unregistered_target() {
        let mut registry = EnvRegistry::new();
        registry.register(Box::new(mock_env(EnvType::Host, "linux")));

        let toolchain = Toolchain::new(registry, &[TargetOs::Host]);
        let err = toolchain
            .run_on(EnvType::Android, "build", &[])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Android target is not initialized yet.");

        let err = toolchain.run_on(EnvType::Ios, "build", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "iOS target is not initialized yet.");
    }

    #[tokio::test]
    async fn test_dispatch_routes_commands() {
        let mut env = mock_env(EnvType::Ios, "ios");
        env.expect_pip()
            .with(eq(args(&["list"])))
            .times(2)
            .returning(|_| Ok(()));
        env.expect_passthrough()
            .with(eq("update"), eq(args(&["App"])))
            .times(1)
            .returning(|_, _| Ok(()));
        env.expect_is_initialized().return_const(false);
        env.expect_init().times(1).returning(|| Ok(()));

        dispatch(&env, "pip", &args(&["list"])).await.unwrap();
        dispatch(&env, "pip3", &args(&["list"])).await.unwrap();
        dispatch(&env, "update", &args(&["App"])).await.unwrap();
        dispatch(&env, "init", &[]).await.unwrap();
    }

    #[test]
    fn test_toolchain_collapses_duplicate_targets() {
        let toolchain = Toolchain::new(
            EnvRegistry::new(),
            &[TargetOs::Ios, TargetOs::Host, TargetOs::Ios],
        );
        assert_eq!(toolchain.selected, vec![EnvType::Ios, EnvType::Host]);
        assert!(toolchain.registry().names().is_empty());
    }

    #[test]
    fn test_exit_code() {
        let already_set: anyhow::Error = TargetError::VersionAlreadySet("3.11.8".into()).into();
        assert_eq!(exit_code(&already_set), 2);
        let invalid: anyhow::Error = TargetError::InvalidVersion("3".into()).into();
        assert_eq!(exit_code(&invalid.context("while saving")), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("network down")), 1);
    }

    #[tokio::test]
    async fn test_run_toolchain_requires_build_target() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/cfg/buildtarget.json")))
            .returning(|_| false);

        let options = GlobalOptions {
            root: Some(PathBuf::from("/w")),
            config_dir: Some(PathBuf::from("/cfg")),
            ..Default::default()
        };
        let config = Config::new(runtime, options).unwrap();

        let err = run_toolchain(config, ToolchainCommand::Init).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TargetError>(),
            Some(&TargetError::NotConfigured)
        );
    }
}
