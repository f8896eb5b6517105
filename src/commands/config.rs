use anyhow::{Result, anyhow};
use log::debug;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{http::HttpClient, runtime::Runtime, settings::Urls};

/// Directory name used under the platform config dir
const CONFIG_DIR_NAME: &str = "toolchain";

/// Flags shared by every binary and subcommand
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    /// Work directory, `<cwd>/dist/toolchain` when unset
    pub root: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub python_url: Option<String>,
    pub msys2_url: Option<String>,
}

pub struct Config<R: Runtime> {
    pub runtime: Arc<R>,
    pub http: HttpClient,
    pub config_dir: PathBuf,
    pub work_dir: PathBuf,
    pub urls: Urls,
}

impl<R: Runtime> Config<R> {
    pub fn new(runtime: R, options: GlobalOptions) -> Result<Self> {
        let config_dir = resolve_config_dir(&runtime, options.config_dir)?;
        // Always absolute: children run in other working directories
        let work_dir = match options.root {
            Some(root) if root.is_absolute() => root,
            Some(root) => runtime.current_dir()?.join(root),
            None => runtime.current_dir()?.join("dist").join("toolchain"),
        };

        let defaults = Urls::default();
        let urls = Urls {
            python: options.python_url.unwrap_or(defaults.python),
            msys2: options.msys2_url.unwrap_or(defaults.msys2),
        };
        debug!(
            "config dir: {:?}, work dir: {:?}, urls: {:?}",
            config_dir, work_dir, urls
        );

        let client = Client::builder().user_agent("toolchain-cli").build()?;

        Ok(Self {
            runtime: Arc::new(runtime),
            http: HttpClient::new(client),
            config_dir,
            work_dir,
            urls,
        })
    }
}

/// `explicit` wins; otherwise `<platform config dir>/toolchain`
pub fn resolve_config_dir<R: Runtime>(runtime: &R, explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    runtime
        .config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or_else(|| anyhow!("Cannot determine the config directory. Use --config-dir."))
}
