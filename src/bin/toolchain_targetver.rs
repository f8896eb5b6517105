use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use toolchain::commands::{self, GlobalOptions};
use toolchain::runtime::RealRuntime;

/// Set the python version the toolchain builds, e.g. 3.11.8 or Python3.11.8
#[derive(Parser, Debug)]
#[command(author, version = env!("TOOLCHAIN_BUILD_VERSION"), about)]
struct Cli {
    #[arg(id = "python_version", value_name = "VERSION")]
    version: String,

    /// Replace an already stored version
    #[arg(long)]
    force: bool,

    /// Directory holding buildtarget.json
    #[arg(long = "config-dir", env = "TOOLCHAIN_CONFIG_DIR", value_name = "PATH")]
    config_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let options = GlobalOptions {
        config_dir: cli.config_dir,
        ..Default::default()
    };

    match commands::target_version(&RealRuntime, &options, &cli.version, cli.force) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(commands::exit_code(&e))
        }
    }
}
