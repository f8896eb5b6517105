use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use toolchain::commands::{self, GlobalOptions};
use toolchain::runtime::RealRuntime;

/// Set the operating systems the toolchain builds for (host, android, ios)
#[derive(Parser, Debug)]
#[command(author, version = env!("TOOLCHAIN_BUILD_VERSION"), about)]
struct Cli {
    #[arg(required = true, value_name = "OS")]
    targets: Vec<String>,

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

    match commands::target_os(&RealRuntime, &options, &cli.targets) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(commands::exit_code(&e))
        }
    }
}
