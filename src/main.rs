use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use toolchain::commands::{self, Action, Config, GlobalOptions, ToolchainCommand};
use toolchain::runtime::RealRuntime;
use toolchain::settings::TargetOs;

/// toolchain - Python multiplatform build toolchain
///
/// Prepares CPython distributions for the host, Android and iOS and builds
/// packages against them.
///
/// Set the build target once before anything else:
///   toolchain target-version 3.11.8
///   toolchain target-os host ios
///
/// Examples:
///   toolchain init                   # Prepare every available environment
///   toolchain build numpy            # Build for every target os
///   toolchain ios update ./app-ios   # Run a command in one environment
#[derive(Parser, Debug)]
#[command(author, version = env!("TOOLCHAIN_BUILD_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(clap::Args, Debug)]
struct GlobalArgs {
    /// Work directory (defaults to ./dist/toolchain; also via TOOLCHAIN_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "TOOLCHAIN_ROOT",
        value_name = "PATH",
        global = true
    )]
    root: Option<PathBuf>,

    /// Directory holding buildtarget.json
    #[arg(
        long = "config-dir",
        env = "TOOLCHAIN_CONFIG_DIR",
        value_name = "PATH",
        global = true
    )]
    config_dir: Option<PathBuf>,

    /// Base URL of the CPython source downloads (defaults to https://www.python.org)
    #[arg(
        long = "python-url",
        env = "TOOLCHAIN_PYTHON_URL",
        value_name = "URL",
        global = true
    )]
    python_url: Option<String>,

    /// Base URL of the MSYS2 mingw64 repository
    #[arg(
        long = "msys2-url",
        env = "TOOLCHAIN_MSYS2_URL",
        value_name = "URL",
        global = true
    )]
    msys2_url: Option<String>,
}

impl From<GlobalArgs> for GlobalOptions {
    fn from(args: GlobalArgs) -> Self {
        GlobalOptions {
            root: args.root,
            config_dir: args.config_dir,
            python_url: args.python_url,
            msys2_url: args.msys2_url,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Prepare the python distribution of every available environment
    Init,

    /// Build packages for every target os
    Build(PassArgs),

    /// Remove build outputs for every target os (everything when no package is given)
    Clean(PassArgs),

    /// Run pip in every target os environment
    #[command(alias = "pip3")]
    Pip(PassArgs),

    /// Run a command in the host environment
    Host(TargetCommand),

    /// Run a command in the Android environment
    Android(TargetCommand),

    /// Run a command in the iOS environment
    Ios(TargetCommand),

    /// Set the target python version, e.g. 3.11.8
    TargetVersion(TargetVersionArgs),

    /// Set the target operating systems (host, android, ios)
    TargetOs(TargetOsArgs),

    /// Print the distribution manifest
    Manifest(ManifestArgs),
}

#[derive(clap::Args, Debug)]
struct PassArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct TargetCommand {
    /// Command understood by the environment (init, build, clean, pip, ...)
    command: String,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct TargetVersionArgs {
    /// Python version, with or without a "python" prefix
    version: String,

    /// Replace an already stored version
    #[arg(long)]
    force: bool,
}

#[derive(clap::Args, Debug)]
struct TargetOsArgs {
    #[arg(required = true, value_name = "OS")]
    targets: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct ManifestArgs {
    /// Print pip requirement lines instead of JSON
    #[arg(long)]
    requirements: bool,
}

fn toolchain_command(command: Commands) -> Option<ToolchainCommand> {
    let on = |target, cmd: TargetCommand| ToolchainCommand::On {
        target,
        command: cmd.command,
        args: cmd.args,
    };
    Some(match command {
        Commands::Init => ToolchainCommand::Init,
        Commands::Build(p) => ToolchainCommand::Run {
            action: Action::Build,
            args: p.args,
        },
        Commands::Clean(p) => ToolchainCommand::Run {
            action: Action::Clean,
            args: p.args,
        },
        Commands::Pip(p) => ToolchainCommand::Run {
            action: Action::Pip,
            args: p.args,
        },
        Commands::Host(cmd) => on(TargetOs::Host, cmd),
        Commands::Android(cmd) => on(TargetOs::Android, cmd),
        Commands::Ios(cmd) => on(TargetOs::Ios, cmd),
        Commands::TargetVersion(_) | Commands::TargetOs(_) | Commands::Manifest(_) => return None,
    })
}

async fn run(cli: Cli) -> Result<()> {
    let options = GlobalOptions::from(cli.global);
    let runtime = RealRuntime;

    match cli.command {
        Commands::TargetVersion(args) => {
            commands::target_version(&runtime, &options, &args.version, args.force)?;
        }
        Commands::TargetOs(args) => {
            commands::target_os(&runtime, &options, &args.targets)?;
        }
        Commands::Manifest(args) => {
            commands::print_manifest(&mut std::io::stdout().lock(), args.requirements)?;
        }
        command => {
            if let Some(command) = toolchain_command(command) {
                let config = Config::new(runtime, options)?;
                commands::run_toolchain(config, command).await?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(commands::exit_code(&e))
        }
    }
}
