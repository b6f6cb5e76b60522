//! bdd-images CLI
//!
//! ## Usage
//!
//! ```bash
//! bdd-images gallery logs/login_scenario --title "Log in"
//! bdd-images hash before.png after.png
//! bdd-images sniff screenshot.bin
//! bdd-images provision --log-root logs
//! ```

use bdd_images::ProvisionOutcome;
use bdd_images_cli::{
    handlers::{run_gallery, run_hash, run_provision, run_sniff},
    Cli, CliConfig, CliResult, ColorChoice, Commands, Output, Verbosity,
};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_logging(config);
    let output = Output::new(config.color.should_color(), config.verbosity.is_quiet());

    match cli.command {
        Commands::Gallery(args) => match run_gallery(&args)? {
            Some(path) => {
                output.success(&format!("Gallery written to {}", path.display()));
                output.result(&path.display().to_string());
            }
            None => output.warning(&format!("No .png files in {}", args.folder.display())),
        },
        Commands::Hash(args) => {
            for (path, hash) in run_hash(&args)? {
                output.result(&format!("{hash}  {}", path.display()));
            }
        }
        Commands::Sniff(args) => {
            for (path, format) in run_sniff(&args)? {
                output.result(&format!("{format}  {}", path.display()));
            }
        }
        Commands::Provision(args) => match run_provision(&args)? {
            ProvisionOutcome::Copied(dir) | ProvisionOutcome::CopiedUnlocked(dir) => {
                output.success(&format!("Gallery assets copied to {}", dir.display()));
            }
            ProvisionOutcome::AlreadyComplete(dir) => {
                output.info(&format!("Gallery assets already present in {}", dir.display()));
            }
            ProvisionOutcome::LockTimeout(dir) => output.warning(&format!(
                "Another process holds the asset lock for {}",
                dir.display()
            )),
            ProvisionOutcome::Disabled => {}
        },
    }
    Ok(())
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
}

fn init_logging(config: CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.filter_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.color.should_color())
        .with_target(false)
        .try_init();
}
