//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, installs logging,
//! dispatches the command and prints every error itself.

use clap::Parser;

use upe_config::{CliArgs, Config};
use upe_utils::error::{ConfigError, UpeError, ValidationError};
use upe_utils::exit_codes::ExitCode;
use upe_utils::logging::init_tracing;

use super::args::{Cli, Commands};
use super::commands;

/// Main CLI execution function.
///
/// Returns `Ok(())` for exit code 0 and `Err(code)` otherwise, after
/// printing any output. main.rs only maps the code to a process exit.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        verbose: cli.verbose.then_some(true),
        manifest_dir: cli.manifest_dir.clone(),
        templates_dir: cli.templates_dir.clone(),
        max_concurrent: cli.max_concurrent,
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ {err:#}");
            return Err(exit_code_for(&err));
        }
    };

    if let Err(e) = init_tracing(config.logging.verbose) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Compile {
                goal,
                mode,
                slots,
                request_id,
                bypass_cache,
                seed,
                json,
            } => {
                let request = commands::build_request(
                    goal,
                    mode,
                    slots,
                    request_id,
                    bypass_cache,
                    seed,
                );
                commands::execute_compile_command(request, json, &config)
            }
            Commands::Templates(cmd) => commands::execute_templates_command(cmd, &config),
            Commands::Manifest(cmd) => commands::execute_manifest_command(cmd, &config),
            Commands::Batch { file, json } => {
                commands::execute_batch_command(&file, json, &config).await
            }
            Commands::Config { json } => commands::execute_config_command(json, &config),
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(err) => {
            match err.downcast_ref::<UpeError>() {
                Some(upe_err) => eprint!("{}", upe_err.display_for_user()),
                None => eprintln!("✗ {err:#}"),
            }
            Err(exit_code_for(&err))
        }
    }
}

/// Exit code for an error chain, from the first typed error found in it.
pub(crate) fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<UpeError>() {
            return e.to_exit_code();
        }
        if cause.is::<ConfigError>() || cause.is::<ValidationError>() {
            return ExitCode::CLI_ARGS;
        }
    }
    ExitCode::INTERNAL
}
