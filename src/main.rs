//! Commander - Main entry point

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use commander::cli::Cli;
use commander::console::{report_elapsed, Console, TerminalConsole};
use commander::{process_guard, ConstantStore, Interpreter, ProcessGuard, RunConfig, Script};

/// Initialize logging: warnings and above unless RUST_LOG says otherwise
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_logger();

    // Stop running shell children if we are interrupted
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed: {:?}", cli);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            TerminalConsole.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let console = TerminalConsole;

    if !cli.file.is_file() {
        console.error("Specified file could not be found");
        return Ok(ExitCode::FAILURE);
    }

    let config = cli.apply_to(load_config(cli)?);
    config.validate()?;
    info!("Run configuration: {:?}", config);

    let script = Script::load(&cli.file)?;

    if cli.validate {
        return Ok(report_validation(&console, &script));
    }

    let mut constants: ConstantStore = cli.defines.iter().cloned().collect();

    let started = Instant::now();
    let outcome = Interpreter::new(config).run(&script, &mut constants);
    report_elapsed(&console, started.elapsed());

    info!(
        "Run {}: {} executed, {} skipped of {}",
        outcome.state, outcome.executed, outcome.skipped, outcome.total
    );

    if outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn report_validation(console: &TerminalConsole, script: &Script) -> ExitCode {
    let errors = script.definition_errors();
    if errors.is_empty() {
        console.success(&format!("Script is valid: {} step(s)", script.len()));
        return ExitCode::SUCCESS;
    }

    for (step, error) in &errors {
        console.error(&format!("Step {}: {}", step.index + 1, error));
    }
    console.error(&format!("{} invalid step(s)", errors.len()));
    ExitCode::FAILURE
}

fn load_config(cli: &Cli) -> Result<RunConfig> {
    cli.config
        .as_ref()
        .map(RunConfig::load_from_file)
        .transpose()
        .context("Invalid configuration")
        .map(|config| config.unwrap_or_default())
}
