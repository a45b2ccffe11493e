// ABOUTME: Entry point for the gitship CLI application.
// ABOUTME: Collects parameters, opens the action log and runs the chosen flow until done or interrupted.

mod cli;

use clap::Parser;
use cli::Cli;
use gitship::config::{self, FileConfig, expand_home};
use gitship::error::{PipelineError, Stage};
use gitship::log::ActionLog;
use gitship::output::{Output, OutputMode};
use gitship::pipeline::{self, Completion, Mode, RunContext};
use gitship::types::Secret;
use std::env;
use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

const TOKEN_ENV: &str = "GITSHIP_TOKEN";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let mode = if cli.cleanup {
        Mode::Cleanup
    } else {
        Mode::Deploy
    };
    let mut output = Output::new(OutputMode::from_flags(cli.quiet, cli.json));

    let file_config = load_file_config(&cli);
    let log_path = cli
        .log_file
        .clone()
        .or_else(|| file_config.as_ref().ok().and_then(|c| c.log_file.clone()))
        .map(|p| expand_home(&p))
        .unwrap_or_else(ActionLog::default_path);

    let log = match ActionLog::open(&log_path) {
        Ok(log) => log,
        Err(e) => {
            output.error(&format!(
                "cannot open action log {}: {e}",
                log_path.display()
            ));
            return Stage::Validation.exit_code();
        }
    };

    let credential = read_credential(mode);
    log.redact_secret(&credential);
    log.header(&mode.to_string());

    output.start_timer();
    let mut ctx = RunContext::new(log, output);

    let completion = match file_config {
        Err(source) => Completion::Failed(PipelineError::InvalidInput { source }),
        Ok(file_config) => {
            let raw = file_config.fill(cli.raw_parameters(credential));
            let settings = file_config.settings();

            tokio::select! {
                result = pipeline::run(mode, &raw, &settings, &mut ctx) => match result {
                    Ok(summary) => Completion::Succeeded { summary },
                    Err(e) => Completion::Failed(e),
                },
                () = termination() => Completion::Interrupted,
            }
        }
    };

    ctx.finish(completion).exit_code
}

/// Resolves on Ctrl-C or SIGTERM. A handler that cannot be installed never fires.
async fn termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Config file from `--config`, or one discovered in the current directory.
fn load_file_config(cli: &Cli) -> config::Result<FileConfig> {
    match &cli.config {
        Some(path) => FileConfig::load(&expand_home(path)),
        None => Ok(FileConfig::discover(&env::current_dir()?)?.unwrap_or_default()),
    }
}

/// Access token from the environment, or a masked prompt when attached to a terminal.
fn read_credential(mode: Mode) -> Secret {
    if let Ok(token) = env::var(TOKEN_ENV) {
        return Secret::new(token.trim());
    }
    if mode == Mode::Cleanup || !std::io::stdin().is_terminal() {
        return Secret::default();
    }

    match dialoguer::Password::new()
        .with_prompt("Repository access token (leave empty for a public repository)")
        .allow_empty_password(true)
        .interact()
    {
        Ok(token) => Secret::new(token.trim()),
        Err(e) => {
            tracing::warn!("Could not read access token: {e}");
            Secret::default()
        }
    }
}
