//! Command-line front end: argument parsing, logging setup, terminal
//! prompts, and exit-code mapping around the library flow.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use autoattend::app::{self, AppPaths};
use autoattend::config;
use autoattend::credentials::CredentialPrompter;
use autoattend::submit::{AttendanceOutcome, WebDriverSubmitter};

/// Automated class attendance check-in driven by a weekly schedule.
#[derive(Parser)]
#[command(name = "autoattend", version, about)]
struct Cli {
    /// Period timing, portal, and webdriver configuration
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Weekly classroom schedule
    #[arg(long, default_value = "classroom_schedule.yaml")]
    schedule: PathBuf,

    /// Credential store file
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Encryption key file
    #[arg(long, default_value = "secret.key")]
    key_file: PathBuf,

    /// Never prompt; fail when the schedule or credentials are incomplete
    #[arg(long)]
    non_interactive: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

struct ConsolePrompter;

impl CredentialPrompter for ConsolePrompter {
    fn prompt_username(&mut self) -> io::Result<String> {
        read_line("Enter your username: ")
    }

    fn prompt_password(&mut self) -> io::Result<String> {
        rpassword::prompt_password("Enter your password: ")
    }

    fn prompt_classroom(&mut self, default: Option<&str>) -> io::Result<String> {
        match default {
            Some(room) => read_line(&format!(
                "Classroom [{room}] (press Enter to accept or type to override): "
            )),
            None => read_line("Could not detect classroom. Please enter manually: "),
        }
    }
}

fn read_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn execute(cli: Cli) -> anyhow::Result<AttendanceOutcome> {
    let config = config::load_config(&cli.config)?;
    let submitter = WebDriverSubmitter::new(config.portal.clone(), config.webdriver.clone())
        .map_err(|e| anyhow::anyhow!("webdriver client setup failed: {e}"))?;

    let paths = AppPaths {
        schedule: cli.schedule,
        env_file: cli.env_file,
        key_file: cli.key_file,
    };
    let mut prompter = ConsolePrompter;

    Ok(app::run(
        &config,
        &paths,
        !cli.non_interactive,
        &mut prompter,
        &submitter,
    )?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "autoattend=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match execute(cli) {
        // "No class" and "already attended" are ordinary outcomes for a run
        // fired on a timer; only a hard failure should look like one.
        Ok(AttendanceOutcome::Failed(_)) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "run aborted");
            ExitCode::FAILURE
        }
    }
}
