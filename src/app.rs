//! One orchestration flow for both the interactive desktop run and the
//! unattended headless run. The two differ only in what happens when the
//! schedule or the credential store comes up empty.

use std::path::PathBuf;

use chrono::{Datelike, Local};
use thiserror::Error;
use tracing::{error, info};

use crate::config::{self, AppConfig, ConfigError};
use crate::credentials::store::EnvStore;
use crate::credentials::vault::PasswordVault;
use crate::credentials::{self, CredentialError, CredentialPrompter};
use crate::schedule;
use crate::submit::{AttendanceOutcome, AttendanceSubmitter};

/// Filesystem locations for everything a run touches. Constructed by the
/// binary from CLI flags; nothing in the library reads process environment.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub schedule: PathBuf,
    pub env_file: PathBuf,
    pub key_file: PathBuf,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("no class is scheduled for the current attendance window")]
    ScheduleUnresolved,
    #[error("classroom prompt failed: {0}")]
    Prompt(String),
}

/// Runs one attendance attempt end to end and returns the submitter's
/// outcome. In interactive mode missing schedule data or credentials degrade
/// to prompts; in fail-fast mode they are errors, so unattended runs surface
/// problems instead of hanging on stdin.
pub fn run(
    config: &AppConfig,
    paths: &AppPaths,
    interactive: bool,
    prompter: &mut dyn CredentialPrompter,
    submitter: &dyn AttendanceSubmitter,
) -> Result<AttendanceOutcome, AppError> {
    let week_schedule = config::load_schedule(&paths.schedule)?;

    let now = Local::now().naive_local();
    let classroom =
        match schedule::resolve_current_class(&week_schedule, &config.period_config, &now) {
            Some(resolved) => {
                info!(
                    weekday = schedule::weekday_abbrev(now.weekday()),
                    period = resolved.period,
                    classroom = %resolved.entry.classroom,
                    "resolved current class"
                );
                if interactive {
                    choose_classroom(prompter, Some(resolved.entry.classroom.as_str()))?
                } else {
                    resolved.entry.classroom.clone()
                }
            }
            None if interactive => {
                info!("no class resolved for the current time; asking for a classroom");
                choose_classroom(prompter, None)?
            }
            None => return Err(AppError::ScheduleUnresolved),
        };

    let vault = PasswordVault::load_or_create(&paths.key_file).map_err(CredentialError::from)?;
    let mut store = EnvStore::load(&paths.env_file).map_err(CredentialError::from)?;
    let credential =
        credentials::resolve_credentials(&mut store, &paths.env_file, &vault, prompter, interactive)?;

    let outcome = submitter.submit(&credential.username, credential.password.as_str(), &classroom);
    match &outcome {
        AttendanceOutcome::Failed(reason) => error!(%reason, "submission failed"),
        other => info!(outcome = %other, "submission finished"),
    }
    Ok(outcome)
}

/// Offers the resolved classroom for confirmation or override; with no
/// resolution the answer itself becomes the classroom.
fn choose_classroom(
    prompter: &mut dyn CredentialPrompter,
    default: Option<&str>,
) -> Result<String, AppError> {
    let answer = prompter
        .prompt_classroom(default)
        .map_err(|e| AppError::Prompt(format!("{e}")))?;
    let trimmed = answer.trim();

    match (trimmed.is_empty(), default) {
        (false, _) => Ok(trimmed.to_string()),
        (true, Some(default)) => Ok(default.to_string()),
        (true, None) => Err(AppError::Prompt("classroom cannot be empty".to_string())),
    }
}
