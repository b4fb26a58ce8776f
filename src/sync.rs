// One sync run: host config -> URL -> archive -> POST -> report.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::process::ExitCode;

use crate::api::{ChallengeClient, Submission};
use crate::archive::create_challenge_zip;
use crate::config::{HostConfig, Mode, Settings, IGNORE_DIRS, IGNORE_FILES};
use crate::endpoint::{self, mask};
use crate::errors::Failure;
use crate::github::IssueTracker;
use crate::notify::{self, Notice, NotifyContext};

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Synced,
    /// The triggering commit came from the EvalAI sync bot.
    SkippedBotCommit,
    Failed { failure: Failure, notice: Notice },
}

impl RunOutcome {
    pub fn exit_status(&self) -> u8 {
        match self {
            RunOutcome::Synced | RunOutcome::SkippedBotCommit => 0,
            RunOutcome::Failed { .. } => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed { .. })
    }
}

/// Errors returned here are fatal setup problems (config, archive, client
/// construction); failures of the submission itself come back as
/// `RunOutcome::Failed`.
pub fn run(settings: &Settings, tracker: &dyn IssueTracker) -> Result<RunOutcome> {
    if settings.github_context.is_bot_commit() {
        info!("Sync from EvalAI, nothing to do");
        return Ok(RunOutcome::SkippedBotCommit);
    }

    let host = HostConfig::load(&settings.host_config_path)?;
    debug!("host config: {}", settings.host_config_path.display());
    debug!("mode: {}", settings.mode);
    debug!("GITHUB_REPOSITORY: {:?}", settings.github_repository);
    debug!("GITHUB_BRANCH: {:?}", settings.github_branch);
    debug!("GITHUB_EVENT_NAME: {:?}", settings.github_event_name);
    debug!("HOST_AUTH_TOKEN (masked): {}", mask(&host.token));
    debug!("GITHUB_AUTH_TOKEN (masked): {}", mask(&settings.github_auth_token));
    debug!("CHALLENGE_HOST_TEAM_PK: {}", host.team_pk);

    let client = ChallengeClient::new(&host.evalai_host_url, &host.token, settings.self_hosted_runner)?;
    info!("EvalAI Server: {}", host.evalai_host_url);
    info!("Localhost Mode: {}", client.is_localhost());
    info!("Self-hosted Runner: {}", settings.self_hosted_runner);
    info!("Challenge repository: {}", settings.repository_name());

    match settings.mode {
        Mode::Validate => info!("VALIDATION MODE: Validating challenge configuration..."),
        Mode::CreateOrUpdate => info!("CREATION MODE: Creating/updating challenge..."),
    }
    let url = endpoint::challenge_url(&host.evalai_host_url, settings.mode, &host.team_pk);
    info!("API Endpoint: {}", url);
    if endpoint::has_duplicated_segment(&url) {
        warn!("Detected suspicious segment '{}' in URL", endpoint::DUPLICATED_SEGMENT);
    }
    if settings.debug {
        client.preflight(&url);
    }

    info!("Creating challenge configuration package...");
    let stored = create_challenge_zip(
        &settings.challenge_dir,
        &settings.zip_path,
        &IGNORE_DIRS,
        &IGNORE_FILES,
    )
    .context("Failed to create challenge zip file")?;
    debug!("{} files packed into {}", stored, settings.zip_path.display());

    let failure = match Submission::from_file(
        &settings.zip_path,
        &settings.github_repository,
        &settings.github_auth_token,
    ) {
        Ok(submission) => client.submit(&url, &submission, settings.mode).err(),
        Err(e) => Some(Failure::Other(format!(
            "\nFollowing errors occurred while {} the challenge config: {:#}",
            settings.mode.verb(),
            e
        ))),
    };

    let failure = match failure {
        None => return Ok(RunOutcome::Synced),
        Some(f) => f,
    };

    // An unreachable server fails the job right away.
    if failure.is_connection() {
        return Ok(RunOutcome::Failed {
            failure,
            notice: Notice::NotReported,
        });
    }

    let ctx = NotifyContext {
        localhost: client.is_localhost(),
        self_hosted_runner: settings.self_hosted_runner,
        validation: settings.mode == Mode::Validate,
        pull_request: settings.is_pull_request(),
        pull_request_number: settings.github_context.pull_request_number(),
        repository: &settings.github_repository,
    };
    let notice = notify::dispatch(tracker, &ctx, &failure.message())
        .context("Failed to report errors to GitHub")?;
    Ok(RunOutcome::Failed { failure, notice })
}
