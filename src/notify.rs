// Chooses where a failed run is reported and carries it out.

use log::{info, warn};

use crate::github::{GithubError, IssueTracker};

pub const ISSUE_TITLE: &str = "Following errors occurred while validating the challenge config:";

/// What was done with a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Known localhost failure; nothing is posted to GitHub.
    SkippedLocalhost { github_hosted: bool },
    /// PR context without a PR number in the event payload.
    SkippedMissingPullRequest,
    /// Not reported: the failure is fatal before any notification.
    NotReported,
    PullRequestComment(u64),
    Issue,
}

/// Inputs to the reporting decision.
#[derive(Debug, Clone, Copy)]
pub struct NotifyContext<'a> {
    pub localhost: bool,
    pub self_hosted_runner: bool,
    pub validation: bool,
    pub pull_request: bool,
    pub pull_request_number: Option<u64>,
    pub repository: &'a str,
}

/// Pure decision; `dispatch` performs it.
pub fn decide(ctx: &NotifyContext<'_>, errors: &str) -> Notice {
    let localhost_connection_error = ctx.localhost
        && (errors.contains("Connection refused")
            || errors.contains("LOCALHOST SERVER CONNECTION FAILED"));
    let github_hosted_localhost_error =
        ctx.localhost && !ctx.self_hosted_runner && errors.contains("Connection");

    if localhost_connection_error || github_hosted_localhost_error {
        return Notice::SkippedLocalhost {
            github_hosted: github_hosted_localhost_error,
        };
    }
    if ctx.validation && ctx.pull_request {
        return match ctx.pull_request_number {
            Some(n) => Notice::PullRequestComment(n),
            None => Notice::SkippedMissingPullRequest,
        };
    }
    Notice::Issue
}

pub fn dispatch(
    tracker: &dyn IssueTracker,
    ctx: &NotifyContext<'_>,
    errors: &str,
) -> Result<Notice, GithubError> {
    let notice = decide(ctx, errors);
    match &notice {
        Notice::SkippedLocalhost { github_hosted } => {
            info!("Localhost connection error detected. Skipping GitHub issue creation.");
            if *github_hosted {
                info!("This is expected when using GitHub-hosted runners with localhost URLs.");
                info!("Please configure a self-hosted runner for local development.");
            } else {
                info!("This is expected when your local EvalAI server isn't running.");
            }
        }
        Notice::SkippedMissingPullRequest => {
            warn!("Could not get PR number from GITHUB_CONTEXT, skipping pull request comment creation");
        }
        Notice::PullRequestComment(number) => {
            tracker.comment_on_pull_request(ctx.repository, *number, errors)?;
        }
        Notice::Issue => {
            tracker.open_issue(ctx.repository, ISSUE_TITLE, errors)?;
        }
        Notice::NotReported => {}
    }
    Ok(notice)
}
