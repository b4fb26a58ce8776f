// Minimal GitHub REST client used to report failures back to the repository.

use log::info;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Serialize;

const DEFAULT_USER_AGENT: &str = concat!("evalai-challenge-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("GitHub token is not a valid header value")]
    InvalidToken,

    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Where failure reports go. `GithubClient` is the real one; tests record.
pub trait IssueTracker {
    /// Post `body` as a comment on pull request `number` of `repo` (`owner/name`).
    fn comment_on_pull_request(&self, repo: &str, number: u64, body: &str) -> Result<(), GithubError>;

    /// Open an issue on `repo` (`owner/name`).
    fn open_issue(&self, repo: &str, title: &str, body: &str) -> Result<(), GithubError>;
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct IssueRequest<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_url: String,
}

impl GithubClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, GithubError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| GithubError::InvalidToken)?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let client = Client::builder().default_headers(headers).build()?;
        Ok(GithubClient {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn post<T: Serialize>(&self, path: &str, payload: &T) -> Result<(), GithubError> {
        let url = format!("{}{}", self.api_url, path);
        let res = self.client.post(&url).json(payload).send()?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().unwrap_or_default();
            return Err(GithubError::Status { status, body });
        }
        Ok(())
    }
}

impl IssueTracker for GithubClient {
    fn comment_on_pull_request(&self, repo: &str, number: u64, body: &str) -> Result<(), GithubError> {
        self.post(
            &format!("/repos/{}/issues/{}/comments", repo, number),
            &CommentRequest { body },
        )?;
        info!("Commented on pull request #{} of {}", number, repo);
        Ok(())
    }

    fn open_issue(&self, repo: &str, title: &str, body: &str) -> Result<(), GithubError> {
        self.post(&format!("/repos/{}/issues", repo), &IssueRequest { title, body })?;
        info!("Opened issue on {}", repo);
        Ok(())
    }
}
