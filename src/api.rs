// EvalAI client: sends the challenge archive to the host team endpoint and
// turns whatever comes back into either success or a `Failure`.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::{Mode, EVALAI_ERROR_CODES};
use crate::endpoint::{self, mask};
use crate::errors::Failure;

const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(10);
const BODY_PREVIEW_CHARS: usize = 2000;

/// The multipart payload: the zip plus the two repository fields.
#[derive(Debug, Clone)]
pub struct Submission {
    pub github_repository: String,
    pub github_auth_token: String,
    pub file_name: String,
    pub zip_bytes: Vec<u8>,
}

impl Submission {
    pub fn from_file(path: &Path, github_repository: &str, github_auth_token: &str) -> Result<Self> {
        let zip_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read archive {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("challenge_config.zip")
            .to_string();
        Ok(Submission {
            github_repository: github_repository.to_string(),
            github_auth_token: github_auth_token.to_string(),
            file_name,
            zip_bytes,
        })
    }

    fn form(&self) -> multipart::Form {
        let part = multipart::Part::bytes(self.zip_bytes.clone()).file_name(self.file_name.clone());
        multipart::Form::new()
            .text("GITHUB_REPOSITORY", self.github_repository.clone())
            .text("GITHUB_AUTH_TOKEN", self.github_auth_token.clone())
            .part("zip_configuration", part)
    }
}

/// Body shape of the allow-listed error responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error: Option<serde_json::Value>,
}

/// Blocking client bound to one EvalAI host.
#[derive(Clone)]
pub struct ChallengeClient {
    client: Client,
    host_url: String,
    token: String,
    headers: HeaderMap,
    localhost: bool,
    self_hosted_runner: bool,
}

impl ChallengeClient {
    /// Certificate checks are dropped for localhost hosts, which usually run
    /// with self-signed certificates. No overall request timeout is set.
    pub fn new(host_url: &str, token: &str, self_hosted_runner: bool) -> Result<Self> {
        let localhost = endpoint::is_localhost_url(host_url);
        if localhost {
            info!("SSL verification disabled for localhost development server");
        }
        let client = Client::builder()
            .danger_accept_invalid_certs(localhost)
            .timeout(None)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ChallengeClient {
            client,
            host_url: host_url.to_string(),
            token: token.to_string(),
            headers: auth_headers(token)?,
            localhost,
            self_hosted_runner,
        })
    }

    pub fn is_localhost(&self) -> bool {
        self.localhost
    }

    /// OPTIONS probe on each URL variant; only logs what comes back.
    pub fn preflight(&self, url: &str) {
        debug!("Preflight OPTIONS on candidates:");
        for candidate in endpoint::preflight_candidates(url) {
            match self
                .client
                .request(Method::OPTIONS, &candidate)
                .timeout(PREFLIGHT_TIMEOUT)
                .send()
            {
                Ok(res) => {
                    let allow = res
                        .headers()
                        .get("Allow")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("None")
                        .to_string();
                    debug!("   {}  ->  {}  Allow={}", candidate, res.status().as_u16(), allow);
                }
                Err(e) => debug!("   {}  ->  EXCEPTION: {}", candidate, e),
            }
        }
    }

    /// Send one multipart POST.
    pub fn send(&self, url: &str, submission: &Submission) -> Result<Response, reqwest::Error> {
        debug!(
            "POST {} Authorization=Bearer {} parts={:?}",
            url,
            mask(&self.token),
            ["zip_configuration", "GITHUB_REPOSITORY", "GITHUB_AUTH_TOKEN"]
        );
        self.client
            .post(url)
            .headers(self.headers.clone())
            .multipart(submission.form())
            .send()
    }

    /// Submit the archive and classify the outcome. A 404 on a URL with the
    /// duplicated segment is retried once with the segment removed.
    pub fn submit(&self, url: &str, submission: &Submission, mode: Mode) -> Result<(), Failure> {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message("Sending request to EvalAI server...");
        spinner.enable_steady_tick(Duration::from_millis(120));
        let result = self.send(url, submission);
        spinner.finish_and_clear();

        let response = result.map_err(|e| self.transport_failure(mode, e))?;
        let status = response.status();
        if is_success(status) {
            info!("Challenge processed successfully on EvalAI");
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        debug!(
            "Server response: status={} body (first 2k chars):\n{}",
            status,
            preview(&body)
        );

        if status == StatusCode::NOT_FOUND {
            if let Some(fixed_url) = endpoint::strip_duplicated_segment(url) {
                info!("Auto-retrying with fixed URL: {}", fixed_url);
                let retry = self
                    .send(&fixed_url, submission)
                    .map_err(|e| self.transport_failure(mode, e))?;
                let retry_status = retry.status();
                debug!("Retry status: {}", retry_status);
                if is_success(retry_status) {
                    info!("Challenge processed successfully on EvalAI (after retry)");
                    return Ok(());
                }
                let retry_body = retry.text().unwrap_or_default();
                debug!("Retry response (first 2k):\n{}", preview(&retry_body));
                return Err(self.status_failure(retry_status, &fixed_url, &retry_body, mode));
            }
        }

        Err(self.status_failure(status, url, &body, mode))
    }

    fn status_failure(&self, status: StatusCode, url: &str, body: &str, mode: Mode) -> Failure {
        if EVALAI_ERROR_CODES.contains(&status.as_u16()) {
            let parsed: ErrorBody = match serde_json::from_str(body) {
                Ok(b) => b,
                Err(e) => return self.generic_failure(mode, &e.to_string()),
            };
            if let Some(token_error) = parsed.detail.as_deref().and_then(token_message) {
                println!("{}", token_error);
                return Failure::Token(token_error.to_string());
            }
            let error = match parsed.error {
                Some(serde_json::Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => {
                    return self.generic_failure(mode, &format!("missing 'error' in response: {}", body))
                }
            };
            let message = format!(
                "\nFollowing errors occurred while validating the challenge config:\n{}",
                error
            );
            println!("{}", message);
            return Failure::Validation(message);
        }

        let raw = format!(
            "{} {} for url: {}",
            status.as_u16(),
            status_reason(status),
            url
        );
        println!(
            "\nFollowing errors occurred while validating the challenge config: {}",
            raw
        );
        Failure::Http(raw)
    }

    fn transport_failure(&self, mode: Mode, err: reqwest::Error) -> Failure {
        if !err.is_connect() {
            return self.generic_failure(mode, &err.to_string());
        }
        let message = if self.localhost {
            localhost_connection_message(&self.host_url, self.self_hosted_runner, &err.to_string())
        } else {
            format!("\nConnection failed to EvalAI server: {}", err)
        };
        println!("{}", message);
        Failure::Connection {
            localhost: self.localhost,
            message,
        }
    }

    fn generic_failure(&self, mode: Mode, detail: &str) -> Failure {
        let message = format!(
            "\nFollowing errors occurred while {} the challenge config: {}",
            mode.verb(),
            detail
        );
        warn!("{}", message.trim());
        Failure::Other(message)
    }
}

fn is_success(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

fn status_reason(status: StatusCode) -> &'static str {
    if status.is_client_error() {
        "Client Error"
    } else if status.is_server_error() {
        "Server Error"
    } else {
        "Unexpected Status"
    }
}

/// `Authorization: Bearer {token}` for the host token.
fn auth_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let val = format!("Bearer {}", token);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&val).context("Host token is not a valid header value")?,
    );
    Ok(headers)
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// Known `detail` values for a bad host token.
fn token_message(detail: &str) -> Option<&'static str> {
    match detail {
        "Invalid token" => Some(
            "\nThe authentication token you are using isn't valid. Please generate it again.\n",
        ),
        "Token has expired" => Some("\nSorry, the token has expired. Please generate it again.\n"),
        _ => None,
    }
}

/// Troubleshooting text for a localhost server that refused the connection.
pub fn localhost_connection_message(host_url: &str, self_hosted_runner: bool, original: &str) -> String {
    let mut m = String::from("\n🚨 LOCALHOST SERVER CONNECTION FAILED\n");
    m.push_str(&format!(
        "❌ Could not connect to your localhost EvalAI server at: {}\n",
        host_url
    ));
    m.push_str("\n📋 Please check the following:\n");
    m.push_str("   1. Is your EvalAI server running?\n");
    m.push_str(&format!("   2. Is it accessible at {}?\n", host_url));
    m.push_str("   3. Check server logs for any startup errors\n");
    if self_hosted_runner {
        m.push_str("\n💡 Self-hosted runner troubleshooting:\n");
        m.push_str("   • Verify runner can reach the server: ping/curl test\n");
        m.push_str("   • Check network configuration and firewall settings\n");
        m.push_str("   • Ensure server is binding to correct interface (0.0.0.0 vs 127.0.0.1)\n");
    } else {
        m.push_str("\n⚠️  CONFIGURATION ISSUE:\n");
        m.push_str("   You're using a GitHub-hosted runner with a localhost URL.\n");
        m.push_str("   GitHub-hosted runners cannot access your local machine.\n");
        m.push_str("   Please set up a self-hosted runner for localhost development.\n");
    }
    m.push_str("\n💡 To start your local server, typically run:\n");
    m.push_str("   python manage.py runserver 0.0.0.0:8888\n");
    m.push_str(&format!("\nOriginal error: {}", original));
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TeamPk;
    use mockito::Matcher;

    fn submission() -> Submission {
        Submission {
            github_repository: "host/challenge".into(),
            github_auth_token: "ghp_token".into(),
            file_name: "challenge_config.zip".into(),
            zip_bytes: b"PK\x05\x06fake".to_vec(),
        }
    }

    #[test]
    fn test_submit_created() {
        let mut server = mockito::Server::new();
        let path = "/api/v1/challenges/challenge_host_team/9/validate_challenge_config/";
        let m = server
            .mock("POST", path)
            .match_header("authorization", "Bearer host-token")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("name=\"GITHUB_REPOSITORY\"".into()),
                Matcher::Regex("host/challenge".into()),
                Matcher::Regex("name=\"GITHUB_AUTH_TOKEN\"".into()),
                Matcher::Regex("name=\"zip_configuration\"; filename=\"challenge_config.zip\"".into()),
            ]))
            .with_status(201)
            .with_body("{}")
            .expect(1)
            .create();

        let client = ChallengeClient::new(&server.url(), "host-token", true).unwrap();
        let url = endpoint::challenge_url(&server.url(), Mode::Validate, &TeamPk::Number(9));
        assert_eq!(client.submit(&url, &submission(), Mode::Validate), Ok(()));
        m.assert();
    }

    #[test]
    fn test_submit_retries_duplicated_segment_once() {
        let mut server = mockito::Server::new();
        let bad = server
            .mock("POST", "/api/v1/challenges/challenge/challenge_host_team/9/validate_challenge_config/")
            .with_status(404)
            .expect(1)
            .create();
        let good = server
            .mock("POST", "/api/v1/challenges/challenge_host_team/9/validate_challenge_config/")
            .with_status(200)
            .expect(1)
            .create();

        let client = ChallengeClient::new(&server.url(), "t", true).unwrap();
        let url = format!(
            "{}/api/v1/challenges/challenge/challenge_host_team/9/validate_challenge_config/",
            server.url()
        );
        assert_eq!(client.submit(&url, &submission(), Mode::Validate), Ok(()));
        bad.assert();
        good.assert();
    }

    #[test]
    fn test_submit_plain_404_is_not_retried() {
        let mut server = mockito::Server::new();
        let path = "/api/v1/challenges/challenge_host_team/9/validate_challenge_config/";
        let m = server.mock("POST", path).with_status(404).expect(1).create();

        let client = ChallengeClient::new(&server.url(), "t", true).unwrap();
        let url = format!("{}{}", server.url(), path);
        let failure = client.submit(&url, &submission(), Mode::Validate).unwrap_err();
        match failure {
            Failure::Http(raw) => {
                assert!(raw.starts_with("404 Client Error"));
                assert!(raw.ends_with(&url));
            }
            other => panic!("unexpected failure {:?}", other),
        }
        m.assert();
    }

    #[test]
    fn test_submit_structured_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", Matcher::Any)
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "challenge_config.yaml: missing key 'title'"}"#)
            .create();

        let client = ChallengeClient::new(&server.url(), "t", true).unwrap();
        let failure = client
            .submit(&format!("{}/x/", server.url()), &submission(), Mode::Validate)
            .unwrap_err();
        assert_eq!(
            failure,
            Failure::Validation(
                "\nFollowing errors occurred while validating the challenge config:\nchallenge_config.yaml: missing key 'title'"
                    .into()
            )
        );
    }

    #[test]
    fn test_submit_expired_token() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", Matcher::Any)
            .with_status(401)
            .with_body(r#"{"detail": "Token has expired"}"#)
            .create();

        let client = ChallengeClient::new(&server.url(), "t", true).unwrap();
        let failure = client
            .submit(&format!("{}/x/", server.url()), &submission(), Mode::CreateOrUpdate)
            .unwrap_err();
        assert!(matches!(failure, Failure::Token(ref m) if m.contains("expired")));
    }

    #[test]
    fn test_submit_unparsable_error_body() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", Matcher::Any)
            .with_status(406)
            .with_body("<html>nope</html>")
            .create();

        let client = ChallengeClient::new(&server.url(), "t", true).unwrap();
        let failure = client
            .submit(&format!("{}/x/", server.url()), &submission(), Mode::CreateOrUpdate)
            .unwrap_err();
        match failure {
            Failure::Other(m) => {
                assert!(m.contains("Following errors occurred while processing the challenge config"))
            }
            other => panic!("unexpected failure {:?}", other),
        }
    }

    #[test]
    fn test_submit_server_error_is_raw() {
        let mut server = mockito::Server::new();
        server.mock("POST", Matcher::Any).with_status(500).create();

        let client = ChallengeClient::new(&server.url(), "t", true).unwrap();
        let failure = client
            .submit(&format!("{}/x/", server.url()), &submission(), Mode::Validate)
            .unwrap_err();
        assert!(matches!(failure, Failure::Http(ref m) if m.starts_with("500 Server Error")));
    }

    #[test]
    fn test_localhost_connection_refused() {
        // Nothing listens on port 1.
        let client = ChallengeClient::new("http://127.0.0.1:1", "t", false).unwrap();
        assert!(client.is_localhost());
        let failure = client
            .submit("http://127.0.0.1:1/api/", &submission(), Mode::Validate)
            .unwrap_err();
        match failure {
            Failure::Connection { localhost, message } => {
                assert!(localhost);
                assert!(message.contains("LOCALHOST SERVER CONNECTION FAILED"));
                assert!(message.contains("GitHub-hosted runners cannot access"));
            }
            other => panic!("unexpected failure {:?}", other),
        }
    }

    #[test]
    fn test_localhost_message_for_self_hosted_runner() {
        let m = localhost_connection_message("http://localhost:8888", true, "refused");
        assert!(m.contains("Self-hosted runner troubleshooting"));
        assert!(!m.contains("CONFIGURATION ISSUE"));
        assert!(m.ends_with("Original error: refused"));
    }
}
