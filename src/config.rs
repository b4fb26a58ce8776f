// Configuration read once per run: the Actions environment and the host
// config file committed to the challenge repository.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

pub const HOST_CONFIG_FILE_PATH: &str = "github/host_config.json";
pub const CHALLENGE_CONFIG_VALIDATION_URL: &str =
    "/api/v1/challenges/challenge_host_team/{}/validate_challenge_config/";
pub const CHALLENGE_CREATE_OR_UPDATE_URL: &str =
    "/api/v1/challenges/challenge_host_team/{}/create_or_update_github_challenge/";
pub const API_HOST_URL: &str = "https://eval.ai";
pub const GITHUB_API_URL: &str = "https://api.github.com";
/// Status codes whose JSON body carries a structured `error` field.
pub const EVALAI_ERROR_CODES: [u16; 3] = [400, 401, 406];
pub const IGNORE_DIRS: [&str; 4] = [
    ".git",
    ".github",
    "code_upload_challenge_evaluation",
    "remote_challenge_evaluation",
];
pub const IGNORE_FILES: [&str; 5] = [
    ".gitignore",
    "challenge_config.zip",
    "README.md",
    "run.sh",
    "submission.json",
];
pub const CHALLENGE_ZIP_FILE_PATH: &str = "challenge_config.zip";
/// Commits pushed back by the EvalAI sync start with this prefix.
pub const BOT_COMMIT_PREFIX: &str = "evalai_bot";

/// Which endpoint the archive is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Validate,
    CreateOrUpdate,
}

impl Mode {
    /// `IS_VALIDATION` is written by workflow YAML, usually as `True`.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Mode::Validate,
            _ => Mode::CreateOrUpdate,
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            Mode::Validate => CHALLENGE_CONFIG_VALIDATION_URL,
            Mode::CreateOrUpdate => CHALLENGE_CREATE_OR_UPDATE_URL,
        }
    }

    /// Verb used in generic failure messages.
    pub fn verb(self) -> &'static str {
        match self {
            Mode::Validate => "validating",
            Mode::CreateOrUpdate => "processing",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Validate => write!(f, "validation"),
            Mode::CreateOrUpdate => write!(f, "create/update"),
        }
    }
}

/// `team_pk` is a number in most host configs but some are quoted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TeamPk {
    Number(u64),
    Text(String),
}

impl TeamPk {
    fn is_blank(&self) -> bool {
        match self {
            TeamPk::Number(_) => false,
            TeamPk::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for TeamPk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamPk::Number(n) => write!(f, "{}", n),
            TeamPk::Text(s) => write!(f, "{}", s.trim()),
        }
    }
}

fn default_host_url() -> String {
    API_HOST_URL.to_string()
}

/// Contents of `github/host_config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// EvalAI host auth token.
    pub token: String,
    pub team_pk: TeamPk,
    #[serde(default = "default_host_url")]
    pub evalai_host_url: String,
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::HostConfigUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HostConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::HostConfigInvalid {
                path: path.to_path_buf(),
                source,
            })?;
        if config.token.trim().is_empty()
            || config.team_pk.is_blank()
            || config.evalai_host_url.trim().is_empty()
        {
            return Err(ConfigError::HostConfigIncomplete(path.to_path_buf()));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    pub head_commit: Option<HeadCommit>,
    pub number: Option<u64>,
}

/// The subset of `GITHUB_CONTEXT` the flow looks at.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubContext {
    pub event: Option<EventPayload>,
}

impl GithubContext {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(ConfigError::InvalidContext)
    }

    pub fn is_bot_commit(&self) -> bool {
        self.event
            .as_ref()
            .and_then(|e| e.head_commit.as_ref())
            .map_or(false, |c| c.message.starts_with(BOT_COMMIT_PREFIX))
    }

    pub fn pull_request_number(&self) -> Option<u64> {
        self.event.as_ref().and_then(|e| e.number)
    }
}

/// Everything the run needs from the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub github_repository: String,
    pub github_auth_token: String,
    pub github_event_name: Option<String>,
    pub github_branch: String,
    pub github_context: GithubContext,
    pub github_api_url: String,
    pub mode: Mode,
    pub debug: bool,
    pub self_hosted_runner: bool,
    pub host_config_path: PathBuf,
    /// Directory that gets archived.
    pub challenge_dir: PathBuf,
    pub zip_path: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; tests pass a map instead of the
    /// real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let github_auth_token = lookup("GITHUB_AUTH_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingGithubToken)?;

        let context_raw = lookup("GITHUB_CONTEXT").unwrap_or_else(|| "{}".into());
        let github_context = GithubContext::parse(&context_raw)?;

        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let github_branch = non_empty("GITHUB_REF_NAME")
            .or_else(|| non_empty("GITHUB_BRANCH"))
            .or_else(|| non_empty("GITHUB_REF").map(|r| r.replace("refs/heads/", "")))
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "main".into());

        let debug = matches!(
            lookup("EVALAI_SYNC_DEBUG").as_deref(),
            Some("1" | "true" | "True" | "YES" | "yes")
        );

        let challenge_dir = PathBuf::from(".");
        Ok(Settings {
            github_repository: lookup("GITHUB_REPOSITORY").unwrap_or_default(),
            github_auth_token,
            github_event_name: lookup("GITHUB_EVENT_NAME"),
            github_branch,
            github_context,
            github_api_url: non_empty("GITHUB_API_URL").unwrap_or_else(|| GITHUB_API_URL.into()),
            mode: Mode::from_flag(lookup("IS_VALIDATION").as_deref()),
            debug,
            self_hosted_runner: lookup("RUNNER_ENVIRONMENT").as_deref() != Some("github-hosted"),
            host_config_path: non_empty("EVALAI_HOST_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(HOST_CONFIG_FILE_PATH)),
            zip_path: challenge_dir.join(CHALLENGE_ZIP_FILE_PATH),
            challenge_dir,
        })
    }

    pub fn is_pull_request(&self) -> bool {
        self.github_event_name.as_deref() == Some("pull_request")
    }

    /// Repository name without the owner, as shown in log lines.
    pub fn repository_name(&self) -> &str {
        self.github_repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.github_repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = Settings::from_lookup(lookup_from(&[("GITHUB_REPOSITORY", "o/r")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingGithubToken));

        let err = Settings::from_lookup(lookup_from(&[("GITHUB_AUTH_TOKEN", "  \n")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingGithubToken));
    }

    #[test]
    fn test_settings_defaults() {
        let s = Settings::from_lookup(lookup_from(&[("GITHUB_AUTH_TOKEN", " ghp_abc \n")])).unwrap();
        assert_eq!(s.github_auth_token, "ghp_abc");
        assert_eq!(s.github_repository, "");
        assert_eq!(s.github_branch, "main");
        assert_eq!(s.mode, Mode::CreateOrUpdate);
        assert!(!s.debug);
        assert!(s.self_hosted_runner);
        assert_eq!(s.github_api_url, GITHUB_API_URL);
        assert_eq!(s.host_config_path, PathBuf::from(HOST_CONFIG_FILE_PATH));
        assert!(!s.is_pull_request());
    }

    #[test]
    fn test_settings_from_actions_env() {
        let s = Settings::from_lookup(lookup_from(&[
            ("GITHUB_AUTH_TOKEN", "t"),
            ("GITHUB_REPOSITORY", "host/my-challenge"),
            ("GITHUB_REF", "refs/heads/challenge"),
            ("GITHUB_EVENT_NAME", "pull_request"),
            ("IS_VALIDATION", "True"),
            ("EVALAI_SYNC_DEBUG", "yes"),
            ("RUNNER_ENVIRONMENT", "github-hosted"),
            ("GITHUB_CONTEXT", r#"{"event": {"number": 12}}"#),
        ]))
        .unwrap();
        assert_eq!(s.github_branch, "challenge");
        assert_eq!(s.mode, Mode::Validate);
        assert!(s.debug);
        assert!(!s.self_hosted_runner);
        assert!(s.is_pull_request());
        assert_eq!(s.github_context.pull_request_number(), Some(12));
        assert_eq!(s.repository_name(), "my-challenge");
    }

    #[test]
    fn test_ref_name_wins_over_ref() {
        let s = Settings::from_lookup(lookup_from(&[
            ("GITHUB_AUTH_TOKEN", "t"),
            ("GITHUB_REF_NAME", "dev"),
            ("GITHUB_REF", "refs/heads/main"),
        ]))
        .unwrap();
        assert_eq!(s.github_branch, "dev");
    }

    #[test]
    fn test_invalid_context() {
        let err = Settings::from_lookup(lookup_from(&[
            ("GITHUB_AUTH_TOKEN", "t"),
            ("GITHUB_CONTEXT", "{not json"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidContext(_)));
    }

    #[test]
    fn test_mode_flag() {
        assert_eq!(Mode::from_flag(Some("True")), Mode::Validate);
        assert_eq!(Mode::from_flag(Some("true")), Mode::Validate);
        assert_eq!(Mode::from_flag(Some("1")), Mode::Validate);
        assert_eq!(Mode::from_flag(Some("False")), Mode::CreateOrUpdate);
        assert_eq!(Mode::from_flag(None), Mode::CreateOrUpdate);
    }

    #[test]
    fn test_bot_commit_detection() {
        let ctx = GithubContext::parse(
            r#"{"event": {"head_commit": {"message": "evalai_bot: sync from EvalAI"}}}"#,
        )
        .unwrap();
        assert!(ctx.is_bot_commit());

        let ctx =
            GithubContext::parse(r#"{"event": {"head_commit": {"message": "fix typo"}}}"#).unwrap();
        assert!(!ctx.is_bot_commit());

        // pull_request events carry no head_commit
        let ctx = GithubContext::parse(r#"{"event": {"number": 3}}"#).unwrap();
        assert!(!ctx.is_bot_commit());
        assert!(!GithubContext::default().is_bot_commit());
    }

    #[test]
    fn test_host_config_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host_config.json");

        fs::write(&path, r#"{"token": "abc", "team_pk": 7}"#).unwrap();
        let cfg = HostConfig::load(&path).unwrap();
        assert_eq!(cfg.token, "abc");
        assert_eq!(cfg.team_pk.to_string(), "7");
        assert_eq!(cfg.evalai_host_url, API_HOST_URL);

        fs::write(
            &path,
            r#"{"token": "abc", "team_pk": "42", "evalai_host_url": "http://localhost:8888"}"#,
        )
        .unwrap();
        let cfg = HostConfig::load(&path).unwrap();
        assert_eq!(cfg.team_pk, TeamPk::Text("42".into()));
        assert_eq!(cfg.evalai_host_url, "http://localhost:8888");
    }

    #[test]
    fn test_host_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host_config.json");

        assert!(matches!(
            HostConfig::load(&path),
            Err(ConfigError::HostConfigUnreadable { .. })
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            HostConfig::load(&path),
            Err(ConfigError::HostConfigInvalid { .. })
        ));

        fs::write(&path, r#"{"token": "", "team_pk": 1}"#).unwrap();
        assert!(matches!(
            HostConfig::load(&path),
            Err(ConfigError::HostConfigIncomplete(_))
        ));
    }
}
