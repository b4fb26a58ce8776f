// Error types shared by the sync flow.
//
// `ConfigError` covers everything that stops a run before any request is
// made. `Failure` is the classification of a failed submission; its
// `message()` is the text that ends up in the PR comment or issue body.

use std::path::PathBuf;

/// Fatal problems with the environment or the host config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Please add your github access token to the repository secrets with the name AUTH_TOKEN"
    )]
    MissingGithubToken,

    #[error("Could not read host config at {path}: {source}")]
    HostConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Host config at {path} is not valid JSON: {source}")]
    HostConfigInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Please add your EvalAI Host Team Auth Token and Challenge Host Team PK to {0}")]
    HostConfigIncomplete(PathBuf),

    #[error("GITHUB_CONTEXT is not valid JSON: {0}")]
    InvalidContext(#[source] serde_json::Error),
}

/// Why a submission did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Failure {
    /// The EvalAI server could not be reached at all.
    #[error("{message}")]
    Connection { localhost: bool, message: String },

    /// The server rejected the token (expired or unknown).
    #[error("{0}")]
    Token(String),

    /// Structured `error` field returned for one of the allow-listed codes.
    #[error("{0}")]
    Validation(String),

    /// Any other non-2xx status, surfaced raw.
    #[error("{0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

impl Failure {
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Failure::Connection { .. })
    }
}
