// Library root
// -----------
// The binary (`main.rs`) runs one sync of a challenge repository against
// an EvalAI host. Everything it does lives in these modules so the flow can
// be tested against mock servers.
//
// Module responsibilities:
// - `config`: Actions environment and `github/host_config.json`.
// - `endpoint`: challenge URL building and host classification.
// - `archive`: zips the challenge directory.
// - `api`: posts the archive to EvalAI and classifies failures.
// - `github`: posts PR comments and issues.
// - `notify`: picks which of those (if any) a failure gets.
// - `sync`: the run itself, wiring the above together.
pub mod api;
pub mod archive;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod github;
pub mod notify;
pub mod sync;
