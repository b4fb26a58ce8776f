// Entrypoint for the CI step.
// - Reads the Actions environment, sets up logging and hands over to
//   `sync::run`.
// - Setup errors (missing token, missing host config) bubble up through
//   `anyhow` and exit with status 1.

use challenge_sync::config::Settings;
use challenge_sync::github::GithubClient;
use challenge_sync::sync;
use env_logger::Env;
use std::process::ExitCode;

fn init_logging(debug: bool) {
    // EVALAI_SYNC_DEBUG also turns on the HTTP stack's own logs.
    let default_filter = if debug {
        "debug,reqwest=debug,hyper=debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let settings = Settings::from_env()?;
    init_logging(settings.debug);

    let github = GithubClient::new(&settings.github_api_url, &settings.github_auth_token)?;
    let outcome = sync::run(&settings, &github)?;

    let script = env!("CARGO_BIN_NAME");
    if outcome.is_success() {
        println!("\nExiting the {} script after success\n", script);
    } else {
        println!("\nExiting the {} script after failure\n", script);
    }
    Ok(outcome.exit_code())
}
