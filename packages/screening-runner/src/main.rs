use std::process::ExitCode;

use gaze_core::screening_disclaimer;
use screening_runner::logging::init_tracing;
use screening_runner::{prepare_system, score_session_file, RunnerConfig};

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = RunnerConfig::from_env();
    let _log_guard = init_tracing(&config);

    let handle = match prepare_system(&config) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "screening system unavailable");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match score_session_file(&handle, &config) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "session could not be scored");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialise outcome");
            return ExitCode::FAILURE;
        }
    }
    eprintln!("{}", screening_disclaimer());
    ExitCode::SUCCESS
}
