pub mod config;
pub mod error;
pub mod loader;
pub mod logging;

use gaze_core::{SessionOutcome, SystemHandle, TrainingSet};

pub use config::RunnerConfig;
pub use error::RunnerError;

/// Load the bundle named by `MODEL_BUNDLE`, or train from `TRAINING_DATA`
/// and persist the result when a bundle path is configured.
pub fn prepare_system(config: &RunnerConfig) -> Result<SystemHandle, RunnerError> {
    if let Some(path) = config.model_bundle.as_deref().filter(|p| p.exists()) {
        let bundle = loader::load_bundle(path)?;
        return Ok(SystemHandle::with_bundle(bundle, config.screening.clone())?);
    }

    let Some(data_path) = config.training_data.as_deref() else {
        return Err(RunnerError::NoModelSource);
    };
    let training: TrainingSet = loader::load_training_set(data_path)?;
    let mut handle = SystemHandle::initialize(training, config.screening.clone());
    let report = handle.train()?;
    for (model, reason) in &report.failures {
        tracing::warn!(%model, %reason, "model excluded from ensemble");
    }

    if let (Some(path), Some(bundle)) = (config.model_bundle.as_deref(), handle.bundle()) {
        loader::save_bundle(path, &bundle)?;
    }
    Ok(handle)
}

/// Score the recorded session named by `SESSION_FILE`.
pub fn score_session_file(handle: &SystemHandle, config: &RunnerConfig) -> Result<SessionOutcome, RunnerError> {
    let path = config.session_file.as_deref().ok_or(RunnerError::NoSession)?;
    let samples = loader::load_session(path)?;
    Ok(handle.score_recording(&samples)?)
}
