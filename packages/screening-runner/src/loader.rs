//! JSON files on disk: labelled training rows, fitted bundles and recorded
//! sessions.

use std::fs;
use std::path::Path;

use gaze_core::{GazeRow, GazeSample, ModelBundle, TrainingSet};

use crate::error::RunnerError;

fn read(path: &Path) -> Result<String, RunnerError> {
    fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))
}

/// Rows in recording order; every 1000 consecutive rows form one subject.
pub fn load_training_set(path: &Path) -> Result<TrainingSet, RunnerError> {
    let rows: Vec<GazeRow> = serde_json::from_str(&read(path)?).map_err(|e| RunnerError::json(path, e))?;
    let set = TrainingSet::from_rows(&rows);
    tracing::info!(
        path = %path.display(),
        rows = rows.len(),
        subjects = set.len(),
        positives = set.positives(),
        "training data loaded"
    );
    Ok(set)
}

pub fn load_bundle(path: &Path) -> Result<ModelBundle, RunnerError> {
    let bundle = ModelBundle::from_json(&read(path)?).map_err(|e| RunnerError::json(path, e))?;
    tracing::info!(path = %path.display(), models = bundle.models.len(), "model bundle loaded");
    Ok(bundle)
}

pub fn save_bundle(path: &Path, bundle: &ModelBundle) -> Result<(), RunnerError> {
    let json = bundle.to_json().map_err(|e| RunnerError::json(path, e))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RunnerError::io(parent, e))?;
    }
    fs::write(path, json).map_err(|e| RunnerError::io(path, e))?;
    tracing::info!(path = %path.display(), "model bundle saved");
    Ok(())
}

/// A recorded session: a JSON array of `{x, y, timestamp}` samples.
pub fn load_session(path: &Path) -> Result<Vec<GazeSample>, RunnerError> {
    let samples: Vec<GazeSample> = serde_json::from_str(&read(path)?).map_err(|e| RunnerError::json(path, e))?;
    tracing::debug!(path = %path.display(), samples = samples.len(), "session loaded");
    Ok(samples)
}
