//! File-driven runs: train from rows, persist the bundle, reload it and score
//! a recorded session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gaze_core::{GazeRow, GazeSample, GroupLabel, SessionOutcome};
use screening_runner::loader::{load_bundle, load_session, load_training_set, save_bundle};
use screening_runner::{prepare_system, score_session_file, RunnerConfig, RunnerError};

const DT: f64 = 1.0 / 60.0;

fn trace(n: usize, amplitude: f64, phase: f64) -> Vec<GazeSample> {
    (0..n)
        .map(|i| {
            let t = i as f64 * DT;
            GazeSample::new(
                960.0 + amplitude * (2.1 * t + phase).sin(),
                540.0 + amplitude * 0.6 * (1.3 * t).cos(),
                t,
            )
        })
        .collect()
}

fn write_rows(path: &Path, subjects: usize) {
    let mut rows = Vec::new();
    for s in 0..subjects {
        let label = (s % 2) as f64;
        let amplitude = if label > 0.0 { 480.0 } else { 40.0 } + 5.0 * s as f64;
        rows.extend(trace(1000, amplitude, s as f64 * 0.2).into_iter().map(|sample| GazeRow {
            x: sample.x,
            y: sample.y,
            timestamp: None,
            group: GroupLabel::Numeric(label),
        }));
    }
    std::fs::write(path, serde_json::to_string(&rows).unwrap()).unwrap();
}

fn write_session(path: &Path, samples: &[GazeSample]) {
    std::fs::write(path, serde_json::to_string(samples).unwrap()).unwrap();
}

fn runner_config(vars: &[(&str, PathBuf)]) -> RunnerConfig {
    let mut map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string_lossy().into_owned()))
        .collect();
    map.insert("BOOTSTRAP_ROUNDS".to_string(), "50".to_string());
    map.insert("ENSEMBLE_INCLUDE_MLP".to_string(), "false".to_string());
    RunnerConfig::from_lookup(move |key| map.get(key).cloned())
}

#[test]
fn test_training_rows_are_grouped_by_subject() {
    let dir = tempfile::tempdir().unwrap();
    let rows = dir.path().join("rows.json");
    write_rows(&rows, 4);

    let set = load_training_set(&rows).unwrap();
    assert_eq!(set.len(), 4);
    assert_eq!(set.positives(), 2);
}

#[test]
fn test_train_persist_reload_and_score() {
    let dir = tempfile::tempdir().unwrap();
    let rows = dir.path().join("rows.json");
    let bundle_path = dir.path().join("models").join("bundle.json");
    let session = dir.path().join("session.json");
    write_rows(&rows, 12);
    write_session(&session, &trace(300, 300.0, 0.4));

    let config = runner_config(&[
        ("TRAINING_DATA", rows),
        ("MODEL_BUNDLE", bundle_path.clone()),
        ("SESSION_FILE", session),
    ]);

    let trained = prepare_system(&config).unwrap();
    assert!(trained.is_ready());
    assert!(bundle_path.exists());

    let reloaded = prepare_system(&config).unwrap();
    assert!(reloaded.last_report().is_none());

    let a = score_session_file(&trained, &config).unwrap();
    let b = score_session_file(&reloaded, &config).unwrap();
    match (a, b) {
        (
            SessionOutcome::Completed { prediction: pa, .. },
            SessionOutcome::Completed { prediction: pb, .. },
        ) => {
            assert!((pa.probability - pb.probability).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&pa.probability));
        }
        other => panic!("unexpected outcomes {other:?}"),
    }
}

#[test]
fn test_bundle_save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let rows = dir.path().join("rows.json");
    write_rows(&rows, 8);
    let handle = prepare_system(&runner_config(&[("TRAINING_DATA", rows)])).unwrap();
    let bundle = handle.bundle().unwrap();

    let path = dir.path().join("bundle.json");
    save_bundle(&path, &bundle).unwrap();
    let loaded = load_bundle(&path).unwrap();
    assert_eq!(loaded.feature_names, bundle.feature_names);
    assert_eq!(loaded.models.len(), bundle.models.len());
    for (a, b) in loaded.weights.iter().zip(&bundle.weights) {
        assert!((a - b).abs() < 1e-12);
    }
    for (a, b) in loaded.scaler.means.iter().zip(&bundle.scaler.means) {
        assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
    }
}

#[test]
fn test_short_session_is_reported_as_insufficient() {
    let dir = tempfile::tempdir().unwrap();
    let rows = dir.path().join("rows.json");
    let session = dir.path().join("short.json");
    write_rows(&rows, 8);
    write_session(&session, &trace(20, 100.0, 0.0));

    let config = runner_config(&[("TRAINING_DATA", rows), ("SESSION_FILE", session)]);
    let handle = prepare_system(&config).unwrap();
    assert_eq!(
        score_session_file(&handle, &config).unwrap(),
        SessionOutcome::InsufficientData {
            collected: 20,
            required: 50
        }
    );
}

#[test]
fn test_missing_inputs_are_errors() {
    let dir = tempfile::tempdir().unwrap();

    let err = prepare_system(&runner_config(&[])).unwrap_err();
    assert!(matches!(err, RunnerError::NoModelSource));

    let err = load_session(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, RunnerError::Io { .. }));

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{ not json").unwrap();
    let err = load_bundle(&garbage).unwrap_err();
    assert!(matches!(err, RunnerError::Json { .. }));
}
