use std::path::PathBuf;

use gaze_core::ScreeningConfig;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub log_level: String,
    pub file_logs: bool,
    pub log_dir: PathBuf,
    /// Row-per-sample JSON used to train when no bundle is available.
    pub training_data: Option<PathBuf>,
    /// Fitted ensemble; loaded if present, written after training otherwise.
    pub model_bundle: Option<PathBuf>,
    /// Recorded session (JSON array of samples) to score.
    pub session_file: Option<PathBuf>,
    pub screening: ScreeningConfig,
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let file_logs = lookup("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let log_dir = path("LOG_DIR").unwrap_or_else(|| PathBuf::from("./logs"));

        Self {
            log_level,
            file_logs,
            log_dir,
            training_data: path("TRAINING_DATA"),
            model_bundle: path("MODEL_BUNDLE"),
            session_file: path("SESSION_FILE"),
            screening: ScreeningConfig::from_lookup(&lookup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::from_lookup(|_| None);
        assert_eq!(config.log_level, "info");
        assert!(!config.file_logs);
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
        assert!(config.training_data.is_none());
        assert!(config.model_bundle.is_none());
        assert!(config.session_file.is_none());
    }

    #[test]
    fn test_paths_and_flags() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("RUST_LOG", "debug"),
            ("ENABLE_FILE_LOGS", "1"),
            ("LOG_DIR", "/tmp/screening"),
            ("TRAINING_DATA", "data/rows.json"),
            ("MODEL_BUNDLE", "  "),
            ("SESSION_FILE", "session.json"),
            ("BOOTSTRAP_ROUNDS", "250"),
        ]));
        assert_eq!(config.log_level, "debug");
        assert!(config.file_logs);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/screening"));
        assert_eq!(config.training_data, Some(PathBuf::from("data/rows.json")));
        assert!(config.model_bundle.is_none());
        assert_eq!(config.session_file, Some(PathBuf::from("session.json")));
        assert_eq!(config.screening.predictor.bootstrap_rounds, 250);
    }

    #[test]
    fn test_file_logs_only_for_true_or_one() {
        let config = RunnerConfig::from_lookup(lookup(&[("ENABLE_FILE_LOGS", "yes")]));
        assert!(!config.file_logs);
    }
}
