use std::path::PathBuf;

use gaze_core::SystemError;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("neither MODEL_BUNDLE nor TRAINING_DATA is set")]
    NoModelSource,
    #[error("SESSION_FILE is not set")]
    NoSession,
    #[error(transparent)]
    System(#[from] SystemError),
}

impl RunnerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
