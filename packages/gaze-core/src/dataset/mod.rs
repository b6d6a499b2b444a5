//! Labelled gaze recordings used to train the ensemble.
//!
//! The flat row layout mirrors the public eye-tracking export: one row per
//! gaze sample, subjects stored as consecutive blocks of
//! [`SUBJECT_BLOCK_ROWS`] rows, a group column carrying the label.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::features::{FeatureExtractor, FeatureVector};
use crate::types::{GazeSample, MIN_SESSION_SAMPLES};

pub const SUBJECT_BLOCK_ROWS: usize = 1000;
/// Rate used to synthesise timestamps for rows that carry none (Hz).
pub const RECORDING_RATE_HZ: f64 = 60.0;

/// Group column value: numeric (non-zero is positive) or a group name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupLabel {
    Numeric(f64),
    Text(String),
}

impl GroupLabel {
    pub fn to_binary(&self) -> Option<u8> {
        match self {
            GroupLabel::Numeric(v) if v.is_finite() => Some(u8::from(*v != 0.0)),
            GroupLabel::Numeric(_) => None,
            GroupLabel::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "asd" | "autism" | "autistic" | "positive" | "1" => Some(1),
                "td" | "typical" | "control" | "negative" | "0" => Some(0),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeRow {
    #[serde(alias = "Point of Regard Left X [px]")]
    pub x: f64,
    #[serde(alias = "Point of Regard Left Y [px]")]
    pub y: f64,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(alias = "Group")]
    pub group: GroupLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSession {
    pub subject_id: usize,
    pub label: u8,
    pub samples: Vec<GazeSample>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSet {
    pub sessions: Vec<LabeledSession>,
}

impl TrainingSet {
    pub fn new(sessions: Vec<LabeledSession>) -> Self {
        Self { sessions }
    }

    /// Group rows into subjects of `SUBJECT_BLOCK_ROWS` consecutive rows.
    /// Subjects with fewer than `MIN_SESSION_SAMPLES` rows, or whose first row
    /// has no usable label, are dropped. Missing timestamps become
    /// `row_index / 60`.
    pub fn from_rows(rows: &[GazeRow]) -> Self {
        let mut sessions = Vec::new();
        for (subject_id, block) in rows.chunks(SUBJECT_BLOCK_ROWS).enumerate() {
            if block.len() < MIN_SESSION_SAMPLES {
                tracing::debug!(subject_id, rows = block.len(), "subject too short, skipped");
                continue;
            }
            let Some(label) = block[0].group.to_binary() else {
                tracing::warn!(subject_id, group = ?block[0].group, "unrecognised group label, skipped");
                continue;
            };
            let base = subject_id * SUBJECT_BLOCK_ROWS;
            let samples = block
                .iter()
                .enumerate()
                .map(|(offset, row)| {
                    let timestamp = row
                        .timestamp
                        .unwrap_or((base + offset) as f64 / RECORDING_RATE_HZ);
                    GazeSample::new(row.x, row.y, timestamp)
                })
                .collect();
            sessions.push(LabeledSession {
                subject_id,
                label,
                samples,
            });
        }
        tracing::info!(rows = rows.len(), subjects = sessions.len(), "training set assembled");
        Self { sessions }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.sessions.iter().filter(|s| s.label == 1).count()
    }

    /// Feature vectors and labels, one per session, extracted in parallel.
    pub fn extract_features(&self, extractor: &FeatureExtractor) -> (Vec<FeatureVector>, Vec<u8>) {
        self.sessions
            .par_iter()
            .map(|s| (extractor.extract(&s.samples), s.label))
            .unzip()
    }
}
