use serde::{Deserialize, Serialize};

use crate::ensemble::{PredictorConfig, TrainingConfig};
use crate::events::DetectorKind;
use crate::features::FeatureExtractorConfig;
use crate::pipeline::SessionConfig;
use crate::types::ScreenGeometry;

/// Every tunable of the screening core in one place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreeningConfig {
    pub session: SessionConfig,
    pub features: FeatureExtractorConfig,
    pub training: TrainingConfig,
    pub predictor: PredictorConfig,
}

impl ScreeningConfig {
    /// Defaults overridden by `SCREEN_WIDTH`, `SCREEN_HEIGHT`,
    /// `SESSION_MAX_SECONDS`, `SESSION_MAX_FRAMES`, `MIN_SESSION_SAMPLES`,
    /// `BOOTSTRAP_ROUNDS`, `EVENT_DETECTOR` and `ENSEMBLE_INCLUDE_MLP`.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|value| value.trim().parse::<f64>().ok());
        let count = |key: &str| lookup(key).and_then(|value| value.trim().parse::<usize>().ok());

        let mut config = Self::default();

        let default_screen = ScreenGeometry::default();
        let screen = ScreenGeometry {
            width: parsed("SCREEN_WIDTH")
                .filter(|w| *w > 0.0)
                .unwrap_or(default_screen.width),
            height: parsed("SCREEN_HEIGHT")
                .filter(|h| *h > 0.0)
                .unwrap_or(default_screen.height),
        };
        config.set_screen(screen);

        if let Some(secs) = parsed("SESSION_MAX_SECONDS").filter(|s| *s > 0.0) {
            config.session.max_duration_secs = secs;
        }
        if let Some(frames) = count("SESSION_MAX_FRAMES").filter(|n| *n > 0) {
            config.session.max_frames = frames;
        }
        if let Some(min) = count("MIN_SESSION_SAMPLES") {
            config.session.min_samples = min;
        }
        if let Some(rounds) = count("BOOTSTRAP_ROUNDS") {
            config.predictor.bootstrap_rounds = rounds;
        }
        if let Some(kind) = lookup("EVENT_DETECTOR").and_then(|v| DetectorKind::parse(&v)) {
            config.features.detector = kind;
        }
        if let Some(include) = lookup("ENSEMBLE_INCLUDE_MLP").and_then(|v| parse_flag(&v)) {
            config.training = config.training.with_neural_network(include);
        }

        config
    }

    /// Keep the session mapper and the spatial histogram on the same screen.
    pub fn set_screen(&mut self, screen: ScreenGeometry) {
        self.session.screen = screen;
        self.features.screen = screen;
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelFamily;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = ScreeningConfig::from_lookup(|_| None);
        assert_eq!(config.session.max_duration_secs, 120.0);
        assert_eq!(config.session.min_samples, 50);
        assert_eq!(config.predictor.bootstrap_rounds, 1000);
        assert_eq!(config.features.detector, DetectorKind::Adaptive);
        assert_eq!(config.training.families.len(), 4);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = ScreeningConfig::from_lookup(lookup(&[
            ("SCREEN_WIDTH", "1280"),
            ("SCREEN_HEIGHT", "720"),
            ("SESSION_MAX_SECONDS", "30"),
            ("BOOTSTRAP_ROUNDS", "200"),
            ("EVENT_DETECTOR", "Fixed"),
            ("ENSEMBLE_INCLUDE_MLP", "false"),
        ]));
        assert_eq!(config.session.screen.width, 1280.0);
        assert_eq!(config.features.screen.height, 720.0);
        assert_eq!(config.session.max_duration_secs, 30.0);
        assert_eq!(config.predictor.bootstrap_rounds, 200);
        assert_eq!(config.features.detector, DetectorKind::Fixed);
        assert!(!config.training.families.contains(&ModelFamily::NeuralNetwork));
    }

    #[test]
    fn test_unparsable_values_are_ignored() {
        let config = ScreeningConfig::from_lookup(lookup(&[
            ("SCREEN_WIDTH", "wide"),
            ("SESSION_MAX_FRAMES", "-3"),
            ("EVENT_DETECTOR", "magic"),
            ("ENSEMBLE_INCLUDE_MLP", "maybe"),
        ]));
        assert_eq!(config.session.screen.width, 1920.0);
        assert_eq!(config.session.max_frames, 7200);
        assert_eq!(config.features.detector, DetectorKind::Adaptive);
        assert_eq!(config.training.families.len(), 4);
    }
}
