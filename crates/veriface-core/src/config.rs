use crate::challenge::ChallengeKind;
use crate::matcher::MatchThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Engine configuration: liveness cadence and matching cutoffs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub liveness: LivenessConfig,
    pub matching: MatchThresholds,
}

/// Liveness session timing and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Delay between polls of the same challenge.
    pub poll_interval_ms: u64,
    /// Polls per challenge before moving on with it uncompleted.
    pub attempts_per_challenge: u32,
    /// Pause between challenges so the subject can reset posture.
    pub settle_delay_ms: u64,
    /// Minimum completed/total ratio for a passing session.
    pub pass_ratio: f64,
    /// Challenges in the order they are presented.
    pub challenges: Vec<ChallengeKind>,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            attempts_per_challenge: 50,
            settle_delay_ms: 500,
            pass_ratio: 0.66,
            challenges: ChallengeKind::DEFAULT_SEQUENCE.to_vec(),
        }
    }
}

impl LivenessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Config {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    /// Defaults overridden by `VERIFACE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `VERIFACE_*` environment variables.
    ///
    /// Unset or unparseable variables leave the current value in place.
    /// The result is validated as a whole.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok());
        self.validate()
    }

    /// Reject values the matcher and scorer cannot honour.
    ///
    /// The high-confidence cutoff must not exceed the match cutoff, so a
    /// `high` tier is always a match. The pass ratio must be in `(0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matching;
        if !m.high_confidence.is_finite() || !m.match_distance.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "match thresholds must be finite (high_confidence={}, match_distance={})",
                m.high_confidence, m.match_distance
            )));
        }
        if !(m.high_confidence > 0.0 && m.high_confidence <= m.match_distance) {
            return Err(ConfigError::Invalid(format!(
                "need 0 < high_confidence <= match_distance, got {} and {}",
                m.high_confidence, m.match_distance
            )));
        }

        let ratio = self.liveness.pass_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "pass_ratio must be in (0, 1], got {ratio}"
            )));
        }
        Ok(())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let l = &mut self.liveness;
        override_parsed(&lookup, "VERIFACE_POLL_INTERVAL_MS", &mut l.poll_interval_ms);
        override_parsed(&lookup, "VERIFACE_ATTEMPTS_PER_CHALLENGE", &mut l.attempts_per_challenge);
        override_parsed(&lookup, "VERIFACE_SETTLE_DELAY_MS", &mut l.settle_delay_ms);
        override_parsed(&lookup, "VERIFACE_PASS_RATIO", &mut l.pass_ratio);

        if let Some(raw) = lookup("VERIFACE_CHALLENGES") {
            match raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<ChallengeKind>, _>>()
            {
                Ok(kinds) => l.challenges = kinds,
                Err(e) => tracing::warn!(error = %e, "ignoring VERIFACE_CHALLENGES"),
            }
        }

        let m = &mut self.matching;
        override_parsed(&lookup, "VERIFACE_HIGH_CONFIDENCE_DISTANCE", &mut m.high_confidence);
        override_parsed(&lookup, "VERIFACE_MATCH_DISTANCE", &mut m.match_distance);
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *field = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.liveness.poll_interval(), Duration::from_millis(100));
        assert_eq!(c.liveness.attempts_per_challenge, 50);
        assert_eq!(c.liveness.settle_delay(), Duration::from_millis(500));
        assert_eq!(c.liveness.pass_ratio, 0.66);
        assert_eq!(c.liveness.challenges, ChallengeKind::DEFAULT_SEQUENCE.to_vec());
        assert_eq!(c.matching.high_confidence, 0.4);
        assert_eq!(c.matching.match_distance, 0.6);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = Config::from_toml_str(
            r#"
            [liveness]
            attempts_per_challenge = 10
            challenges = ["blink", "nod"]
            "#,
        )
        .unwrap();
        assert_eq!(c.liveness.attempts_per_challenge, 10);
        assert_eq!(c.liveness.poll_interval_ms, 100);
        assert_eq!(c.liveness.challenges, vec![ChallengeKind::Blink, ChallengeKind::Nod]);
        assert_eq!(c.matching, MatchThresholds::default());
    }

    #[test]
    fn test_bad_toml() {
        let err = Config::from_toml_str("[liveness]\nchallenges = [\"wink\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let text = toml::to_string(&Config::default()).unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), Config::default());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VERIFACE_POLL_INTERVAL_MS", "5"),
            ("VERIFACE_PASS_RATIO", "not-a-number"),
            ("VERIFACE_CHALLENGES", "smile, nod"),
            ("VERIFACE_MATCH_DISTANCE", "0.55"),
        ]
        .into_iter()
        .collect();

        let mut c = Config::default();
        c.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(c.liveness.poll_interval_ms, 5);
        assert_eq!(c.liveness.pass_ratio, 0.66);
        assert_eq!(c.liveness.challenges, vec![ChallengeKind::Smile, ChallengeKind::Nod]);
        assert_eq!(c.matching.match_distance, 0.55);
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = Config::from_toml_str(
            r#"
            [matching]
            high_confidence = 0.7
            match_distance = 0.6
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_equal_thresholds_accepted() {
        let c = Config::from_toml_str("[matching]\nhigh_confidence = 0.5\nmatch_distance = 0.5")
            .unwrap();
        assert_eq!(c.matching.high_confidence, 0.5);
    }

    #[test]
    fn test_non_positive_and_non_finite_thresholds_rejected() {
        for (high, dist) in [(0.0, 0.6), (-0.1, 0.6), (f64::NAN, 0.6), (0.4, f64::INFINITY)] {
            let mut c = Config::default();
            c.matching.high_confidence = high;
            c.matching.match_distance = dist;
            assert!(
                matches!(c.validate(), Err(ConfigError::Invalid(_))),
                "accepted high={high} dist={dist}"
            );
        }
    }

    #[test]
    fn test_pass_ratio_bounds() {
        for ratio in [0.0, -0.5, 1.5, f64::NAN] {
            let mut c = Config::default();
            c.liveness.pass_ratio = ratio;
            assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))), "accepted {ratio}");
        }
        let c = Config::from_toml_str("[liveness]\npass_ratio = 1.0").unwrap();
        assert_eq!(c.liveness.pass_ratio, 1.0);

        let err = Config::from_toml_str("[liveness]\npass_ratio = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_invalid_env_override_rejected() {
        let mut c = Config::default();
        c.apply_overrides(|k| (k == "VERIFACE_HIGH_CONFIDENCE_DISTANCE").then(|| "0.9".to_string()));
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_challenge_list_ignored() {
        let mut c = Config::default();
        c.apply_overrides(|k| (k == "VERIFACE_CHALLENGES").then(|| "smile,wink".to_string()));
        assert_eq!(c.liveness.challenges, ChallengeKind::DEFAULT_SEQUENCE.to_vec());
    }
}
