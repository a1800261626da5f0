use anyhow::{ensure, Context};

const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

const DEFAULT_TARGET_WEIGHT: f64 = 0.4;
const DEFAULT_RATING_WEIGHT: f64 = 0.3;
const DEFAULT_ACTION_WEIGHT: f64 = 0.2;
const DEFAULT_RECENCY_WEIGHT: f64 = 0.1;

/// Multipliers for the four scoring signals. Only constructible through
/// validation, so holding one means the weights sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    target: f64,
    rating: f64,
    action: f64,
    recency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET_WEIGHT,
            rating: DEFAULT_RATING_WEIGHT,
            action: DEFAULT_ACTION_WEIGHT,
            recency: DEFAULT_RECENCY_WEIGHT,
        }
    }
}

impl ScoringWeights {
    pub fn new(target: f64, rating: f64, action: f64, recency: f64) -> anyhow::Result<Self> {
        for (name, w) in [
            ("target", target),
            ("rating", rating),
            ("action", action),
            ("recency", recency),
        ] {
            ensure!(
                w.is_finite() && (0.0..=1.0).contains(&w),
                "scoring weight {name} must be within [0, 1] (got {w})"
            );
        }

        let sum = target + rating + action + recency;
        ensure!(
            (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE,
            "scoring weights must sum to 1.0 (got {sum:.4})"
        );

        Ok(Self {
            target,
            rating,
            action,
            recency,
        })
    }

    /// Defaults overridden by `SCORING_WEIGHT_{TARGET,RATING,ACTION,RECENCY}`.
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        Self::new(
            env_weight("SCORING_WEIGHT_TARGET", d.target)?,
            env_weight("SCORING_WEIGHT_RATING", d.rating)?,
            env_weight("SCORING_WEIGHT_ACTION", d.action)?,
            env_weight("SCORING_WEIGHT_RECENCY", d.recency)?,
        )
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn rating(&self) -> f64 {
        self.rating
    }

    pub fn action(&self) -> f64 {
        self.action
    }

    pub fn recency(&self) -> f64 {
        self.recency
    }
}

fn env_weight(key: &str, default: f64) -> anyhow::Result<f64> {
    match std::env::var(key) {
        Ok(s) if !s.trim().is_empty() => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("{key} must be a number (got {s:?})")),
        _ => Ok(default),
    }
}
