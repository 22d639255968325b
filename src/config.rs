use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigurationError;
use crate::models::Horizon;

/// Band boundaries owned by a user. Bounds are inclusive on the lower side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub name: String,
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
    /// Negative percentage; a drop at least this steep escalates a metric.
    pub risk_trend_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            excellent: 85.0,
            good: 70.0,
            fair: 55.0,
            poor: 40.0,
            risk_trend_threshold: -5.0,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let bounds = [
            ("excellent", self.excellent),
            ("good", self.good),
            ("fair", self.fair),
            ("poor", self.poor),
            ("risk_trend_threshold", self.risk_trend_threshold),
        ];
        for (name, value) in bounds {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFinite { name });
            }
        }

        for pair in bounds[..4].windows(2) {
            let (upper, upper_value) = pair[0];
            let (lower, lower_value) = pair[1];
            if upper_value < lower_value {
                return Err(ConfigurationError::NonMonotonic {
                    upper,
                    upper_value,
                    lower,
                    lower_value,
                });
            }
        }

        if self.risk_trend_threshold > 0.0 {
            return Err(ConfigurationError::PositiveRiskThreshold(
                self.risk_trend_threshold,
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankingSettings {
    pub strength_weight: f64,
    pub objective_weight: f64,
    /// Feedback count at which a type's learning weight reaches full confidence.
    pub confidence_cap: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearningSettings {
    pub type_rejection_threshold: f64,
    pub low_acceptance_threshold: f64,
    pub strong_acceptance_threshold: f64,
    pub sparse_feedback_minimum: usize,
    pub top_types_limit: usize,
}

/// Reference range used to normalise a biometric onto [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceRange {
    pub low: f64,
    pub high: f64,
}

impl ReferenceRange {
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.high - self.low;
        if span <= 0.0 || !value.is_finite() {
            return 0.0;
        }
        ((value - self.low) / span).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationSettings {
    pub heart_rate_range: ReferenceRange,
    pub hrv_range: ReferenceRange,
    pub sleep_range: ReferenceRange,
    pub overload_ratio: f64,
    pub fatigue_ratio: f64,
    pub hrv_floor: f64,
    pub sleep_floor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSettings {
    pub week_multiplier: f64,
    pub month_multiplier: f64,
    pub quarter_multiplier: f64,
    pub high_confidence_min_samples: usize,
    pub high_confidence_max_variation: f64,
    pub low_confidence_min_samples: usize,
    pub low_confidence_max_variation: f64,
    pub capacity_upper: f64,
    pub capacity_lower: f64,
}

impl ForecastSettings {
    pub fn multiplier(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::Week => self.week_multiplier,
            Horizon::Month => self.month_multiplier,
            Horizon::Quarter => self.quarter_multiplier,
        }
    }
}

/// Every tunable constant the engine uses.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub ranking: RankingSettings,
    pub learning: LearningSettings,
    pub correlation: CorrelationSettings,
    pub forecast: ForecastSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ranking: RankingSettings {
                strength_weight: 1.0,
                objective_weight: 1.0,
                confidence_cap: 10.0,
            },
            learning: LearningSettings {
                type_rejection_threshold: 60.0,
                low_acceptance_threshold: 50.0,
                strong_acceptance_threshold: 70.0,
                sparse_feedback_minimum: 5,
                top_types_limit: 5,
            },
            correlation: CorrelationSettings {
                heart_rate_range: ReferenceRange {
                    low: 40.0,
                    high: 200.0,
                },
                hrv_range: ReferenceRange {
                    low: 0.0,
                    high: 100.0,
                },
                sleep_range: ReferenceRange {
                    low: 0.0,
                    high: 100.0,
                },
                overload_ratio: 0.30,
                fatigue_ratio: 0.20,
                hrv_floor: 40.0,
                sleep_floor: 60.0,
            },
            forecast: ForecastSettings {
                week_multiplier: 0.35,
                month_multiplier: 1.0,
                quarter_multiplier: 2.6,
                high_confidence_min_samples: 4,
                high_confidence_max_variation: 0.15,
                low_confidence_min_samples: 2,
                low_confidence_max_variation: 0.5,
                capacity_upper: 20.0,
                capacity_lower: -10.0,
            },
        }
    }
}

impl EngineSettings {
    /// Defaults overridden by any `SIGNAL_ENGINE_*` variables present.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        override_with(
            &lookup,
            "SIGNAL_ENGINE_STRENGTH_WEIGHT",
            &mut settings.ranking.strength_weight,
        );
        override_with(
            &lookup,
            "SIGNAL_ENGINE_OBJECTIVE_WEIGHT",
            &mut settings.ranking.objective_weight,
        );
        override_with(
            &lookup,
            "SIGNAL_ENGINE_CONFIDENCE_CAP",
            &mut settings.ranking.confidence_cap,
        );
        override_with(
            &lookup,
            "SIGNAL_ENGINE_TYPE_REJECTION_THRESHOLD",
            &mut settings.learning.type_rejection_threshold,
        );
        override_with(
            &lookup,
            "SIGNAL_ENGINE_SPARSE_FEEDBACK_MINIMUM",
            &mut settings.learning.sparse_feedback_minimum,
        );
        override_with(&lookup, "SIGNAL_ENGINE_HRV_FLOOR", &mut settings.correlation.hrv_floor);
        override_with(&lookup, "SIGNAL_ENGINE_SLEEP_FLOOR", &mut settings.correlation.sleep_floor);
        override_with(
            &lookup,
            "SIGNAL_ENGINE_CAPACITY_UPPER",
            &mut settings.forecast.capacity_upper,
        );
        override_with(
            &lookup,
            "SIGNAL_ENGINE_CAPACITY_LOWER",
            &mut settings.forecast.capacity_lower,
        );

        if settings.ranking.confidence_cap <= 0.0 {
            warn!(
                cap = settings.ranking.confidence_cap,
                "confidence cap must be positive, using default"
            );
            settings.ranking.confidence_cap = Self::default().ranking.confidence_cap;
        }
        settings
    }
}

/// A value an environment override may carry.
trait SettingValue: FromStr {
    fn is_usable(&self) -> bool;
}

impl SettingValue for f64 {
    fn is_usable(&self) -> bool {
        self.is_finite()
    }
}

impl SettingValue for usize {
    fn is_usable(&self) -> bool {
        true
    }
}

fn override_with<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: SettingValue,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value.is_usable() => *target = value,
        _ => warn!(key, value = %raw, "ignoring unparsable setting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_are_valid() {
        assert!(ThresholdConfig::default().validate().is_ok());
    }

    #[test]
    fn equal_bounds_are_allowed() {
        let config = ThresholdConfig {
            good: 85.0,
            ..ThresholdConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_monotonic_bounds() {
        let config = ThresholdConfig {
            fair: 75.0,
            ..ThresholdConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::NonMonotonic {
                upper: "good",
                upper_value: 70.0,
                lower: "fair",
                lower_value: 75.0,
            }
        );
    }

    #[test]
    fn rejects_nan_and_positive_risk_threshold() {
        let nan = ThresholdConfig {
            poor: f64::NAN,
            ..ThresholdConfig::default()
        };
        assert_eq!(
            nan.validate().unwrap_err(),
            ConfigurationError::NonFinite { name: "poor" }
        );

        let positive = ThresholdConfig {
            risk_trend_threshold: 5.0,
            ..ThresholdConfig::default()
        };
        assert_eq!(
            positive.validate().unwrap_err(),
            ConfigurationError::PositiveRiskThreshold(5.0)
        );
    }

    #[test]
    fn env_overrides_apply_and_bad_values_fall_back() {
        let settings = EngineSettings::from_lookup(|key| match key {
            "SIGNAL_ENGINE_STRENGTH_WEIGHT" => Some("2.5".to_string()),
            "SIGNAL_ENGINE_CAPACITY_UPPER" => Some("lots".to_string()),
            "SIGNAL_ENGINE_CONFIDENCE_CAP" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(settings.ranking.strength_weight, 2.5);
        assert_eq!(settings.forecast.capacity_upper, 20.0);
        assert_eq!(settings.ranking.confidence_cap, 10.0);
    }

    #[test]
    fn non_finite_overrides_keep_defaults() {
        let settings = EngineSettings::from_lookup(|key| match key {
            "SIGNAL_ENGINE_STRENGTH_WEIGHT" => Some("NaN".to_string()),
            "SIGNAL_ENGINE_HRV_FLOOR" => Some("inf".to_string()),
            "SIGNAL_ENGINE_CAPACITY_LOWER" => Some("-infinity".to_string()),
            "SIGNAL_ENGINE_SLEEP_FLOOR" => Some("55".to_string()),
            _ => None,
        });
        let defaults = EngineSettings::default();
        assert_eq!(settings.ranking.strength_weight, defaults.ranking.strength_weight);
        assert_eq!(settings.correlation.hrv_floor, defaults.correlation.hrv_floor);
        assert_eq!(settings.forecast.capacity_lower, defaults.forecast.capacity_lower);
        assert_eq!(settings.correlation.sleep_floor, 55.0);
    }

    #[test]
    fn reference_range_clamps() {
        let range = ReferenceRange {
            low: 0.0,
            high: 100.0,
        };
        assert_eq!(range.normalize(150.0), 1.0);
        assert_eq!(range.normalize(-3.0), 0.0);
        assert_eq!(range.normalize(f64::NAN), 0.0);
        assert!((range.normalize(45.0) - 0.45).abs() < 1e-9);
    }
}
