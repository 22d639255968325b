//! Adherence versus wearable signals.
//!
//! The "correlation" here is a bounded proximity heuristic: both values are
//! normalised onto [0, 1] and compared, giving 1 when they sit together and
//! -1 when they sit at opposite ends. It is not a statistical correlation.

use crate::config::CorrelationSettings;
use crate::models::{
    BiometricAverages, BiometricSample, CorrelationAxes, CorrelationResult, RecoveryAlerts,
    RecoveryState,
};

pub fn estimate_correlation(
    adherence: f64,
    samples: &[BiometricSample],
    settings: &CorrelationSettings,
) -> CorrelationResult {
    let adherence = if adherence.is_finite() {
        adherence.clamp(0.0, 100.0)
    } else {
        0.0
    };

    if samples.is_empty() {
        return CorrelationResult {
            adherence,
            sample_count: 0,
            biometric_averages: BiometricAverages::default(),
            correlation: CorrelationAxes::default(),
            alerts: RecoveryAlerts::default(),
        };
    }

    let averages = BiometricAverages {
        heart_rate_avg: mean(samples.iter().map(|s| s.heart_rate_avg)),
        hrv_ms: mean(samples.iter().map(|s| s.hrv_ms)),
        sleep_quality: mean(samples.iter().map(|s| s.sleep_quality)),
    };

    let adherence_norm = adherence / 100.0;
    let correlation = CorrelationAxes {
        heart_rate: proxy_correlation(
            adherence_norm,
            settings.heart_rate_range.normalize(averages.heart_rate_avg),
        ),
        hrv: proxy_correlation(adherence_norm, settings.hrv_range.normalize(averages.hrv_ms)),
        sleep_quality: proxy_correlation(
            adherence_norm,
            settings.sleep_range.normalize(averages.sleep_quality),
        ),
    };

    let alerts = RecoveryAlerts {
        overload: state_ratio(samples, RecoveryState::Overload) > settings.overload_ratio,
        fatigue: state_ratio(samples, RecoveryState::Fatigue) > settings.fatigue_ratio,
        recovery_insufficient: averages.hrv_ms < settings.hrv_floor
            || averages.sleep_quality < settings.sleep_floor,
    };

    CorrelationResult {
        adherence,
        sample_count: samples.len(),
        biometric_averages: averages,
        correlation,
        alerts,
    }
}

pub fn proxy_correlation(left: f64, right: f64) -> f64 {
    (1.0 - 2.0 * (left - right).abs()).clamp(-1.0, 1.0)
}

fn state_ratio(samples: &[BiometricSample], state: RecoveryState) -> f64 {
    let matching = samples.iter().filter(|s| s.recovery_state == state).count();
    matching as f64 / samples.len() as f64
}

/// Mean of the finite readings; missing or broken readings are skipped.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|value| value.is_finite())
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
