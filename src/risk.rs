use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::models::{Band, Classification, ExpectedRange, Severity};

/// Relative distance past a range bound that escalates the severity.
const OUT_OF_RANGE_ESCALATION: f64 = 0.30;

pub fn classify(
    value: f64,
    range: Option<&ExpectedRange>,
    config: &ThresholdConfig,
) -> Classification {
    let value = sanitize(value);
    Classification {
        band: band_for(value, config),
        severity: range.and_then(|range| out_of_range_severity(value, range)),
    }
}

pub fn band_for(value: f64, config: &ThresholdConfig) -> Band {
    let value = sanitize(value);
    let tiers = [
        (config.excellent, Band::Excellent),
        (config.good, Band::Good),
        (config.fair, Band::Fair),
        (config.poor, Band::Poor),
    ];
    tiers
        .iter()
        .find(|(bound, _)| value >= *bound)
        .map(|(_, band)| *band)
        .unwrap_or(Band::Critical)
}

pub fn out_of_range_severity(value: f64, range: &ExpectedRange) -> Option<Severity> {
    if let Some(min) = range.min {
        if value < min {
            let deficit = relative_gap(min - value, min);
            return Some(if deficit > OUT_OF_RANGE_ESCALATION {
                Severity::Critical
            } else {
                Severity::Warning
            });
        }
    }

    if let Some(max) = range.max {
        if value > max {
            let excess = relative_gap(value - max, max);
            return Some(if excess > OUT_OF_RANGE_ESCALATION {
                Severity::Warning
            } else {
                Severity::Info
            });
        }
    }

    None
}

/// Whether a classified metric needs critical attention. A metric already in
/// the excellent band is never flagged.
pub fn flag_risk(band: Band, trend: f64, config: &ThresholdConfig) -> bool {
    if band == Band::Excellent {
        return false;
    }
    band.is_below_good() || trend_breaches(trend, config)
}

pub fn trend_breaches(trend: f64, config: &ThresholdConfig) -> bool {
    let trend = sanitize(trend);
    trend < 0.0 && trend.abs() >= config.risk_trend_threshold.abs()
}

/// Parses a signed percentage such as `"-8%"` or `"+12.5 %"`. Malformed input
/// reads as no change.
pub fn parse_trend(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%')
        .collect();
    cleaned
        .trim_start_matches('+')
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropSeverity {
    Critical,
    Warning,
    Moderate,
}

/// Severity of a period-over-period drop, `None` when the metric did not fall.
pub fn drop_severity(change_percentage: f64) -> Option<DropSeverity> {
    let change = sanitize(change_percentage);
    if change >= 0.0 {
        return None;
    }
    let drop = change.abs();
    Some(match drop {
        d if d > 30.0 => DropSeverity::Critical,
        d if d > 15.0 => DropSeverity::Warning,
        _ => DropSeverity::Moderate,
    })
}

/// Standard KPI ranges per buyer persona, used when a snapshot arrives
/// without its own expected range.
pub fn persona_range(persona: &str, metric_id: &str) -> Option<ExpectedRange> {
    let (min, max) = match (persona, metric_id) {
        ("ejecutivos", "leads") => (300.0, 800.0),
        ("ejecutivos", "funnel-revenue") => (40_000.0, 100_000.0),
        ("ejecutivos", "email-ctr") => (5.0, 12.0),
        ("ejecutivos", "roas") => (3.5, 7.0),
        ("ejecutivos", "social-growth") => (3.0, 15.0),
        ("ejecutivos", "estimatedROI") => (150.0, 400.0),
        ("madres", "leads") => (250.0, 600.0),
        ("madres", "funnel-revenue") => (30_000.0, 80_000.0),
        ("madres", "email-ctr") => (6.0, 15.0),
        ("madres", "roas") => (3.0, 6.0),
        ("madres", "social-growth") => (5.0, 20.0),
        ("madres", "estimatedROI") => (120.0, 350.0),
        ("atletas", "leads") => (200.0, 500.0),
        ("atletas", "funnel-revenue") => (25_000.0, 70_000.0),
        ("atletas", "email-ctr") => (4.0, 10.0),
        ("atletas", "roas") => (2.5, 5.5),
        ("atletas", "social-growth") => (8.0, 25.0),
        ("atletas", "estimatedROI") => (100.0, 300.0),
        (_, "leads") => (300.0, 700.0),
        (_, "funnel-revenue") => (35_000.0, 90_000.0),
        (_, "email-ctr") => (5.0, 12.0),
        (_, "roas") => (3.0, 6.5),
        (_, "social-growth") => (5.0, 20.0),
        (_, "estimatedROI") => (120.0, 350.0),
        _ => return None,
    };
    Some(ExpectedRange::new(Some(min), Some(max)))
}

fn relative_gap(gap: f64, bound: f64) -> f64 {
    if bound == 0.0 {
        return f64::INFINITY;
    }
    gap / bound.abs()
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
