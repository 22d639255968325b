use tracing::{debug, warn};

use crate::config::ThresholdConfig;
use crate::models::{Alert, Band, MetricSnapshot, Severity};
use crate::risk;

/// One alert per metric that is out of range or risk-flagged, grouped
/// critical, warning, info. Input order is kept within a tier.
pub fn generate_alerts(snapshots: &[MetricSnapshot], config: &ThresholdConfig) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = snapshots
        .iter()
        .filter_map(|snapshot| alert_for(snapshot, config))
        .collect();
    alerts.sort_by_key(|alert| alert.severity);
    alerts
}

pub fn alert_for(snapshot: &MetricSnapshot, config: &ThresholdConfig) -> Option<Alert> {
    if !snapshot.value.is_finite() {
        warn!(
            metric = %snapshot.id,
            period = %snapshot.period,
            "skipping metric with non-finite value"
        );
        return None;
    }

    let classification = risk::classify(snapshot.value, snapshot.expected_range.as_ref(), config);
    let flagged = risk::flag_risk(classification.band, snapshot.change_percentage, config);

    let risk_severity = flagged.then(|| match classification.band {
        Band::Poor | Band::Critical => Severity::Critical,
        _ => Severity::Warning,
    });

    let severity = match (classification.severity, risk_severity) {
        (Some(range), Some(risk)) => range.escalate(risk),
        (Some(range), None) => range,
        (None, Some(risk)) => risk,
        (None, None) => return None,
    };

    let mut parts = Vec::new();
    if let Some(range_message) = range_message(snapshot) {
        parts.push(range_message);
    }
    if flagged {
        parts.push(risk_message(snapshot, classification.band, config));
    }

    debug!(
        metric = %snapshot.id,
        band = %classification.band,
        severity = %severity,
        "alert raised"
    );

    Some(Alert {
        id: format!("alert-{}-{}", snapshot.id, snapshot.period),
        metric_id: snapshot.id.clone(),
        message: parts.join(" "),
        severity,
        current_value: snapshot.value,
        expected_range: snapshot.expected_range,
        segment_tag: snapshot
            .segment
            .clone()
            .filter(|segment| segment != "all"),
    })
}

/// Removes an alert from the rendered set. Regenerating from the same
/// snapshots brings it back while the condition holds.
pub fn dismiss(alerts: &[Alert], alert_id: &str) -> Vec<Alert> {
    alerts
        .iter()
        .filter(|alert| alert.id != alert_id)
        .cloned()
        .collect()
}

pub fn count_by_severity(alerts: &[Alert]) -> [(Severity, usize); 3] {
    [Severity::Critical, Severity::Warning, Severity::Info]
        .map(|severity| (severity, alerts.iter().filter(|a| a.severity == severity).count()))
}

fn range_message(snapshot: &MetricSnapshot) -> Option<String> {
    let range = snapshot.expected_range?;
    let value = snapshot.value;

    if let Some(min) = range.min.filter(|min| value < *min) {
        let pct = percent_of(min - value, min);
        return Some(format!(
            "{} is {:.0}% below the expected minimum ({}).",
            snapshot.label, pct, min
        ));
    }
    if let Some(max) = range.max.filter(|max| value > *max) {
        let pct = percent_of(value - max, max);
        return Some(format!(
            "{} is {:.0}% above the expected maximum ({}).",
            snapshot.label, pct, max
        ));
    }
    None
}

fn risk_message(snapshot: &MetricSnapshot, band: Band, config: &ThresholdConfig) -> String {
    if risk::trend_breaches(snapshot.change_percentage, config) {
        format!(
            "{} dropped {:.1}% this period (band: {}).",
            snapshot.label,
            snapshot.change_percentage.abs(),
            band
        )
    } else {
        format!("{} is in the {} band and needs attention.", snapshot.label, band)
    }
}

fn percent_of(gap: f64, bound: f64) -> f64 {
    if bound == 0.0 {
        0.0
    } else {
        gap / bound.abs() * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExpectedRange, TrendDirection};

    fn snapshot(id: &str, value: f64, range: Option<ExpectedRange>, change: f64) -> MetricSnapshot {
        MetricSnapshot {
            id: id.to_string(),
            label: id.to_uppercase(),
            value,
            unit: "count".to_string(),
            period: "30d".to_string(),
            target: None,
            expected_range: range,
            trend_direction: if change < 0.0 {
                TrendDirection::Down
            } else {
                TrendDirection::Up
            },
            change_percentage: change,
            segment: Some("atletas".to_string()),
        }
    }

    fn thresholds() -> ThresholdConfig {
        ThresholdConfig::default()
    }

    #[test]
    fn groups_by_severity_and_keeps_input_order() {
        let snapshots = vec![
            snapshot("info-a", 95.0, Some(ExpectedRange::new(None, Some(90.0))), 2.0),
            snapshot("critical-a", 20.0, Some(ExpectedRange::new(Some(40.0), None)), 0.0),
            snapshot("warn-a", 75.0, None, -9.0),
            snapshot("healthy", 90.0, Some(ExpectedRange::new(Some(40.0), Some(100.0))), 1.0),
            snapshot("critical-b", 30.0, None, 0.0),
            snapshot("warn-b", 72.0, None, -6.0),
        ];

        let alerts = generate_alerts(&snapshots, &thresholds());
        let ids: Vec<&str> = alerts.iter().map(|a| a.metric_id.as_str()).collect();
        assert_eq!(ids, vec!["critical-a", "critical-b", "warn-a", "warn-b", "info-a"]);
    }

    #[test]
    fn generation_is_idempotent() {
        let snapshots = vec![
            snapshot("leads", 180.0, Some(ExpectedRange::new(Some(300.0), Some(700.0))), -12.0),
            snapshot("roas", 7.5, Some(ExpectedRange::new(Some(3.0), Some(6.5))), 3.0),
        ];
        let first = generate_alerts(&snapshots, &thresholds());
        let second = generate_alerts(&snapshots, &thresholds());
        assert_eq!(first, second);
        assert_eq!(first[0].id, "alert-leads-30d");
    }

    #[test]
    fn dismissed_alert_returns_on_refresh() {
        let snapshots = vec![snapshot("leads", 10.0, None, 0.0)];
        let alerts = generate_alerts(&snapshots, &thresholds());
        assert_eq!(alerts.len(), 1);

        let remaining = dismiss(&alerts, "alert-leads-30d");
        assert!(remaining.is_empty());
        assert_eq!(snapshots[0].value, 10.0);

        let refreshed = generate_alerts(&snapshots, &thresholds());
        assert_eq!(refreshed, alerts);
    }

    #[test]
    fn message_mentions_bound_and_trend() {
        let snapshots = vec![snapshot(
            "leads",
            62.5,
            Some(ExpectedRange::new(Some(100.0), None)),
            -8.0,
        )];
        let alerts = generate_alerts(&snapshots, &thresholds());
        let alert = &alerts[0];
        assert_eq!(alert.severity, Severity::Critical);
        assert!(alert.message.contains("38% below the expected minimum (100)"));
        assert!(alert.message.contains("dropped 8.0%"));
        assert_eq!(alert.segment_tag.as_deref(), Some("atletas"));
    }

    #[test]
    fn non_finite_values_produce_no_alert() {
        let snapshots = vec![snapshot("broken", f64::NAN, None, -40.0)];
        assert!(generate_alerts(&snapshots, &thresholds()).is_empty());
    }

    #[test]
    fn counts_each_tier() {
        let snapshots = vec![
            snapshot("a", 10.0, None, 0.0),
            snapshot("b", 75.0, None, -7.0),
            snapshot("c", 20.0, None, 0.0),
        ];
        let alerts = generate_alerts(&snapshots, &thresholds());
        assert_eq!(
            count_by_severity(&alerts),
            [(Severity::Critical, 2), (Severity::Warning, 1), (Severity::Info, 0)]
        );
    }
}
