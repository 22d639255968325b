use std::fmt::Write;

use crate::alerts;
use crate::models::{Alert, CorrelationResult, ForecastResult, LearningProfile};

pub struct ReportInput<'a> {
    pub user_id: &'a str,
    pub period: &'a str,
    pub persona: Option<&'a str>,
    pub alerts: &'a [Alert],
    pub profile: &'a LearningProfile,
    pub forecast: &'a ForecastResult,
    pub recovery: Option<&'a CorrelationResult>,
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();
    let persona_label = input.persona.unwrap_or("all personas");

    let _ = writeln!(output, "# Coaching Signal Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}, period {})",
        input.user_id, persona_label, input.period
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## KPI Alerts");

    if input.alerts.is_empty() {
        let _ = writeln!(output, "No KPIs need attention this period.");
    } else {
        let counts = alerts::count_by_severity(input.alerts);
        let summary: Vec<String> = counts
            .iter()
            .map(|(severity, count)| format!("{count} {severity}"))
            .collect();
        let _ = writeln!(output, "{}", summary.join(", "));
        for alert in input.alerts {
            let _ = writeln!(
                output,
                "- [{}] {} (current {})",
                alert.severity, alert.message, alert.current_value
            );
        }
    }

    let profile = input.profile;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Suggestion Feedback");
    if profile.total_feedback == 0 {
        let _ = writeln!(output, "No feedback recorded yet.");
    } else {
        let _ = writeln!(
            output,
            "{} events, {:.1}% accepted, {:.1}% rejected",
            profile.total_feedback, profile.acceptance_rate, profile.rejection_rate
        );
        for entry in profile.top_accepted_types.iter() {
            let _ = writeln!(
                output,
                "- accepted {}: {} ({:.1}%)",
                entry.derived_type, entry.count, entry.percentage
            );
        }
        for entry in profile.top_rejected_types.iter() {
            let _ = writeln!(
                output,
                "- rejected {}: {} ({:.1}%)",
                entry.derived_type, entry.count, entry.percentage
            );
        }
    }
    for hint in profile.improvement_suggestions.iter() {
        let _ = writeln!(output, "> {hint}");
    }

    let forecast = input.forecast;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Forecast ({})", forecast.horizon.as_str());
    if forecast.entities.is_empty() {
        let _ = writeln!(output, "No metrics to project.");
    } else {
        let _ = writeln!(
            output,
            "Total {:.0} -> {:.0} ({:+.1}%), confidence {}, capacity: {}",
            forecast.current_total,
            forecast.forecasted_total,
            forecast.growth_percentage,
            forecast.confidence_tier.as_str(),
            forecast.capacity_recommendation.as_str()
        );
        for entity in forecast.entities.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.0} -> {:.0} ({:+.1}%, {})",
                entity.label,
                entity.current_total,
                entity.forecasted_total,
                entity.growth_percentage,
                entity.confidence_tier.as_str()
            );
        }
    }

    if let Some(recovery) = input.recovery {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Recovery Signals");
        if recovery.sample_count == 0 {
            let _ = writeln!(output, "No wearable samples in this window.");
        } else {
            let _ = writeln!(
                output,
                "Adherence {:.0}% over {} samples (HRV {:.0} ms, sleep {:.0}%)",
                recovery.adherence,
                recovery.sample_count,
                recovery.biometric_averages.hrv_ms,
                recovery.biometric_averages.sleep_quality
            );
            let flags = [
                (recovery.alerts.overload, "overload"),
                (recovery.alerts.fatigue, "fatigue"),
                (recovery.alerts.recovery_insufficient, "insufficient recovery"),
            ];
            for (_, label) in flags.iter().filter(|(raised, _)| *raised) {
                let _ = writeln!(output, "- flagged: {label}");
            }
        }
    }

    output
}
