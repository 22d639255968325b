use crate::config::ForecastSettings;
use crate::models::{
    CapacityRecommendation, ConfidenceTier, EntityForecast, EntityTotals, ForecastResult, Horizon,
};

pub fn project_forecast(
    totals: &[EntityTotals],
    horizon: Horizon,
    settings: &ForecastSettings,
) -> ForecastResult {
    let multiplier = settings.multiplier(horizon);
    let entities: Vec<EntityForecast> = totals
        .iter()
        .map(|entity| project_entity(entity, multiplier, settings))
        .collect();

    let current_total: f64 = entities.iter().map(|e| e.current_total).sum();
    let forecasted_total: f64 = entities.iter().map(|e| e.forecasted_total).sum();
    let confidence_tier = entities
        .iter()
        .map(|e| e.confidence_tier)
        .min()
        .unwrap_or(ConfidenceTier::Low);

    // Capacity is judged against the baseline scaled to the horizon.
    let horizon_baseline = current_total * multiplier;
    let capacity_recommendation =
        capacity_for(growth(horizon_baseline, forecasted_total), settings);

    ForecastResult {
        horizon,
        current_total,
        forecasted_total,
        growth_percentage: growth(current_total, forecasted_total),
        confidence_tier,
        capacity_recommendation,
        entities,
    }
}

fn project_entity(
    entity: &EntityTotals,
    multiplier: f64,
    settings: &ForecastSettings,
) -> EntityForecast {
    let current = if entity.current.is_finite() {
        entity.current
    } else {
        0.0
    };
    let trend_factor = if entity.trend_factor.is_finite() && entity.trend_factor > 0.0 {
        entity.trend_factor
    } else {
        1.0
    };
    let forecasted_total = (current * multiplier * trend_factor).round();

    EntityForecast {
        entity_id: entity.entity_id.clone(),
        label: entity.label.clone(),
        current_total: current,
        forecasted_total,
        growth_percentage: growth(current, forecasted_total),
        confidence_tier: confidence_for(&entity.history, settings),
    }
}

pub fn growth(current: f64, forecasted: f64) -> f64 {
    if current == 0.0 {
        0.0
    } else {
        (forecasted - current) / current * 100.0
    }
}

/// Coefficient of variation over past totals decides the tier: few or
/// volatile samples are low, many steady samples are high.
pub fn confidence_for(history: &[f64], settings: &ForecastSettings) -> ConfidenceTier {
    let values: Vec<f64> = history.iter().copied().filter(|v| v.is_finite()).collect();
    if values.len() < settings.low_confidence_min_samples {
        return ConfidenceTier::Low;
    }

    let Some(variation) = coefficient_of_variation(&values) else {
        return ConfidenceTier::Low;
    };
    if variation > settings.low_confidence_max_variation {
        ConfidenceTier::Low
    } else if values.len() >= settings.high_confidence_min_samples
        && variation <= settings.high_confidence_max_variation
    {
        ConfidenceTier::High
    } else {
        ConfidenceTier::Medium
    }
}

pub fn capacity_for(growth_percentage: f64, settings: &ForecastSettings) -> CapacityRecommendation {
    if growth_percentage > settings.capacity_upper {
        CapacityRecommendation::Increase
    } else if growth_percentage < settings.capacity_lower {
        CapacityRecommendation::Decrease
    } else {
        CapacityRecommendation::Maintain
    }
}

fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;

    fn settings() -> ForecastSettings {
        EngineSettings::default().forecast
    }

    fn entity(id: &str, current: f64, trend_factor: f64, history: Vec<f64>) -> EntityTotals {
        EntityTotals {
            entity_id: id.to_string(),
            label: id.to_string(),
            current,
            trend_factor,
            history,
        }
    }

    #[test]
    fn month_projection_rounds_and_reports_growth() {
        let totals = vec![entity("leads", 420.0, 1.12, vec![400.0, 405.0, 410.0, 415.0])];
        let result = project_forecast(&totals, Horizon::Month, &settings());
        let leads = &result.entities[0];
        assert_eq!(leads.forecasted_total, 470.0);
        assert!((leads.growth_percentage - 11.904).abs() < 0.01);
        assert_eq!(leads.confidence_tier, ConfidenceTier::High);
        assert_eq!(result.capacity_recommendation, CapacityRecommendation::Maintain);
    }

    #[test]
    fn zero_current_never_divides() {
        let totals = vec![entity("new-funnel", 0.0, 1.5, vec![])];
        let result = project_forecast(&totals, Horizon::Quarter, &settings());
        assert_eq!(result.entities[0].growth_percentage, 0.0);
        assert_eq!(result.growth_percentage, 0.0);
        assert!(result.growth_percentage.is_finite());
        assert_eq!(result.capacity_recommendation, CapacityRecommendation::Maintain);
    }

    #[test]
    fn horizon_multipliers_apply() {
        let totals = vec![entity("leads", 100.0, 1.0, vec![])];
        let week = project_forecast(&totals, Horizon::Week, &settings());
        let quarter = project_forecast(&totals, Horizon::Quarter, &settings());
        assert_eq!(week.forecasted_total, 35.0);
        assert_eq!(quarter.forecasted_total, 260.0);
        assert_eq!(week.capacity_recommendation, CapacityRecommendation::Maintain);
    }

    #[test]
    fn capacity_bounds() {
        let settings = settings();
        assert_eq!(capacity_for(20.5, &settings), CapacityRecommendation::Increase);
        assert_eq!(capacity_for(20.0, &settings), CapacityRecommendation::Maintain);
        assert_eq!(capacity_for(-10.0, &settings), CapacityRecommendation::Maintain);
        assert_eq!(capacity_for(-10.5, &settings), CapacityRecommendation::Decrease);

        let growing = vec![entity("leads", 200.0, 1.3, vec![])];
        let result = project_forecast(&growing, Horizon::Month, &settings);
        assert_eq!(result.capacity_recommendation, CapacityRecommendation::Increase);
        let shrinking = vec![entity("leads", 200.0, 0.8, vec![])];
        let result = project_forecast(&shrinking, Horizon::Week, &settings);
        assert_eq!(result.capacity_recommendation, CapacityRecommendation::Decrease);
    }

    #[test]
    fn confidence_tiers() {
        let settings = settings();
        assert_eq!(confidence_for(&[100.0], &settings), ConfidenceTier::Low);
        assert_eq!(confidence_for(&[100.0, 104.0], &settings), ConfidenceTier::Medium);
        assert_eq!(
            confidence_for(&[100.0, 102.0, 98.0, 101.0], &settings),
            ConfidenceTier::High
        );
        assert_eq!(
            confidence_for(&[10.0, 200.0, 15.0, 180.0], &settings),
            ConfidenceTier::Low
        );
        assert_eq!(confidence_for(&[0.0, 0.0, 0.0], &settings), ConfidenceTier::Low);
    }

    #[test]
    fn aggregate_takes_weakest_confidence() {
        let totals = vec![
            entity("steady", 100.0, 1.0, vec![100.0, 100.0, 100.0, 100.0]),
            entity("sparse", 50.0, 1.0, vec![50.0]),
        ];
        let result = project_forecast(&totals, Horizon::Month, &settings());
        assert_eq!(result.confidence_tier, ConfidenceTier::Low);
        assert_eq!(result.current_total, 150.0);
        assert!(project_forecast(&[], Horizon::Month, &settings()).entities.is_empty());
    }
}
