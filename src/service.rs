//! Workflows that join the pure engine with its collaborators.

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::alerts;
use crate::config::EngineSettings;
use crate::correlation;
use crate::error::EngineResult;
use crate::forecast;
use crate::learning;
use crate::ledger::FeedbackLedger;
use crate::lifecycle::{self, ActivationItem, ActivationStatus, StrategyStatus, WeeklyStrategy};
use crate::models::{
    Alert, CorrelationResult, EntityTotals, ForecastResult, Horizon, LearningProfile, NewFeedback,
};
use crate::store::{
    self, not_found, BiometricSource, FeedbackStore, MetricsSource, StatusStore,
    ThresholdRepository,
};

/// Number of earlier periods considered when grading forecast confidence.
const HISTORY_WINDOW: usize = 8;

pub async fn current_alerts<S>(
    store: &S,
    user_id: &str,
    period: &str,
    persona: Option<&str>,
) -> EngineResult<Vec<Alert>>
where
    S: MetricsSource + ThresholdRepository,
{
    let config = store::load_thresholds(store, user_id).await?;
    let snapshots = store.metric_snapshots(period, persona).await?;
    Ok(alerts::generate_alerts(&snapshots, &config))
}

/// Loads the user's ledger from the store so appends continue its sequence.
pub async fn load_ledger<S>(store: &S, user_id: &str) -> EngineResult<FeedbackLedger>
where
    S: FeedbackStore + ?Sized,
{
    Ok(FeedbackLedger::from_events(store.feedback_log(user_id).await?))
}

/// Persists one event, then publishes it to the ledger and returns the
/// rebuilt profile. A failed write leaves the ledger untouched.
pub async fn submit_feedback<S>(
    store: &S,
    ledger: &FeedbackLedger,
    user_id: &str,
    feedback: NewFeedback,
    settings: &EngineSettings,
) -> EngineResult<LearningProfile>
where
    S: FeedbackStore + ?Sized,
{
    let event = store.append_feedback(user_id, &feedback).await?;
    info!(user = user_id, sequence = event.sequence, "feedback recorded");
    ledger.commit(event);
    Ok(learning::build_learning_profile(&ledger.snapshot(), &settings.learning))
}

pub async fn correlate_subject<S>(
    store: &S,
    subject_id: &str,
    adherence: f64,
    since: NaiveDate,
    settings: &EngineSettings,
) -> EngineResult<CorrelationResult>
where
    S: BiometricSource + ?Sized,
{
    let samples = store.biometric_samples(subject_id, since).await?;
    Ok(correlation::estimate_correlation(adherence, &samples, &settings.correlation))
}

/// Projects every metric of the period, using its change percentage as the
/// trend factor and the periods before it as history.
pub async fn forecast_metrics<S>(
    store: &S,
    period: &str,
    persona: Option<&str>,
    horizon: Horizon,
    settings: &EngineSettings,
) -> EngineResult<ForecastResult>
where
    S: MetricsSource + ?Sized,
{
    let snapshots = store.metric_snapshots(period, persona).await?;
    let mut totals = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let history = store
            .metric_history(&snapshot.id, persona, period, HISTORY_WINDOW)
            .await?;
        totals.push(EntityTotals {
            trend_factor: 1.0 + snapshot.change_percentage / 100.0,
            entity_id: snapshot.id,
            label: snapshot.label,
            current: snapshot.value,
            history,
        });
    }
    Ok(forecast::project_forecast(&totals, horizon, &settings.forecast))
}

pub async fn advance_strategy<S>(store: &S, id: Uuid) -> EngineResult<WeeklyStrategy>
where
    S: StatusStore + ?Sized,
{
    let strategy = store
        .strategy(id)
        .await?
        .ok_or_else(|| not_found("weekly strategy", id))?;
    let to = strategy.status.next().unwrap_or(StrategyStatus::Completed);
    let next = lifecycle::transition(&strategy, to)?;
    store.save_strategy(&next).await?;
    info!(strategy = %id, status = next.status.as_str(), "strategy advanced");
    Ok(next)
}

pub async fn move_activation<S>(
    store: &S,
    id: Uuid,
    to: ActivationStatus,
) -> EngineResult<ActivationItem>
where
    S: StatusStore + ?Sized,
{
    let item = store
        .activation(id)
        .await?
        .ok_or_else(|| not_found("activation", id))?;
    let next = lifecycle::transition(&item, to)?;
    store.save_activation(&next).await?;
    info!(activation = %id, status = next.status.as_str(), "activation updated");
    Ok(next)
}

pub async fn reopen_activation<S>(store: &S, id: Uuid) -> EngineResult<ActivationItem>
where
    S: StatusStore + ?Sized,
{
    let item = store
        .activation(id)
        .await?
        .ok_or_else(|| not_found("activation", id))?;
    let reopened = item.reopen()?;
    store.save_activation(&reopened).await?;
    Ok(reopened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, TransitionError};
    use crate::models::{
        BiometricSample, ConfidenceTier, ExpectedRange, FeedbackAction, FeedbackContext,
        FeedbackEvent, MetricSnapshot, RecoveryState, Severity, SubjectType, TrendDirection,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    fn snapshot(id: &str, period: &str, value: f64, change: f64) -> MetricSnapshot {
        MetricSnapshot {
            id: id.to_string(),
            label: id.to_string(),
            value,
            unit: "count".to_string(),
            period: period.to_string(),
            target: None,
            expected_range: Some(ExpectedRange::new(Some(300.0), Some(700.0))),
            trend_direction: TrendDirection::Up,
            change_percentage: change,
            segment: Some("all".to_string()),
        }
    }

    fn feedback(title: &str, action: FeedbackAction) -> NewFeedback {
        NewFeedback {
            subject_id: "sugg-1".to_string(),
            subject_type: SubjectType::Suggestion,
            action,
            reason: None,
            context: FeedbackContext {
                title: title.to_string(),
                ..FeedbackContext::default()
            },
            timestamp: Utc::now(),
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl FeedbackStore for UnavailableStore {
        async fn append_feedback(
            &self,
            _user_id: &str,
            _feedback: &NewFeedback,
        ) -> EngineResult<FeedbackEvent> {
            Err(EngineError::Store(sqlx::Error::PoolClosed))
        }

        async fn feedback_log(&self, _user_id: &str) -> EngineResult<Vec<FeedbackEvent>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn alerts_use_saved_thresholds() {
        let store = MemoryStore::new();
        store.insert_metrics(vec![snapshot("leads", "2026-03", 150.0, 2.0)]);

        let alerts = current_alerts(&store, "coach-1", "2026-03", None).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(current_alerts(&store, "coach-1", "2026-04", None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn feedback_survives_reload() {
        let store = MemoryStore::new();
        let settings = EngineSettings::default();
        let ledger = load_ledger(&store, "coach-1").await.unwrap();

        let accept = feedback("Retargeting", FeedbackAction::Accept);
        submit_feedback(&store, &ledger, "coach-1", accept, &settings)
            .await
            .unwrap();
        let reject = feedback("Newsletter", FeedbackAction::Reject);
        let profile = submit_feedback(&store, &ledger, "coach-1", reject, &settings)
            .await
            .unwrap();
        assert_eq!(profile.total_feedback, 2);
        assert_eq!(profile.acceptance_rate, 50.0);

        let reloaded = load_ledger(&store, "coach-1").await.unwrap();
        let rebuilt = learning::build_learning_profile(&reloaded.snapshot(), &settings.learning);
        assert_eq!(rebuilt, profile);
        assert!(load_ledger(&store, "coach-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_ledger_untouched() {
        let store = UnavailableStore;
        let settings = EngineSettings::default();
        let ledger = FeedbackLedger::new();

        let accept = feedback("Retargeting", FeedbackAction::Accept);
        let result = submit_feedback(&store, &ledger, "coach-1", accept, &settings).await;
        assert!(matches!(result, Err(EngineError::Store(_))));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn separate_sessions_never_share_a_sequence() {
        let store = Arc::new(MemoryStore::new());
        let settings = EngineSettings::default();
        let first = load_ledger(store.as_ref(), "coach-1").await.unwrap();
        let second = load_ledger(store.as_ref(), "coach-1").await.unwrap();

        let tasks: Vec<_> = [first, second]
            .into_iter()
            .enumerate()
            .map(|(n, ledger)| {
                let store = Arc::clone(&store);
                let settings = settings.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        let event = feedback(&format!("Webinar {n}"), FeedbackAction::Accept);
                        submit_feedback(store.as_ref(), &ledger, "coach-1", event, &settings)
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let log = store.feedback_log("coach-1").await.unwrap();
        let sequences: Vec<u64> = log.iter().map(|event| event.sequence).collect();
        assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn forecast_reads_only_earlier_periods() {
        let store = MemoryStore::new();
        store.insert_metrics(vec![
            snapshot("leads", "2026-03", 420.0, 12.0),
            snapshot("leads", "2026-01", 400.0, 0.0),
            snapshot("leads", "2026-04", 430.0, 2.4),
            snapshot("leads", "2026-02", 410.0, 2.5),
        ]);
        assert_eq!(
            store.metric_history("leads", None, "2026-03", 8).await.unwrap(),
            vec![400.0, 410.0]
        );

        let settings = EngineSettings::default();
        let result = forecast_metrics(&store, "2026-03", None, Horizon::Month, &settings)
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.forecasted_total, 470.0);
        assert_eq!(result.confidence_tier, ConfidenceTier::Medium);
    }

    #[tokio::test]
    async fn earliest_period_has_no_history() {
        let store = MemoryStore::new();
        store.insert_metrics(
            ["2026-01", "2026-02", "2026-03", "2026-04"]
                .into_iter()
                .map(|period| snapshot("leads", period, 400.0, 0.0)),
        );
        let settings = EngineSettings::default();

        let result = forecast_metrics(&store, "2026-01", None, Horizon::Month, &settings)
            .await
            .unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.confidence_tier, ConfidenceTier::Low);
    }

    #[tokio::test]
    async fn correlation_with_no_samples_is_neutral() {
        let store = MemoryStore::new();
        store.insert_samples(vec![BiometricSample {
            subject_id: "client-1".to_string(),
            sampled_on: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            heart_rate_avg: 70.0,
            hrv_ms: 20.0,
            sleep_quality: 30.0,
            recovery_state: RecoveryState::Fatigue,
        }]);
        let since = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let settings = EngineSettings::default();
        let result = correlate_subject(&store, "client-1", 75.0, since, &settings)
            .await
            .unwrap();
        assert_eq!(result.sample_count, 0);
        assert!(!result.alerts.fatigue);
    }

    #[tokio::test]
    async fn strategy_advances_until_completed() {
        let store = MemoryStore::new();
        let strategy = WeeklyStrategy {
            id: Uuid::new_v4(),
            user_id: "coach-1".to_string(),
            week_start: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            title: "Lead week".to_string(),
            focus: vec![],
            status: StrategyStatus::Draft,
        };
        store.save_strategy(&strategy).await.unwrap();

        for expected in [
            StrategyStatus::Approved,
            StrategyStatus::Executing,
            StrategyStatus::Completed,
        ] {
            let next = advance_strategy(&store, strategy.id).await.unwrap();
            assert_eq!(next.status, expected);
        }
        let err = advance_strategy(&store, strategy.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Transition(TransitionError::Unchanged { .. })
        ));
    }

    #[tokio::test]
    async fn activation_moves_are_persisted() {
        let store = MemoryStore::new();
        let item = ActivationItem {
            id: Uuid::new_v4(),
            user_id: "coach-1".to_string(),
            title: "Referral week".to_string(),
            channel: "email".to_string(),
            status: ActivationStatus::Suggested,
            reopened_from: None,
        };
        store.save_activation(&item).await.unwrap();

        move_activation(&store, item.id, ActivationStatus::Dismissed)
            .await
            .unwrap();
        assert!(move_activation(&store, item.id, ActivationStatus::Scheduled)
            .await
            .is_err());
        let reopened = reopen_activation(&store, item.id).await.unwrap();
        assert_eq!(
            store.activation(reopened.id).await.unwrap().unwrap().reopened_from,
            Some(item.id)
        );
        assert!(matches!(
            move_activation(&store, Uuid::new_v4(), ActivationStatus::Scheduled).await,
            Err(EngineError::NotFound { .. })
        ));
    }
}
