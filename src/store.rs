use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::ThresholdConfig;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{ActivationItem, WeeklyStrategy};
use crate::models::{BiometricSample, FeedbackEvent, MetricSnapshot, NewFeedback};

#[async_trait]
pub trait ThresholdRepository: Send + Sync {
    async fn thresholds(&self, user_id: &str) -> EngineResult<Option<ThresholdConfig>>;

    /// Stores a config that has already passed validation. Callers go
    /// through [`save_thresholds`].
    async fn put_thresholds(&self, user_id: &str, config: &ThresholdConfig) -> EngineResult<()>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Persists one event and returns it with the id and per-user sequence
    /// the store assigned. Concurrent callers never receive the same sequence.
    async fn append_feedback(
        &self,
        user_id: &str,
        feedback: &NewFeedback,
    ) -> EngineResult<FeedbackEvent>;

    async fn feedback_log(&self, user_id: &str) -> EngineResult<Vec<FeedbackEvent>>;
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn metric_snapshots(
        &self,
        period: &str,
        persona: Option<&str>,
    ) -> EngineResult<Vec<MetricSnapshot>>;

    /// Values of one metric from the `limit` periods just before `before`,
    /// oldest first. Periods compare as `YYYY-MM` strings.
    async fn metric_history(
        &self,
        metric_id: &str,
        persona: Option<&str>,
        before: &str,
        limit: usize,
    ) -> EngineResult<Vec<f64>>;
}

#[async_trait]
pub trait BiometricSource: Send + Sync {
    async fn biometric_samples(
        &self,
        subject_id: &str,
        since: NaiveDate,
    ) -> EngineResult<Vec<BiometricSample>>;
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn strategy(&self, id: Uuid) -> EngineResult<Option<WeeklyStrategy>>;
    async fn save_strategy(&self, strategy: &WeeklyStrategy) -> EngineResult<()>;
    async fn activation(&self, id: Uuid) -> EngineResult<Option<ActivationItem>>;
    async fn save_activation(&self, item: &ActivationItem) -> EngineResult<()>;
}

pub async fn save_thresholds<R>(
    repo: &R,
    user_id: &str,
    config: &ThresholdConfig,
) -> EngineResult<()>
where
    R: ThresholdRepository + ?Sized,
{
    if let Err(err) = config.validate() {
        tracing::warn!(user = user_id, error = %err, "rejected threshold config");
        return Err(err.into());
    }
    repo.put_thresholds(user_id, config).await
}

/// The user's saved thresholds, or the defaults when none were saved.
pub async fn load_thresholds<R>(repo: &R, user_id: &str) -> EngineResult<ThresholdConfig>
where
    R: ThresholdRepository + ?Sized,
{
    Ok(repo.thresholds(user_id).await?.unwrap_or_default())
}

/// Process-local store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    thresholds: Mutex<HashMap<String, ThresholdConfig>>,
    feedback: Mutex<HashMap<String, Vec<FeedbackEvent>>>,
    metrics: Mutex<Vec<MetricSnapshot>>,
    samples: Mutex<Vec<BiometricSample>>,
    strategies: Mutex<HashMap<Uuid, WeeklyStrategy>>,
    activations: Mutex<HashMap<Uuid, ActivationItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_metrics(&self, snapshots: impl IntoIterator<Item = MetricSnapshot>) {
        self.metrics.lock().extend(snapshots);
    }

    pub fn insert_samples(&self, samples: impl IntoIterator<Item = BiometricSample>) {
        self.samples.lock().extend(samples);
    }
}

#[async_trait]
impl ThresholdRepository for MemoryStore {
    async fn thresholds(&self, user_id: &str) -> EngineResult<Option<ThresholdConfig>> {
        Ok(self.thresholds.lock().get(user_id).cloned())
    }

    async fn put_thresholds(&self, user_id: &str, config: &ThresholdConfig) -> EngineResult<()> {
        self.thresholds
            .lock()
            .insert(user_id.to_string(), config.clone());
        Ok(())
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn append_feedback(
        &self,
        user_id: &str,
        feedback: &NewFeedback,
    ) -> EngineResult<FeedbackEvent> {
        let mut feedback_by_user = self.feedback.lock();
        let log = feedback_by_user.entry(user_id.to_string()).or_default();
        let sequence = log.last().map_or(1, |last| last.sequence + 1);
        let event = feedback.clone().into_event(Uuid::new_v4(), sequence);
        log.push(event.clone());
        Ok(event)
    }

    async fn feedback_log(&self, user_id: &str) -> EngineResult<Vec<FeedbackEvent>> {
        Ok(self
            .feedback
            .lock()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl MetricsSource for MemoryStore {
    async fn metric_snapshots(
        &self,
        period: &str,
        persona: Option<&str>,
    ) -> EngineResult<Vec<MetricSnapshot>> {
        Ok(self
            .metrics
            .lock()
            .iter()
            .filter(|snapshot| snapshot.period == period)
            .filter(|snapshot| persona.is_none() || snapshot.segment.as_deref() == persona)
            .cloned()
            .collect())
    }

    async fn metric_history(
        &self,
        metric_id: &str,
        persona: Option<&str>,
        before: &str,
        limit: usize,
    ) -> EngineResult<Vec<f64>> {
        let metrics = self.metrics.lock();
        let mut earlier: Vec<&MetricSnapshot> = metrics
            .iter()
            .filter(|snapshot| snapshot.id == metric_id && snapshot.period.as_str() < before)
            .filter(|snapshot| persona.is_none() || snapshot.segment.as_deref() == persona)
            .collect();
        earlier.sort_by(|a, b| a.period.cmp(&b.period));
        let skip = earlier.len().saturating_sub(limit);
        Ok(earlier[skip..].iter().map(|snapshot| snapshot.value).collect())
    }
}

#[async_trait]
impl BiometricSource for MemoryStore {
    async fn biometric_samples(
        &self,
        subject_id: &str,
        since: NaiveDate,
    ) -> EngineResult<Vec<BiometricSample>> {
        Ok(self
            .samples
            .lock()
            .iter()
            .filter(|sample| sample.subject_id == subject_id && sample.sampled_on >= since)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn strategy(&self, id: Uuid) -> EngineResult<Option<WeeklyStrategy>> {
        Ok(self.strategies.lock().get(&id).cloned())
    }

    async fn save_strategy(&self, strategy: &WeeklyStrategy) -> EngineResult<()> {
        self.strategies.lock().insert(strategy.id, strategy.clone());
        Ok(())
    }

    async fn activation(&self, id: Uuid) -> EngineResult<Option<ActivationItem>> {
        Ok(self.activations.lock().get(&id).cloned())
    }

    async fn save_activation(&self, item: &ActivationItem) -> EngineResult<()> {
        self.activations.lock().insert(item.id, item.clone());
        Ok(())
    }
}

pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> EngineError {
    EngineError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;

    #[tokio::test]
    async fn invalid_thresholds_are_not_saved() {
        let store = MemoryStore::new();
        let config = ThresholdConfig {
            good: 90.0,
            ..ThresholdConfig::default()
        };

        let err = save_thresholds(&store, "coach-1", &config).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Configuration(ConfigurationError::NonMonotonic { .. })
        ));
        assert_eq!(store.thresholds("coach-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn thresholds_round_trip_per_user() {
        let store = MemoryStore::new();
        let config = ThresholdConfig {
            name: "strict".to_string(),
            excellent: 90.0,
            ..ThresholdConfig::default()
        };
        save_thresholds(&store, "coach-1", &config).await.unwrap();

        assert_eq!(load_thresholds(&store, "coach-1").await.unwrap(), config);
        assert_eq!(
            load_thresholds(&store, "coach-2").await.unwrap(),
            ThresholdConfig::default()
        );
    }
}
