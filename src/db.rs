use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::config::ThresholdConfig;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{ActivationItem, ActivationStatus, StrategyStatus, WeeklyStrategy};
use crate::models::{
    BiometricSample, ExpectedRange, FeedbackAction, FeedbackContext, FeedbackEvent, MetricSnapshot,
    NewFeedback, RecoveryState, SubjectType, TrendDirection,
};
use crate::risk;
use crate::store::{
    BiometricSource, FeedbackStore, MetricsSource, StatusStore, ThresholdRepository,
};

pub async fn init_db(pool: &PgPool) -> EngineResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn upsert_metric(
        &self,
        snapshot: &MetricSnapshot,
        source_key: &str,
    ) -> EngineResult<bool> {
        let range = snapshot.expected_range.unwrap_or_default();
        let result = sqlx::query(
            r#"
            INSERT INTO signal_engine.metric_snapshots
            (id, metric_id, label, value, unit, period, target, range_min, range_max,
             trend_direction, change_percentage, segment, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&snapshot.id)
        .bind(&snapshot.label)
        .bind(snapshot.value)
        .bind(&snapshot.unit)
        .bind(&snapshot.period)
        .bind(snapshot.target)
        .bind(range.min)
        .bind(range.max)
        .bind(snapshot.trend_direction.as_str())
        .bind(snapshot.change_percentage)
        .bind(snapshot.segment.as_deref().unwrap_or("all"))
        .bind(source_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_sample(&self, sample: &BiometricSample) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_engine.biometric_samples
            (id, subject_id, sampled_on, heart_rate_avg, hrv_ms, sleep_quality, recovery_state)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (subject_id, sampled_on) DO UPDATE
            SET heart_rate_avg = EXCLUDED.heart_rate_avg,
                hrv_ms = EXCLUDED.hrv_ms,
                sleep_quality = EXCLUDED.sleep_quality,
                recovery_state = EXCLUDED.recovery_state
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&sample.subject_id)
        .bind(sample.sampled_on)
        .bind(sample.heart_rate_avg)
        .bind(sample.hrv_ms)
        .bind(sample.sleep_quality)
        .bind(sample.recovery_state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ThresholdRepository for PgStore {
    async fn thresholds(&self, user_id: &str) -> EngineResult<Option<ThresholdConfig>> {
        let row = sqlx::query(
            "SELECT name, excellent, good, fair, poor, risk_trend_threshold \
             FROM signal_engine.threshold_configs WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ThresholdConfig {
            name: row.get("name"),
            excellent: row.get("excellent"),
            good: row.get("good"),
            fair: row.get("fair"),
            poor: row.get("poor"),
            risk_trend_threshold: row.get("risk_trend_threshold"),
        }))
    }

    async fn put_thresholds(&self, user_id: &str, config: &ThresholdConfig) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_engine.threshold_configs
            (user_id, name, excellent, good, fair, poor, risk_trend_threshold)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE
            SET name = EXCLUDED.name,
                excellent = EXCLUDED.excellent,
                good = EXCLUDED.good,
                fair = EXCLUDED.fair,
                poor = EXCLUDED.poor,
                risk_trend_threshold = EXCLUDED.risk_trend_threshold,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(&config.name)
        .bind(config.excellent)
        .bind(config.good)
        .bind(config.fair)
        .bind(config.poor)
        .bind(config.risk_trend_threshold)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FeedbackStore for PgStore {
    async fn append_feedback(
        &self,
        user_id: &str,
        feedback: &NewFeedback,
    ) -> EngineResult<FeedbackEvent> {
        let mut tx = self.pool.begin().await?;
        let event = insert_feedback(&mut *tx, user_id, feedback).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn feedback_log(&self, user_id: &str) -> EngineResult<Vec<FeedbackEvent>> {
        let rows = sqlx::query(
            "SELECT id, sequence, subject_id, subject_type, action, reason, context, recorded_at \
             FROM signal_engine.feedback_events WHERE user_id = $1 ORDER BY sequence",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(feedback_from_row).collect()
    }
}

#[async_trait]
impl MetricsSource for PgStore {
    async fn metric_snapshots(
        &self,
        period: &str,
        persona: Option<&str>,
    ) -> EngineResult<Vec<MetricSnapshot>> {
        let mut query = String::from(
            "SELECT metric_id, label, value, unit, period, target, range_min, range_max, \
             trend_direction, change_percentage, segment \
             FROM signal_engine.metric_snapshots WHERE period = $1",
        );
        if persona.is_some() {
            query.push_str(" AND segment = $2");
        }
        query.push_str(" ORDER BY recorded_at, metric_id");

        let mut rows = sqlx::query(&query).bind(period);
        if let Some(value) = persona {
            rows = rows.bind(value);
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut snapshots = Vec::with_capacity(records.len());

        for row in records {
            let range_min: Option<f64> = row.get("range_min");
            let range_max: Option<f64> = row.get("range_max");
            let trend: String = row.get("trend_direction");
            snapshots.push(MetricSnapshot {
                id: row.get("metric_id"),
                label: row.get("label"),
                value: row.get("value"),
                unit: row.get("unit"),
                period: row.get("period"),
                target: row.get("target"),
                expected_range: (range_min.is_some() || range_max.is_some())
                    .then(|| ExpectedRange::new(range_min, range_max)),
                trend_direction: TrendDirection::parse(&trend),
                change_percentage: row.get("change_percentage"),
                segment: row.get("segment"),
            });
        }

        Ok(snapshots)
    }

    async fn metric_history(
        &self,
        metric_id: &str,
        persona: Option<&str>,
        before: &str,
        limit: usize,
    ) -> EngineResult<Vec<f64>> {
        let rows = sqlx::query(
            r#"
            SELECT value FROM (
                SELECT value, period FROM signal_engine.metric_snapshots
                WHERE metric_id = $1
                  AND ($2::text IS NULL OR segment = $2)
                  AND period < $3
                ORDER BY period DESC
                LIMIT $4
            ) recent
            ORDER BY period ASC
            "#,
        )
        .bind(metric_id)
        .bind(persona)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("value")).collect())
    }
}

#[async_trait]
impl BiometricSource for PgStore {
    async fn biometric_samples(
        &self,
        subject_id: &str,
        since: NaiveDate,
    ) -> EngineResult<Vec<BiometricSample>> {
        let rows = sqlx::query(
            "SELECT subject_id, sampled_on, heart_rate_avg, hrv_ms, sleep_quality, recovery_state \
             FROM signal_engine.biometric_samples \
             WHERE subject_id = $1 AND sampled_on >= $2 ORDER BY sampled_on",
        )
        .bind(subject_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> EngineResult<BiometricSample> {
                let state: String = row.get("recovery_state");
                Ok(BiometricSample {
                    subject_id: row.get("subject_id"),
                    sampled_on: row.get("sampled_on"),
                    heart_rate_avg: row.get("heart_rate_avg"),
                    hrv_ms: row.get("hrv_ms"),
                    sleep_quality: row.get("sleep_quality"),
                    recovery_state: RecoveryState::parse(&state)
                        .ok_or_else(|| invalid("recovery_state", &state))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StatusStore for PgStore {
    async fn strategy(&self, id: Uuid) -> EngineResult<Option<WeeklyStrategy>> {
        let row = sqlx::query(
            "SELECT id, user_id, week_start, title, focus, status \
             FROM signal_engine.weekly_strategies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> EngineResult<WeeklyStrategy> {
            let status: String = row.get("status");
            Ok(WeeklyStrategy {
                id: row.get("id"),
                user_id: row.get("user_id"),
                week_start: row.get("week_start"),
                title: row.get("title"),
                focus: row.get("focus"),
                status: StrategyStatus::parse(&status)
                    .ok_or_else(|| invalid("status", &status))?,
            })
        })
        .transpose()
    }

    async fn save_strategy(&self, strategy: &WeeklyStrategy) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_engine.weekly_strategies
            (id, user_id, week_start, title, focus, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status, updated_at = now()
            "#,
        )
        .bind(strategy.id)
        .bind(&strategy.user_id)
        .bind(strategy.week_start)
        .bind(&strategy.title)
        .bind(&strategy.focus)
        .bind(strategy.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn activation(&self, id: Uuid) -> EngineResult<Option<ActivationItem>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, channel, status, reopened_from \
             FROM signal_engine.activation_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> EngineResult<ActivationItem> {
            let status: String = row.get("status");
            Ok(ActivationItem {
                id: row.get("id"),
                user_id: row.get("user_id"),
                title: row.get("title"),
                channel: row.get("channel"),
                status: ActivationStatus::parse(&status)
                    .ok_or_else(|| invalid("status", &status))?,
                reopened_from: row.get("reopened_from"),
            })
        })
        .transpose()
    }

    async fn save_activation(&self, item: &ActivationItem) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_engine.activation_items
            (id, user_id, title, channel, status, reopened_from)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status, updated_at = now()
            "#,
        )
        .bind(item.id)
        .bind(&item.user_id)
        .bind(&item.title)
        .bind(&item.channel)
        .bind(item.status.as_str())
        .bind(item.reopened_from)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub async fn seed(store: &PgStore, user_id: &str) -> EngineResult<()> {
    let kpis = [
        ("leads", "Leads", "count", [(395.0, 2.0), (352.0, -10.9)]),
        ("funnel-revenue", "Funnel revenue", "eur", [(41_200.0, 4.1), (38_900.0, -5.6)]),
        ("email-ctr", "Email CTR", "percent", [(6.1, 0.0), (4.2, -31.1)]),
        ("roas", "ROAS", "ratio", [(4.4, 3.0), (7.4, 68.2)]),
        ("social-growth", "Social growth", "percent", [(9.5, 1.5), (10.2, 7.4)]),
    ];
    let periods = ["2026-01", "2026-02"];

    for (metric_id, label, unit, readings) in kpis {
        for (period, (value, change)) in periods.iter().zip(readings) {
            let snapshot = MetricSnapshot {
                id: metric_id.to_string(),
                label: label.to_string(),
                value,
                unit: unit.to_string(),
                period: period.to_string(),
                target: None,
                expected_range: risk::persona_range("all", metric_id),
                trend_direction: direction_for(change),
                change_percentage: change,
                segment: Some("all".to_string()),
            };
            store
                .upsert_metric(&snapshot, &format!("seed-{metric_id}-{period}"))
                .await?;
        }
    }

    let samples = [
        (1, 62.0, 58.0, 81.0, RecoveryState::Recovered),
        (2, 66.0, 49.0, 72.0, RecoveryState::Recovering),
        (3, 71.0, 38.0, 55.0, RecoveryState::Overload),
        (4, 69.0, 41.0, 63.0, RecoveryState::Fatigue),
    ];
    for (day, heart_rate_avg, hrv_ms, sleep_quality, recovery_state) in samples {
        store
            .upsert_sample(&BiometricSample {
                subject_id: "client-avery".to_string(),
                sampled_on: NaiveDate::from_ymd_opt(2026, 2, day)
                    .ok_or_else(|| invalid("day", day))?,
                heart_rate_avg,
                hrv_ms,
                sleep_quality,
                recovery_state,
            })
            .await?;
    }

    let strategy = WeeklyStrategy {
        id: Uuid::parse_str("6f1c2d7a-3b4e-4c8f-9a10-2b3c4d5e6f70")
            .map_err(|_| invalid("id", "strategy"))?,
        user_id: user_id.to_string(),
        week_start: NaiveDate::from_ymd_opt(2026, 2, 2)
            .ok_or_else(|| invalid("week_start", "2026-02-02"))?,
        title: "Lead capture sprint".to_string(),
        focus: vec!["capture_leads".to_string(), "grow_audience".to_string()],
        status: StrategyStatus::Draft,
    };
    store.save_strategy(&strategy).await?;

    let activation = ActivationItem {
        id: Uuid::parse_str("0a9b8c7d-6e5f-4a3b-8c2d-1e0f9a8b7c6d")
            .map_err(|_| invalid("id", "activation"))?,
        user_id: user_id.to_string(),
        title: "Referral challenge for February".to_string(),
        channel: "email".to_string(),
        status: ActivationStatus::Suggested,
        reopened_from: None,
    };
    store.save_activation(&activation).await?;

    info!(user = user_id, "seed data inserted");
    Ok(())
}

pub async fn import_metrics_csv(
    store: &PgStore,
    csv_path: &std::path::Path,
) -> EngineResult<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        metric_id: String,
        label: String,
        value: f64,
        unit: String,
        period: String,
        target: Option<f64>,
        range_min: Option<f64>,
        range_max: Option<f64>,
        trend: String,
        segment: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let change = risk::parse_trend(&row.trend);
        let segment = row.segment.unwrap_or_else(|| "all".to_string());
        let expected_range = if row.range_min.is_some() || row.range_max.is_some() {
            Some(ExpectedRange::new(row.range_min, row.range_max))
        } else {
            risk::persona_range(&segment, &row.metric_id)
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let snapshot = MetricSnapshot {
            id: row.metric_id,
            label: row.label,
            value: row.value,
            unit: row.unit,
            period: row.period,
            target: row.target,
            expected_range,
            trend_direction: direction_for(change),
            change_percentage: change,
            segment: Some(segment),
        };

        if store.upsert_metric(&snapshot, &source_key).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Imports every row or none: a bad row rolls back the rows before it.
pub async fn import_feedback_csv(
    store: &PgStore,
    user_id: &str,
    csv_path: &std::path::Path,
) -> EngineResult<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        subject_id: String,
        subject_type: String,
        action: String,
        reason: Option<String>,
        title: String,
        description: Option<String>,
        recorded_at: DateTime<Utc>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut tx = store.pool().begin().await?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let feedback = NewFeedback {
            subject_type: SubjectType::parse(&row.subject_type)
                .ok_or_else(|| invalid("subject_type", &row.subject_type))?,
            action: FeedbackAction::parse(&row.action)
                .ok_or_else(|| invalid("action", &row.action))?,
            subject_id: row.subject_id,
            reason: row.reason.filter(|reason| !reason.is_empty()),
            context: FeedbackContext {
                title: row.title,
                description: row.description.unwrap_or_default(),
                impact: None,
            },
            timestamp: row.recorded_at,
        };
        insert_feedback(&mut *tx, user_id, &feedback).await?;
        inserted += 1;
    }

    tx.commit().await?;
    info!(user = user_id, inserted, "feedback imported");
    Ok(inserted)
}

/// Claims the user's next sequence and writes the event. The counter row
/// stays locked until the caller's transaction ends, so writers queue.
async fn insert_feedback(
    conn: &mut PgConnection,
    user_id: &str,
    feedback: &NewFeedback,
) -> EngineResult<FeedbackEvent> {
    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO signal_engine.feedback_sequences (user_id, last_sequence)
        SELECT $1, COALESCE(MAX(sequence), 0) + 1
        FROM signal_engine.feedback_events WHERE user_id = $1
        ON CONFLICT (user_id) DO UPDATE
        SET last_sequence = signal_engine.feedback_sequences.last_sequence + 1
        RETURNING last_sequence
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let event = feedback
        .clone()
        .into_event(Uuid::new_v4(), sequence.max(1) as u64);
    sqlx::query(
        r#"
        INSERT INTO signal_engine.feedback_events
        (id, user_id, sequence, subject_id, subject_type, action, reason, context, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(event.id)
    .bind(user_id)
    .bind(sequence)
    .bind(&event.subject_id)
    .bind(event.subject_type.as_str())
    .bind(event.action.as_str())
    .bind(&event.reason)
    .bind(Json(&event.context))
    .bind(event.timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(event)
}

fn feedback_from_row(row: &PgRow) -> EngineResult<FeedbackEvent> {
    let subject_type: String = row.get("subject_type");
    let action: String = row.get("action");
    let sequence: i64 = row.get("sequence");
    let context: Json<FeedbackContext> = row.get("context");

    Ok(FeedbackEvent {
        id: row.get("id"),
        sequence: sequence.max(0) as u64,
        subject_id: row.get("subject_id"),
        subject_type: SubjectType::parse(&subject_type)
            .ok_or_else(|| invalid("subject_type", &subject_type))?,
        action: FeedbackAction::parse(&action).ok_or_else(|| invalid("action", &action))?,
        reason: row.get("reason"),
        context: context.0,
        timestamp: row.get("recorded_at"),
    })
}

fn direction_for(change: f64) -> TrendDirection {
    if change > 0.0 {
        TrendDirection::Up
    } else if change < 0.0 {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    }
}

fn invalid(field: &'static str, value: impl ToString) -> EngineError {
    EngineError::InvalidField {
        field,
        value: value.to_string(),
    }
}
