use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ExpectedRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

impl fmt::Display for ExpectedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "{min}-{max}"),
            (Some(min), None) => write!(f, ">= {min}"),
            (None, Some(max)) => write!(f, "<= {max}"),
            (None, None) => write!(f, "unbounded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Neutral => "neutral",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => TrendDirection::Up,
            "down" => TrendDirection::Down,
            _ => TrendDirection::Neutral,
        }
    }
}

/// A single KPI reading for one period. Never mutated once produced; a new
/// period yields a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub id: String,
    pub label: String,
    pub value: f64,
    pub unit: String,
    pub period: String,
    pub target: Option<f64>,
    pub expected_range: Option<ExpectedRange>,
    pub trend_direction: TrendDirection,
    pub change_percentage: f64,
    pub segment: Option<String>,
}

/// Qualitative tier from threshold comparison, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Excellent => "excellent",
            Band::Good => "good",
            Band::Fair => "fair",
            Band::Poor => "poor",
            Band::Critical => "critical",
        }
    }

    pub fn is_below_good(&self) -> bool {
        *self > Band::Good
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Out-of-range alert level. Ordered so that `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// The more urgent of two severities.
    pub fn escalate(self, other: Severity) -> Severity {
        self.min(other)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub band: Band,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub metric_id: String,
    pub message: String,
    pub severity: Severity,
    pub current_value: f64,
    pub expected_range: Option<ExpectedRange>,
    pub segment_tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Accept,
    Reject,
    Apply,
}

impl FeedbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackAction::Accept => "accept",
            FeedbackAction::Reject => "reject",
            FeedbackAction::Apply => "apply",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "accept" => Some(FeedbackAction::Accept),
            "reject" => Some(FeedbackAction::Reject),
            "apply" => Some(FeedbackAction::Apply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Suggestion,
    Alert,
    Strategy,
    Activation,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Suggestion => "suggestion",
            SubjectType::Alert => "alert",
            SubjectType::Strategy => "strategy",
            SubjectType::Activation => "activation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "suggestion" => Some(SubjectType::Suggestion),
            "alert" => Some(SubjectType::Alert),
            "strategy" => Some(SubjectType::Strategy),
            "activation" => Some(SubjectType::Activation),
            _ => None,
        }
    }
}

/// What the user was looking at when they gave feedback. The derived type of
/// the subject is inferred from this text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackContext {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub impact: Option<Impact>,
}

/// Feedback not yet appended to the ledger; the ledger assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub subject_id: String,
    pub subject_type: SubjectType,
    pub action: FeedbackAction,
    pub reason: Option<String>,
    pub context: FeedbackContext,
    pub timestamp: DateTime<Utc>,
}

impl NewFeedback {
    pub fn into_event(self, id: Uuid, sequence: u64) -> FeedbackEvent {
        FeedbackEvent {
            id,
            sequence,
            subject_id: self.subject_id,
            subject_type: self.subject_type,
            action: self.action,
            reason: self.reason,
            context: self.context,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: Uuid,
    pub sequence: u64,
    pub subject_id: String,
    pub subject_type: SubjectType,
    pub action: FeedbackAction,
    pub reason: Option<String>,
    pub context: FeedbackContext,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCount {
    pub derived_type: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub derived_type: String,
    pub accepted: usize,
    pub rejected: usize,
    pub applied: usize,
    pub acceptance_rate: f64,
    pub rejection_rate: f64,
}

impl TypeBreakdown {
    pub fn total(&self) -> usize {
        self.accepted + self.rejected + self.applied
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningProfile {
    pub acceptance_rate: f64,
    pub rejection_rate: f64,
    pub total_feedback: usize,
    pub top_accepted_types: Vec<TypeCount>,
    pub top_rejected_types: Vec<TypeCount>,
    pub common_rejection_reasons: Vec<ReasonCount>,
    pub type_breakdown: Vec<TypeBreakdown>,
    pub improvement_suggestions: Vec<String>,
}

impl LearningProfile {
    pub fn breakdown_for(&self, derived_type: &str) -> Option<&TypeBreakdown> {
        self.type_breakdown
            .iter()
            .find(|entry| entry.derived_type == derived_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::High => "high",
            Impact::Medium => "medium",
            Impact::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub title: String,
    pub description: String,
    pub impact: Impact,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub cta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSuggestion {
    pub suggestion: Suggestion,
    pub derived_type: String,
    pub score: f64,
    pub learning_weight: f64,
    pub matched_strengths: Vec<String>,
    pub matched_objectives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    Recovered,
    Recovering,
    Overload,
    Fatigue,
}

impl RecoveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryState::Recovered => "recovered",
            RecoveryState::Recovering => "recovering",
            RecoveryState::Overload => "overload",
            RecoveryState::Fatigue => "fatigue",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "recovered" => Some(RecoveryState::Recovered),
            "recovering" => Some(RecoveryState::Recovering),
            "overload" => Some(RecoveryState::Overload),
            "fatigue" => Some(RecoveryState::Fatigue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricSample {
    pub subject_id: String,
    pub sampled_on: NaiveDate,
    pub heart_rate_avg: f64,
    pub hrv_ms: f64,
    pub sleep_quality: f64,
    pub recovery_state: RecoveryState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BiometricAverages {
    pub heart_rate_avg: f64,
    pub hrv_ms: f64,
    pub sleep_quality: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAxes {
    pub heart_rate: f64,
    pub hrv: f64,
    pub sleep_quality: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAlerts {
    pub overload: bool,
    pub fatigue: bool,
    pub recovery_insufficient: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub adherence: f64,
    pub sample_count: usize,
    pub biometric_averages: BiometricAverages,
    pub correlation: CorrelationAxes,
    pub alerts: RecoveryAlerts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Week => "7d",
            Horizon::Month => "30d",
            Horizon::Quarter => "90d",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "7d" => Some(Horizon::Week),
            "30d" => Some(Horizon::Month),
            "90d" => Some(Horizon::Quarter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTotals {
    pub entity_id: String,
    pub label: String,
    pub current: f64,
    pub trend_factor: f64,
    /// Prior period totals, oldest first.
    #[serde(default)]
    pub history: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityRecommendation {
    Increase,
    Decrease,
    Maintain,
}

impl CapacityRecommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityRecommendation::Increase => "increase",
            CapacityRecommendation::Decrease => "decrease",
            CapacityRecommendation::Maintain => "maintain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityForecast {
    pub entity_id: String,
    pub label: String,
    pub current_total: f64,
    pub forecasted_total: f64,
    pub growth_percentage: f64,
    pub confidence_tier: ConfidenceTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub horizon: Horizon,
    pub current_total: f64,
    pub forecasted_total: f64,
    pub growth_percentage: f64,
    pub confidence_tier: ConfidenceTier,
    pub capacity_recommendation: CapacityRecommendation,
    pub entities: Vec<EntityForecast>,
}
