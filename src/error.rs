use thiserror::Error;

/// Raised when a threshold configuration cannot be saved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("threshold `{name}` must be a finite number")]
    NonFinite { name: &'static str },
    #[error(
        "thresholds must be ordered descending: \
         {upper} ({upper_value}) < {lower} ({lower_value})"
    )]
    NonMonotonic {
        upper: &'static str,
        upper_value: f64,
        lower: &'static str,
        lower_value: f64,
    },
    #[error("risk trend threshold must be zero or negative, got {0}")]
    PositiveRiskThreshold(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{entity} cannot move from {from} to {to}")]
    Illegal {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("{entity} is already {status}")]
    Unchanged {
        entity: &'static str,
        status: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid {field} `{value}`")]
    InvalidField { field: &'static str, value: String },
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
