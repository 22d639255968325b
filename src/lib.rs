//! Metric classification, feedback learning and suggestion ranking for the
//! coaching marketing dashboard.

pub mod alerts;
pub mod config;
pub mod correlation;
pub mod db;
pub mod error;
pub mod forecast;
pub mod learning;
pub mod ledger;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod ranking;
pub mod report;
pub mod risk;
pub mod service;
pub mod store;

pub use config::{EngineSettings, ThresholdConfig};
pub use error::{ConfigurationError, EngineError, EngineResult, TransitionError};
pub use ledger::FeedbackLedger;
