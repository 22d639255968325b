use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::TransitionError;

/// A status-bearing entity with a fixed set of legal moves.
pub trait Lifecycle: Clone {
    type Status: Copy + Eq;

    const ENTITY: &'static str;

    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
    fn allows(from: Self::Status, to: Self::Status) -> bool;
    fn status_name(status: Self::Status) -> &'static str;
}

/// Returns the entity moved to `to`, or the reason the move is illegal.
/// The input is never modified.
pub fn transition<E: Lifecycle>(entity: &E, to: E::Status) -> Result<E, TransitionError> {
    let from = entity.status();
    if from == to {
        return Err(TransitionError::Unchanged {
            entity: E::ENTITY,
            status: E::status_name(from),
        });
    }
    if !E::allows(from, to) {
        warn!(
            entity = E::ENTITY,
            from = E::status_name(from),
            to = E::status_name(to),
            "rejected status transition"
        );
        return Err(TransitionError::Illegal {
            entity: E::ENTITY,
            from: E::status_name(from),
            to: E::status_name(to),
        });
    }
    let mut next = entity.clone();
    next.set_status(to);
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Draft,
    Approved,
    Executing,
    Completed,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Draft => "draft",
            StrategyStatus::Approved => "approved",
            StrategyStatus::Executing => "executing",
            StrategyStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(StrategyStatus::Draft),
            "approved" => Some(StrategyStatus::Approved),
            "executing" => Some(StrategyStatus::Executing),
            "completed" => Some(StrategyStatus::Completed),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            StrategyStatus::Draft => Some(StrategyStatus::Approved),
            StrategyStatus::Approved => Some(StrategyStatus::Executing),
            StrategyStatus::Executing => Some(StrategyStatus::Completed),
            StrategyStatus::Completed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyStrategy {
    pub id: Uuid,
    pub user_id: String,
    pub week_start: chrono::NaiveDate,
    pub title: String,
    pub focus: Vec<String>,
    pub status: StrategyStatus,
}

impl Lifecycle for WeeklyStrategy {
    type Status = StrategyStatus;

    const ENTITY: &'static str = "weekly strategy";

    fn status(&self) -> StrategyStatus {
        self.status
    }

    fn set_status(&mut self, status: StrategyStatus) {
        self.status = status;
    }

    fn allows(from: StrategyStatus, to: StrategyStatus) -> bool {
        from.next() == Some(to)
    }

    fn status_name(status: StrategyStatus) -> &'static str {
        status.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    Suggested,
    Scheduled,
    Dismissed,
    Completed,
}

impl ActivationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationStatus::Suggested => "suggested",
            ActivationStatus::Scheduled => "scheduled",
            ActivationStatus::Dismissed => "dismissed",
            ActivationStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "suggested" => Some(ActivationStatus::Suggested),
            "scheduled" => Some(ActivationStatus::Scheduled),
            "dismissed" => Some(ActivationStatus::Dismissed),
            "completed" => Some(ActivationStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivationStatus::Dismissed | ActivationStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationItem {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub channel: String,
    pub status: ActivationStatus,
    pub reopened_from: Option<Uuid>,
}

impl Lifecycle for ActivationItem {
    type Status = ActivationStatus;

    const ENTITY: &'static str = "activation";

    fn status(&self) -> ActivationStatus {
        self.status
    }

    fn set_status(&mut self, status: ActivationStatus) {
        self.status = status;
    }

    fn allows(from: ActivationStatus, to: ActivationStatus) -> bool {
        matches!(
            (from, to),
            (ActivationStatus::Suggested, ActivationStatus::Scheduled)
                | (ActivationStatus::Suggested, ActivationStatus::Dismissed)
                | (ActivationStatus::Scheduled, ActivationStatus::Completed)
        )
    }

    fn status_name(status: ActivationStatus) -> &'static str {
        status.as_str()
    }
}

impl ActivationItem {
    /// A fresh suggestion derived from a finished or dismissed activation.
    /// The original keeps its terminal status.
    pub fn reopen(&self) -> Result<ActivationItem, TransitionError> {
        if !self.status.is_terminal() {
            return Err(TransitionError::Illegal {
                entity: Self::ENTITY,
                from: self.status.as_str(),
                to: ActivationStatus::Suggested.as_str(),
            });
        }
        Ok(ActivationItem {
            id: Uuid::new_v4(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            channel: self.channel.clone(),
            status: ActivationStatus::Suggested,
            reopened_from: Some(self.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn strategy(status: StrategyStatus) -> WeeklyStrategy {
        WeeklyStrategy {
            id: Uuid::new_v4(),
            user_id: "coach-1".to_string(),
            week_start: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            title: "Spring lead push".to_string(),
            focus: vec!["capture_leads".to_string()],
            status,
        }
    }

    fn activation(status: ActivationStatus) -> ActivationItem {
        ActivationItem {
            id: Uuid::new_v4(),
            user_id: "coach-1".to_string(),
            title: "Referral week".to_string(),
            channel: "email".to_string(),
            status,
            reopened_from: None,
        }
    }

    #[test]
    fn strategy_moves_strictly_forward() {
        let draft = strategy(StrategyStatus::Draft);
        let approved = transition(&draft, StrategyStatus::Approved).unwrap();
        let executing = transition(&approved, StrategyStatus::Executing).unwrap();
        let completed = transition(&executing, StrategyStatus::Completed).unwrap();
        assert_eq!(completed.status, StrategyStatus::Completed);
        assert_eq!(draft.status, StrategyStatus::Draft);
    }

    #[test]
    fn strategy_rejects_skips_and_reversals() {
        let draft = strategy(StrategyStatus::Draft);
        assert_eq!(
            transition(&draft, StrategyStatus::Executing).unwrap_err(),
            TransitionError::Illegal {
                entity: "weekly strategy",
                from: "draft",
                to: "executing",
            }
        );
        let executing = strategy(StrategyStatus::Executing);
        assert!(transition(&executing, StrategyStatus::Approved).is_err());
        assert!(matches!(
            transition(&executing, StrategyStatus::Executing),
            Err(TransitionError::Unchanged { .. })
        ));
        assert_eq!(StrategyStatus::Completed.next(), None);
    }

    #[test]
    fn activation_branches() {
        let suggested = activation(ActivationStatus::Suggested);
        let scheduled = transition(&suggested, ActivationStatus::Scheduled).unwrap();
        assert!(transition(&scheduled, ActivationStatus::Completed).is_ok());
        let dismissed = transition(&suggested, ActivationStatus::Dismissed).unwrap();
        assert!(transition(&dismissed, ActivationStatus::Completed).is_err());
        assert!(transition(&dismissed, ActivationStatus::Scheduled).is_err());
        assert!(transition(&suggested, ActivationStatus::Completed).is_err());
    }

    #[test]
    fn reopening_creates_linked_suggestion() {
        let dismissed = activation(ActivationStatus::Dismissed);
        let reopened = dismissed.reopen().unwrap();
        assert_eq!(reopened.status, ActivationStatus::Suggested);
        assert_eq!(reopened.reopened_from, Some(dismissed.id));
        assert_ne!(reopened.id, dismissed.id);
        assert_eq!(dismissed.status, ActivationStatus::Dismissed);

        assert!(activation(ActivationStatus::Scheduled).reopen().is_err());
    }
}
