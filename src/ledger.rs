use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{FeedbackEvent, NewFeedback};

/// Append-only feedback log shared across sessions.
///
/// Readers clone the current `Arc` and keep a frozen view of everything
/// published so far. Writers push in place while no view is outstanding and
/// copy the log only when a reader still holds the previous one.
#[derive(Debug, Default)]
pub struct FeedbackLedger {
    events: RwLock<Arc<Vec<FeedbackEvent>>>,
}

/// A consistent, immutable view of the ledger at one point in time.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot(Arc<Vec<FeedbackEvent>>);

impl Deref for LedgerSnapshot {
    type Target = [FeedbackEvent];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from persisted events, ordered by sequence.
    pub fn from_events(mut events: Vec<FeedbackEvent>) -> Self {
        events.sort_by_key(|event| event.sequence);
        Self {
            events: RwLock::new(Arc::new(events)),
        }
    }

    /// Records feedback that has no backing store, numbering it after the
    /// last event in the log.
    pub fn append(&self, feedback: NewFeedback) -> FeedbackEvent {
        let mut events = self.events.write();
        let sequence = events.last().map_or(1, |last| last.sequence + 1);
        let event = feedback.into_event(Uuid::new_v4(), sequence);
        Arc::make_mut(&mut *events).push(event.clone());
        debug!(
            sequence,
            subject = %event.subject_id,
            action = event.action.as_str(),
            "feedback appended"
        );
        event
    }

    /// Publishes an event the store has already persisted and numbered.
    /// Events are kept in sequence order; an id already present is ignored.
    pub fn commit(&self, event: FeedbackEvent) {
        let mut events = self.events.write();
        let position = events.partition_point(|existing| existing.sequence <= event.sequence);
        let repeated = events[..position]
            .iter()
            .rev()
            .take_while(|existing| existing.sequence == event.sequence)
            .any(|existing| existing.id == event.id);
        if repeated {
            return;
        }
        debug!(
            sequence = event.sequence,
            subject = %event.subject_id,
            action = event.action.as_str(),
            "feedback committed"
        );
        Arc::make_mut(&mut *events).insert(position, event);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot(Arc::clone(&self.events.read()))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedbackAction, FeedbackContext, SubjectType};
    use chrono::Utc;
    use std::collections::HashSet;
    use std::thread;

    fn feedback(subject: &str, action: FeedbackAction) -> NewFeedback {
        NewFeedback {
            subject_id: subject.to_string(),
            subject_type: SubjectType::Suggestion,
            action,
            reason: None,
            context: FeedbackContext {
                title: "Launch a retargeting campaign".to_string(),
                ..FeedbackContext::default()
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn corrections_are_new_events() {
        let ledger = FeedbackLedger::new();
        ledger.append(feedback("s-1", FeedbackAction::Reject));
        ledger.append(feedback("s-1", FeedbackAction::Accept));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].action, FeedbackAction::Reject);
        assert_eq!(snapshot[1].action, FeedbackAction::Accept);
        assert_eq!(snapshot[1].sequence, 2);
    }

    #[test]
    fn snapshot_is_frozen_after_later_appends() {
        let ledger = FeedbackLedger::new();
        ledger.append(feedback("s-1", FeedbackAction::Accept));
        let before = ledger.snapshot();
        ledger.append(feedback("s-2", FeedbackAction::Apply));

        assert_eq!(before.len(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let ledger = Arc::new(FeedbackLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for n in 0..25 {
                        ledger.append(feedback(&format!("s-{worker}-{n}"), FeedbackAction::Accept));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 200);
        let ids: HashSet<Uuid> = snapshot.iter().map(|event| event.id).collect();
        assert_eq!(ids.len(), 200);
        let sequences: Vec<u64> = snapshot.iter().map(|event| event.sequence).collect();
        assert_eq!(sequences, (1..=200).collect::<Vec<u64>>());
    }

    #[test]
    fn replay_orders_by_sequence() {
        let source = FeedbackLedger::new();
        source.append(feedback("s-1", FeedbackAction::Accept));
        source.append(feedback("s-2", FeedbackAction::Reject));
        let mut events = source.snapshot().to_vec();
        events.reverse();

        let replayed = FeedbackLedger::from_events(events);
        let next = replayed.append(feedback("s-3", FeedbackAction::Apply));
        assert_eq!(next.sequence, 3);
        assert_eq!(replayed.snapshot()[0].subject_id, "s-1");
    }

    #[test]
    fn appends_reuse_the_log_while_no_view_is_held() {
        let ledger = FeedbackLedger::from_events(Vec::with_capacity(16));
        ledger.append(feedback("s-1", FeedbackAction::Accept));
        let buffer = ledger.snapshot().as_ptr();

        for n in 2..=6 {
            ledger.append(feedback(&format!("s-{n}"), FeedbackAction::Accept));
        }
        assert_eq!(ledger.snapshot().as_ptr(), buffer);

        let held = ledger.snapshot();
        ledger.append(feedback("s-7", FeedbackAction::Reject));
        assert_ne!(ledger.snapshot().as_ptr(), held.as_ptr());
        assert_eq!(held.len(), 6);
        assert_eq!(ledger.len(), 7);
    }

    #[test]
    fn commit_keeps_sequence_order_and_ignores_repeats() {
        let source = FeedbackLedger::new();
        let first = source.append(feedback("s-1", FeedbackAction::Accept));
        let second = source.append(feedback("s-2", FeedbackAction::Reject));
        let third = source.append(feedback("s-3", FeedbackAction::Apply));

        let ledger = FeedbackLedger::new();
        ledger.commit(third.clone());
        ledger.commit(first);
        ledger.commit(second);
        ledger.commit(third);

        let sequences: Vec<u64> = ledger.snapshot().iter().map(|event| event.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}
