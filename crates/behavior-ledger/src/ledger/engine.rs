//! Pure delta arithmetic over student snapshots.
//!
//! Nothing in this module talks to a store. Each operation takes the snapshot the caller
//! just read and returns the snapshot that should be written back, together with the event
//! payload carrying the effective delta that was applied.

use serde::Serialize;

use super::domain::{EventRecord, ScoreCard, ScoreField, ScoredEvent, Student};
use super::policy::{ClampedWarning, ScorePolicy};
use super::validation::EventValidationError;

/// Outcome of applying a new event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub student: Student,
    pub event: EventRecord,
    pub warning: Option<ClampedWarning>,
}

/// Outcome of reversing a persisted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reversed {
    pub student: Student,
    pub warning: Option<ClampedWarning>,
    pub note: Option<LossyReversal>,
}

/// Outcome of replacing a persisted event with new data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replaced {
    pub student: Student,
    pub event: EventRecord,
    pub warning: Option<ClampedWarning>,
}

/// Why a reversal may not restore the value the student had before the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LossyReversal {
    /// A bound truncated the event when it was applied.
    TruncatedOnApply { nominal: i32, applied: i32 },
    /// The reversal itself ran into a bound.
    ClampedOnReverse { naive: i32, settled: i32 },
}

impl LossyReversal {
    pub fn message(&self) -> String {
        match self {
            LossyReversal::TruncatedOnApply { nominal, applied } => format!(
                "event was truncated when applied (nominal {nominal}, applied {applied}); \
                 reconcile to confirm the aggregate"
            ),
            LossyReversal::ClampedOnReverse { naive, settled } => format!(
                "reversal hit a bound ({naive} held at {settled}); reconcile to confirm the aggregate"
            ),
        }
    }
}

/// Stateless ledger applying the score policy to snapshots.
#[derive(Debug, Clone, Default)]
pub struct ScoreLedger {
    policy: ScorePolicy,
}

impl ScoreLedger {
    pub fn new(policy: ScorePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScorePolicy {
        &self.policy
    }

    pub fn apply_new_event(&self, student: &Student, mut event: EventRecord) -> Applied {
        let field = event.kind.field();
        let current = student.scores.get(field);
        let settlement = self
            .policy
            .settle(field, current, event.kind.nominal_delta());

        event.applied_delta = settlement.value - current;

        Applied {
            student: with_score(student, field, settlement.value),
            event,
            warning: settlement.warning,
        }
    }

    /// Undo the stored effective delta. Callers must run this at most once per event.
    pub fn reverse_event(&self, student: &Student, event: &EventRecord) -> Reversed {
        let field = event.kind.field();
        let current = student.scores.get(field);
        let settlement = self.policy.settle(field, current, -event.applied_delta);

        let nominal = event.kind.nominal_delta();
        let note = if event.applied_delta != nominal {
            Some(LossyReversal::TruncatedOnApply {
                nominal,
                applied: event.applied_delta,
            })
        } else {
            settlement
                .warning
                .map(|warning| LossyReversal::ClampedOnReverse {
                    naive: warning.naive,
                    settled: warning.settled,
                })
        };

        Reversed {
            student: with_score(student, field, settlement.value),
            warning: settlement.warning,
            note,
        }
    }

    /// Swap an event's contribution in one clamped step using the net delta.
    pub fn replace_event(
        &self,
        student: &Student,
        old: &EventRecord,
        mut new: EventRecord,
    ) -> Result<Replaced, EventValidationError> {
        if !old.kind.same_variant(&new.kind) {
            return Err(EventValidationError::VariantChanged {
                from: old.kind.label(),
                to: new.kind.label(),
            });
        }

        let field = new.kind.field();
        let current = student.scores.get(field);
        let net = new.kind.nominal_delta() - old.applied_delta;
        let settlement = self.policy.settle(field, current, net);

        let without_old = current - old.applied_delta;
        new.applied_delta = settlement.value - without_old;

        Ok(Replaced {
            student: with_score(student, field, settlement.value),
            event: new,
            warning: settlement.warning,
        })
    }

    /// Aggregates implied by the active events alone, starting from the initial values.
    pub fn recompute(&self, events: &[ScoredEvent]) -> ScoreCard {
        let initial = self.policy.initial_scores();

        ScoreField::ALL
            .into_iter()
            .fold(initial, |scores, field| {
                let total = events
                    .iter()
                    .filter(|event| event.record.kind.field() == field)
                    .fold(0i32, |sum, event| {
                        sum.saturating_add(event.record.kind.nominal_delta())
                    });
                let value = self.policy.settle(field, initial.get(field), total).value;
                scores.with(field, value)
            })
    }
}

fn with_score(student: &Student, field: ScoreField, value: i32) -> Student {
    let mut next = student.clone();
    next.scores = next.scores.with(field, value);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::domain::{EventKind, Revision, StudentId, StudentNumber};
    use chrono::NaiveDate;

    fn student(behavior: i32, distinguished: i32, attendance: i32) -> Student {
        Student {
            id: StudentId("stu-000001".to_string()),
            student_number: StudentNumber("1001".to_string()),
            full_name: "Dana Reyes".to_string(),
            grade: Some("7".to_string()),
            class_name: None,
            scores: ScoreCard {
                behavior,
                distinguished,
                attendance,
            },
            revision: Revision::INITIAL,
            withdrawn_on: None,
        }
    }

    fn record(kind: EventKind) -> EventRecord {
        EventRecord {
            student_id: StudentId("stu-000001".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 10, 6).expect("valid date"),
            kind,
            rationale: String::new(),
            evidence: None,
            applied_delta: 0,
        }
    }

    fn incident(points: u32) -> EventKind {
        EventKind::Incident {
            misconduct_code: "DISRUPTION".to_string(),
            degree: 2,
            points,
        }
    }

    fn action(points: u32) -> EventKind {
        EventKind::PositiveAction {
            action_code: "PEER_MENTORING".to_string(),
            points,
        }
    }

    fn absence(points: u32, has_excuse: bool) -> EventKind {
        EventKind::Absence { points, has_excuse }
    }

    #[test]
    fn apply_then_reverse_restores_value() {
        let ledger = ScoreLedger::default();
        let start = student(80, 3, 100);

        for points in 0..=80 {
            let applied = ledger.apply_new_event(&start, record(incident(points)));
            assert!(applied.warning.is_none());
            let reversed = ledger.reverse_event(&applied.student, &applied.event);
            assert_eq!(reversed.student.scores, start.scores, "points {points}");
            assert!(reversed.note.is_none());
        }
    }

    #[test]
    fn incident_sequence_matches_worked_example() {
        let ledger = ScoreLedger::default();
        let start = student(80, 0, 100);

        let a = ledger.apply_new_event(&start, record(incident(10)));
        assert_eq!(a.student.scores.behavior, 70);
        let b = ledger.apply_new_event(&a.student, record(incident(15)));
        assert_eq!(b.student.scores.behavior, 55);

        let after_delete = ledger.reverse_event(&b.student, &a.event);
        assert_eq!(after_delete.student.scores.behavior, 65);

        let edited = ledger
            .replace_event(&after_delete.student, &b.event, record(incident(5)))
            .expect("same variant");
        assert_eq!(edited.student.scores.behavior, 75);
        assert_eq!(edited.event.applied_delta, -5);
    }

    #[test]
    fn capped_positive_action_reverses_by_effective_delta() {
        let ledger = ScoreLedger::default();
        let start = student(80, 0, 100);

        let first = ledger.apply_new_event(&start, record(action(15)));
        assert_eq!(first.student.scores.distinguished, 15);

        let second = ledger.apply_new_event(&first.student, record(action(10)));
        assert_eq!(second.student.scores.distinguished, 20);
        assert_eq!(second.event.applied_delta, 5);
        assert!(second.warning.is_some());

        let reversed = ledger.reverse_event(&second.student, &second.event);
        assert_eq!(reversed.student.scores.distinguished, 15);
        assert_eq!(
            reversed.note,
            Some(LossyReversal::TruncatedOnApply {
                nominal: 10,
                applied: 5
            })
        );
    }

    #[test]
    fn positive_actions_never_touch_behavior() {
        let ledger = ScoreLedger::default();
        let start = student(42, 0, 100);
        let applied = ledger.apply_new_event(&start, record(action(10)));
        assert_eq!(applied.student.scores.behavior, 42);
        assert_eq!(applied.student.scores.attendance, 100);
    }

    #[test]
    fn excusal_restores_and_unexcusal_rededucts() {
        let ledger = ScoreLedger::default();
        let start = student(80, 0, 100);

        let absent = ledger.apply_new_event(&start, record(absence(6, false)));
        assert_eq!(absent.student.scores.attendance, 94);

        let excused = ledger
            .replace_event(&absent.student, &absent.event, record(absence(6, true)))
            .expect("same variant");
        assert_eq!(excused.student.scores.attendance, 100);
        assert_eq!(excused.event.applied_delta, 0);
        assert_eq!(excused.event.kind.points(), 6);

        let unexcused = ledger
            .replace_event(&excused.student, &excused.event, record(absence(6, false)))
            .expect("same variant");
        assert_eq!(unexcused.student.scores.attendance, 94);
        assert_eq!(unexcused.event.applied_delta, -6);
    }

    #[test]
    fn replace_uses_single_combined_step() {
        let ledger = ScoreLedger::default();
        let mut old = record(incident(10));
        old.applied_delta = -10;
        let current = student(98, 0, 100);

        // Reverse-then-apply would go 98 -> 100 (clamped) -> 97. The combined
        // net delta of +7 settles once at the ceiling instead.
        let replaced = ledger
            .replace_event(&current, &old, record(incident(3)))
            .expect("same variant");
        assert_eq!(replaced.student.scores.behavior, 100);
        assert_eq!(replaced.event.applied_delta, -8);
        assert!(replaced.warning.is_some());

        let unclamped = ledger
            .replace_event(&student(60, 0, 100), &old, record(incident(3)))
            .expect("same variant");
        assert_eq!(unclamped.student.scores.behavior, 67);
        assert_eq!(unclamped.event.applied_delta, -3);
    }

    #[test]
    fn replace_rejects_variant_change() {
        let ledger = ScoreLedger::default();
        let mut old = record(incident(4));
        old.applied_delta = -4;
        let result = ledger.replace_event(&student(76, 0, 100), &old, record(absence(4, false)));
        assert!(matches!(
            result,
            Err(EventValidationError::VariantChanged { .. })
        ));
    }

    #[test]
    fn reversal_that_clamps_is_flagged() {
        let ledger = ScoreLedger::default();
        let mut event = record(absence(10, false));
        event.applied_delta = -10;
        let reversed = ledger.reverse_event(&student(80, 0, 95), &event);
        assert_eq!(reversed.student.scores.attendance, 100);
        assert!(matches!(
            reversed.note,
            Some(LossyReversal::ClampedOnReverse { .. })
        ));
    }

    #[test]
    fn recompute_uses_invariant_sums() {
        let ledger = ScoreLedger::default();
        let scored = |id: &str, kind: EventKind| ScoredEvent {
            id: crate::ledger::domain::EventId(id.to_string()),
            record: record(kind),
        };
        let events = vec![
            scored("e1", incident(10)),
            scored("e2", incident(15)),
            scored("e3", action(15)),
            scored("e4", action(10)),
            scored("e5", absence(5, false)),
            scored("e6", absence(7, true)),
        ];

        let scores = ledger.recompute(&events);
        assert_eq!(
            scores,
            ScoreCard {
                behavior: 55,
                distinguished: 20,
                attendance: 95,
            }
        );
    }

    #[test]
    fn sequences_without_clamping_match_recompute() {
        let ledger = ScoreLedger::default();
        let mut current = student(80, 0, 100);
        let mut active: Vec<ScoredEvent> = Vec::new();
        let kinds = [
            incident(3),
            action(4),
            absence(2, false),
            incident(7),
            action(6),
            absence(9, true),
            incident(1),
        ];

        for (index, kind) in kinds.into_iter().enumerate() {
            let applied = ledger.apply_new_event(&current, record(kind));
            current = applied.student;
            active.push(ScoredEvent {
                id: crate::ledger::domain::EventId(format!("e{index}")),
                record: applied.event,
            });
            assert_eq!(current.scores, ledger.recompute(&active));
        }

        let edited = ledger
            .replace_event(&current, &active[3].record, record(incident(2)))
            .expect("same variant");
        current = edited.student;
        active[3].record = edited.event;
        assert_eq!(current.scores, ledger.recompute(&active));

        let removed = active.remove(1);
        current = ledger.reverse_event(&current, &removed.record).student;
        assert_eq!(current.scores, ledger.recompute(&active));
    }
}
