//! Drift detection between stored aggregates and the active event history.

use serde::Serialize;

use super::domain::{ScoreCard, ScoreField, Student, StudentId};

/// Difference on one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDrift {
    pub field: ScoreField,
    pub stored: i32,
    pub expected: i32,
    pub difference: i32,
}

/// Stored aggregates compared against a from-scratch recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub student_id: StudentId,
    pub stored: ScoreCard,
    pub expected: ScoreCard,
    pub active_events: usize,
    pub drifts: Vec<FieldDrift>,
    pub repaired: bool,
}

impl DriftReport {
    pub fn compare(student: &Student, expected: ScoreCard, active_events: usize) -> Self {
        let drifts = ScoreField::ALL
            .into_iter()
            .filter_map(|field| {
                let stored = student.scores.get(field);
                let expected = expected.get(field);
                (stored != expected).then_some(FieldDrift {
                    field,
                    stored,
                    expected,
                    difference: stored - expected,
                })
            })
            .collect();

        Self {
            student_id: student.id.clone(),
            stored: student.scores,
            expected,
            active_events,
            drifts,
            repaired: false,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }

    pub(crate) fn mark_repaired(mut self) -> Self {
        self.repaired = true;
        self
    }
}
