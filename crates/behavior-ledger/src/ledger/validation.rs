use chrono::NaiveDate;

use super::catalog::{MisconductCatalog, ReferenceCatalogs};
use super::domain::{
    DraftKind, EventId, EventKind, EventRecord, NewStudent, StudentId, StudentNumber,
};
use super::policy::ScorePolicy;

const MIN_DEGREE: u8 = 1;
const MAX_DEGREE: u8 = 5;

/// Rejections raised before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventValidationError {
    #[error("incident degree {0} is outside 1..=5")]
    DegreeOutOfRange(u8),
    #[error("misconduct code '{0}' is not in the catalog and no points were given")]
    UnknownMisconduct(String),
    #[error("positive action code '{0}' is not in the catalog and no points were given")]
    UnknownPositiveAction(String),
    #[error("{kind} points {points} exceed the per-event ceiling of {ceiling}")]
    PointsAboveCeiling {
        kind: &'static str,
        points: u32,
        ceiling: u32,
    },
    #[error("an event cannot change from {from} to {to}; delete and record a new one")]
    VariantChanged {
        from: &'static str,
        to: &'static str,
    },
    #[error("event {0} is not an absence")]
    NotAnAbsence(EventId),
    #[error("student number must not be blank")]
    BlankStudentNumber,
    #[error("student name must not be blank")]
    BlankStudentName,
}

/// Turn form input into the point-bearing payload, filling defaults from the catalogs.
pub fn resolve_kind(
    draft: &DraftKind,
    catalogs: &ReferenceCatalogs,
    policy: &ScorePolicy,
) -> Result<EventKind, EventValidationError> {
    let kind = match draft {
        DraftKind::Incident {
            misconduct_code,
            degree,
            points,
        } => {
            let entry = catalogs.misconduct.get(misconduct_code);
            let degree = match (degree, entry) {
                (Some(degree), _) => *degree,
                (None, Some(entry)) => entry.degree,
                (None, None) => {
                    return Err(EventValidationError::UnknownMisconduct(
                        misconduct_code.clone(),
                    ))
                }
            };
            if !(MIN_DEGREE..=MAX_DEGREE).contains(&degree) {
                return Err(EventValidationError::DegreeOutOfRange(degree));
            }

            let points = match (points, entry) {
                (Some(points), _) => *points,
                (None, Some(entry)) if entry.degree == degree => entry.points,
                (None, _) => MisconductCatalog::points_for_degree(degree)
                    .ok_or(EventValidationError::DegreeOutOfRange(degree))?,
            };

            EventKind::Incident {
                misconduct_code: misconduct_code.clone(),
                degree,
                points,
            }
        }
        DraftKind::PositiveAction {
            action_code,
            points,
        } => {
            let points = match (points, catalogs.positive_actions.get(action_code)) {
                (Some(points), _) => *points,
                (None, Some(entry)) => entry.points,
                (None, None) => {
                    return Err(EventValidationError::UnknownPositiveAction(
                        action_code.clone(),
                    ))
                }
            };

            EventKind::PositiveAction {
                action_code: action_code.clone(),
                points,
            }
        }
        DraftKind::Absence { points, has_excuse } => EventKind::Absence {
            points: *points,
            has_excuse: *has_excuse,
        },
    };

    check_ceiling(&kind, policy)?;
    Ok(kind)
}

fn check_ceiling(kind: &EventKind, policy: &ScorePolicy) -> Result<(), EventValidationError> {
    let ceiling = match kind {
        EventKind::Incident { .. } => policy.max_incident_points,
        EventKind::PositiveAction { .. } => policy.max_positive_points,
        EventKind::Absence { .. } => policy.max_absence_points,
    };

    if kind.points() > ceiling {
        return Err(EventValidationError::PointsAboveCeiling {
            kind: kind.label(),
            points: kind.points(),
            ceiling,
        });
    }

    Ok(())
}

/// Build the record the ledger will settle. `applied_delta` is filled by the ledger.
pub fn pending_record(
    student_id: StudentId,
    date: NaiveDate,
    kind: EventKind,
    rationale: String,
    evidence: Option<String>,
) -> EventRecord {
    EventRecord {
        student_id,
        date,
        kind,
        rationale: rationale.trim().to_string(),
        evidence: evidence.filter(|value| !value.trim().is_empty()),
        applied_delta: 0,
    }
}

pub fn normalize_new_student(student: NewStudent) -> Result<NewStudent, EventValidationError> {
    let number = student.student_number.0.trim().to_string();
    if number.is_empty() {
        return Err(EventValidationError::BlankStudentNumber);
    }
    let full_name = student.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(EventValidationError::BlankStudentName);
    }

    let optional = |value: Option<String>| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    Ok(NewStudent {
        student_number: StudentNumber(number),
        full_name,
        grade: optional(student.grade),
        class_name: optional(student.class_name),
    })
}
