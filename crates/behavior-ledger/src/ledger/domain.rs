use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Store-assigned identifier for a student record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Human-assigned business key printed on rosters and forms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentNumber(pub String);

/// Store-assigned identifier for a scored event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

macro_rules! display_inner {
    ($($name:ident),+) => {
        $(impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_inner!(StudentId, StudentNumber, EventId);

/// Optimistic concurrency token bumped on every aggregate write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    pub const INITIAL: Revision = Revision(1);

    pub const fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

/// The three running aggregates kept on every student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreField {
    Behavior,
    Distinguished,
    Attendance,
}

impl ScoreField {
    pub const ALL: [ScoreField; 3] = [
        ScoreField::Behavior,
        ScoreField::Distinguished,
        ScoreField::Attendance,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ScoreField::Behavior => "behavior_score",
            ScoreField::Distinguished => "distinguished_score",
            ScoreField::Attendance => "attendance_score",
        }
    }
}

/// Snapshot of a student's aggregate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub behavior: i32,
    pub distinguished: i32,
    pub attendance: i32,
}

impl ScoreCard {
    pub const fn get(&self, field: ScoreField) -> i32 {
        match field {
            ScoreField::Behavior => self.behavior,
            ScoreField::Distinguished => self.distinguished,
            ScoreField::Attendance => self.attendance,
        }
    }

    pub fn with(mut self, field: ScoreField, value: i32) -> Self {
        match field {
            ScoreField::Behavior => self.behavior = value,
            ScoreField::Distinguished => self.distinguished = value,
            ScoreField::Attendance => self.attendance = value,
        }
        self
    }
}

/// Persisted student record. Aggregates are only ever written by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub student_number: StudentNumber,
    pub full_name: String,
    pub grade: Option<String>,
    pub class_name: Option<String>,
    pub scores: ScoreCard,
    pub revision: Revision,
    pub withdrawn_on: Option<NaiveDate>,
}

impl Student {
    pub fn is_active(&self) -> bool {
        self.withdrawn_on.is_none()
    }

    /// Display total shown on report cards. Not re-clamped, so it ranges up to the
    /// behavior ceiling plus the distinguished cap.
    pub fn combined_total(&self) -> i32 {
        self.scores.behavior + self.scores.distinguished
    }
}

/// Roster entry used when registering a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub student_number: StudentNumber,
    pub full_name: String,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
}

/// Roster fields that may change outside the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentPatch {
    pub full_name: Option<String>,
    pub grade: Option<String>,
    pub class_name: Option<String>,
    pub withdrawn_on: Option<NaiveDate>,
}

/// Point-bearing payload of an event, one variant per event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Incident {
        misconduct_code: String,
        degree: u8,
        points: u32,
    },
    PositiveAction {
        action_code: String,
        points: u32,
    },
    Absence {
        points: u32,
        has_excuse: bool,
    },
}

impl EventKind {
    /// Aggregate this variant contributes to.
    pub const fn field(&self) -> ScoreField {
        match self {
            EventKind::Incident { .. } => ScoreField::Behavior,
            EventKind::PositiveAction { .. } => ScoreField::Distinguished,
            EventKind::Absence { .. } => ScoreField::Attendance,
        }
    }

    /// Signed delta before any clamping.
    pub fn nominal_delta(&self) -> i32 {
        match self {
            EventKind::Incident { points, .. } => -signed(*points),
            EventKind::PositiveAction { points, .. } => signed(*points),
            EventKind::Absence {
                has_excuse: true, ..
            } => 0,
            EventKind::Absence { points, .. } => -signed(*points),
        }
    }

    pub const fn points(&self) -> u32 {
        match self {
            EventKind::Incident { points, .. }
            | EventKind::PositiveAction { points, .. }
            | EventKind::Absence { points, .. } => *points,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            EventKind::Incident { .. } => "incident",
            EventKind::PositiveAction { .. } => "positive_action",
            EventKind::Absence { .. } => "absence",
        }
    }

    pub fn same_variant(&self, other: &EventKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

fn signed(points: u32) -> i32 {
    i32::try_from(points).unwrap_or(i32::MAX)
}

/// Event payload as written to the store. `applied_delta` is the effective delta the
/// ledger actually moved the aggregate by, and is what reversal undoes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub student_id: StudentId,
    pub date: NaiveDate,
    pub kind: EventKind,
    pub rationale: String,
    #[serde(default)]
    pub evidence: Option<String>,
    pub applied_delta: i32,
}

/// Persisted event with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub id: EventId,
    pub record: EventRecord,
}

/// How a caller names the student an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum StudentRef {
    Id(StudentId),
    Number(StudentNumber),
}

impl std::fmt::Display for StudentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StudentRef::Id(id) => write!(f, "student id {id}"),
            StudentRef::Number(number) => write!(f, "student number {number}"),
        }
    }
}

/// Point-bearing fields as entered on a form; omitted values come from the catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DraftKind {
    Incident {
        misconduct_code: String,
        #[serde(default)]
        degree: Option<u8>,
        #[serde(default)]
        points: Option<u32>,
    },
    PositiveAction {
        action_code: String,
        #[serde(default)]
        points: Option<u32>,
    },
    Absence {
        points: u32,
        #[serde(default)]
        has_excuse: bool,
    },
}

/// New event as submitted by a registration flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub student: StudentRef,
    pub date: NaiveDate,
    pub kind: DraftKind,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub evidence: Option<String>,
}

/// Replacement data for an existing event. The student cannot change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRevision {
    pub date: NaiveDate,
    pub kind: DraftKind,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub evidence: Option<String>,
}
