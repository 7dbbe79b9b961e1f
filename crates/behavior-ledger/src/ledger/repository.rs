use super::domain::{
    EventId, EventRecord, NewStudent, Revision, ScoreCard, ScoredEvent, Student,
    StudentId, StudentNumber, StudentPatch,
};

/// Filter accepted by [`StudentStore::list_students`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilter {
    pub student_number: Option<StudentNumber>,
    pub include_withdrawn: bool,
}

impl StudentFilter {
    pub fn active() -> Self {
        Self::default()
    }
}

/// Filter accepted by [`EventStore::list_events`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub student_id: Option<StudentId>,
}

impl EventFilter {
    pub fn for_student(student_id: StudentId) -> Self {
        Self {
            student_id: Some(student_id),
        }
    }
}

/// Student persistence. Aggregates can only change through `write_scores`.
pub trait StudentStore: Send + Sync {
    fn get_student(&self, id: &StudentId) -> Result<Option<Student>, StoreError>;
    fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, StoreError>;
    /// Persist a roster entry with the given starting aggregates; the store assigns the id.
    fn create_student(&self, student: NewStudent, scores: ScoreCard)
        -> Result<Student, StoreError>;
    /// Apply roster changes. Every successful update bumps the revision, so an aggregate
    /// write planned against the old record (for example before a withdrawal) goes stale.
    fn update_student(&self, id: &StudentId, patch: StudentPatch) -> Result<Student, StoreError>;
    /// Compare-and-swap the aggregates. Fails with `StaleRevision` when `expected` is not
    /// the stored revision and returns the new revision otherwise.
    fn write_scores(
        &self,
        id: &StudentId,
        expected: Revision,
        scores: ScoreCard,
    ) -> Result<Revision, StoreError>;
}

/// Scored event persistence.
pub trait EventStore: Send + Sync {
    fn get_event(&self, id: &EventId) -> Result<Option<ScoredEvent>, StoreError>;
    fn list_events(&self, filter: &EventFilter) -> Result<Vec<ScoredEvent>, StoreError>;
    fn create_event(&self, record: EventRecord) -> Result<ScoredEvent, StoreError>;
    /// Overwrite an event only if the stored record still equals `expected`,
    /// failing with `Conflict` otherwise.
    fn update_event(&self, event: &ScoredEvent, expected: &EventRecord)
        -> Result<(), StoreError>;
    fn delete_event(&self, id: &EventId) -> Result<ScoredEvent, StoreError>;
    /// Re-insert a deleted event under its original id. Fails with `Conflict` if the id
    /// is taken.
    fn restore_event(&self, event: &ScoredEvent) -> Result<(), StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale revision: expected {expected:?}, stored {actual:?}")]
    StaleRevision { expected: Revision, actual: Revision },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
