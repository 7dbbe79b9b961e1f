use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    EventId, EventRecord, NewStudent, Revision, ScoreCard, ScoredEvent, Student, StudentId,
    StudentPatch,
};
use super::repository::{
    EventFilter, EventStore, StoreError, StudentFilter, StudentStore,
};

/// Process-local store used by the API binary and tests.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    students: BTreeMap<StudentId, Student>,
    events: BTreeMap<EventId, ScoredEvent>,
    student_sequence: u64,
    event_sequence: u64,
}

impl InMemoryLedgerStore {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))
    }
}

impl StudentStore for InMemoryLedgerStore {
    fn get_student(&self, id: &StudentId) -> Result<Option<Student>, StoreError> {
        Ok(self.lock()?.students.get(id).cloned())
    }

    fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .students
            .values()
            .filter(|student| filter.include_withdrawn || student.is_active())
            .filter(|student| {
                filter
                    .student_number
                    .as_ref()
                    .map_or(true, |number| &student.student_number == number)
            })
            .cloned()
            .collect())
    }

    fn create_student(
        &self,
        student: NewStudent,
        scores: ScoreCard,
    ) -> Result<Student, StoreError> {
        let mut state = self.lock()?;
        if state
            .students
            .values()
            .any(|existing| existing.student_number == student.student_number)
        {
            return Err(StoreError::Conflict);
        }

        state.student_sequence += 1;
        let id = StudentId(format!("stu-{:06}", state.student_sequence));
        let record = Student {
            id: id.clone(),
            student_number: student.student_number,
            full_name: student.full_name,
            grade: student.grade,
            class_name: student.class_name,
            scores,
            revision: Revision::INITIAL,
            withdrawn_on: None,
        };
        state.students.insert(id, record.clone());
        Ok(record)
    }

    fn update_student(&self, id: &StudentId, patch: StudentPatch) -> Result<Student, StoreError> {
        let mut state = self.lock()?;
        let student = state.students.get_mut(id).ok_or(StoreError::NotFound)?;

        if let Some(full_name) = patch.full_name {
            student.full_name = full_name;
        }
        if let Some(grade) = patch.grade {
            student.grade = Some(grade);
        }
        if let Some(class_name) = patch.class_name {
            student.class_name = Some(class_name);
        }
        if let Some(withdrawn_on) = patch.withdrawn_on {
            student.withdrawn_on = Some(withdrawn_on);
        }
        student.revision = student.revision.next();

        Ok(student.clone())
    }

    fn write_scores(
        &self,
        id: &StudentId,
        expected: Revision,
        scores: ScoreCard,
    ) -> Result<Revision, StoreError> {
        let mut state = self.lock()?;
        let student = state.students.get_mut(id).ok_or(StoreError::NotFound)?;

        if student.revision != expected {
            return Err(StoreError::StaleRevision {
                expected,
                actual: student.revision,
            });
        }

        student.scores = scores;
        student.revision = student.revision.next();
        Ok(student.revision)
    }
}

impl EventStore for InMemoryLedgerStore {
    fn get_event(&self, id: &EventId) -> Result<Option<ScoredEvent>, StoreError> {
        Ok(self.lock()?.events.get(id).cloned())
    }

    fn list_events(&self, filter: &EventFilter) -> Result<Vec<ScoredEvent>, StoreError> {
        let state = self.lock()?;
        let mut events: Vec<ScoredEvent> = state
            .events
            .values()
            .filter(|event| {
                filter
                    .student_id
                    .as_ref()
                    .map_or(true, |id| &event.record.student_id == id)
            })
            .cloned()
            .collect();

        events.sort_by(|a, b| (a.record.date, &a.id).cmp(&(b.record.date, &b.id)));
        Ok(events)
    }

    fn create_event(&self, record: EventRecord) -> Result<ScoredEvent, StoreError> {
        let mut state = self.lock()?;
        state.event_sequence += 1;
        let id = EventId(format!("evt-{:06}", state.event_sequence));
        let event = ScoredEvent {
            id: id.clone(),
            record,
        };
        state.events.insert(id, event.clone());
        Ok(event)
    }

    fn update_event(
        &self,
        event: &ScoredEvent,
        expected: &EventRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let existing = state
            .events
            .get_mut(&event.id)
            .ok_or(StoreError::NotFound)?;

        if &existing.record != expected {
            return Err(StoreError::Conflict);
        }

        *existing = event.clone();
        Ok(())
    }

    fn delete_event(&self, id: &EventId) -> Result<ScoredEvent, StoreError> {
        self.lock()?.events.remove(id).ok_or(StoreError::NotFound)
    }

    fn restore_event(&self, event: &ScoredEvent) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.events.contains_key(&event.id) {
            return Err(StoreError::Conflict);
        }
        state.events.insert(event.id.clone(), event.clone());
        Ok(())
    }
}
