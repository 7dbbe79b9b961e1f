use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use axum::Router;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::LedgerConfig;
use crate::ledger::audit::{AuditEntry, AuditError, AuditSink};
use crate::ledger::domain::{
    DraftKind, EventDraft, EventId, EventRecord, NewStudent, Revision, ScoreCard, ScoredEvent,
    Student, StudentId, StudentNumber, StudentPatch, StudentRef,
};
use crate::ledger::memory::InMemoryLedgerStore;
use crate::ledger::repository::{
    EventFilter, EventStore, StoreError, StudentFilter, StudentStore,
};
use crate::ledger::{ledger_router, LedgerService};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn config(max_write_attempts: u32) -> LedgerConfig {
    LedgerConfig {
        max_write_attempts,
        batch_parallelism: 2,
    }
}

pub(super) fn new_student(number: &str, name: &str) -> NewStudent {
    NewStudent {
        student_number: StudentNumber(number.to_string()),
        full_name: name.to_string(),
        grade: Some("7".to_string()),
        class_name: Some("7B".to_string()),
    }
}

pub(super) fn incident(student: &Student, points: u32) -> EventDraft {
    EventDraft {
        student: StudentRef::Id(student.id.clone()),
        date: date(2025, 9, 8),
        kind: DraftKind::Incident {
            misconduct_code: "DISRUPTION".to_string(),
            degree: Some(2),
            points: Some(points),
        },
        rationale: "talking during the lesson".to_string(),
        evidence: None,
    }
}

pub(super) fn positive_action(student: &Student, points: u32) -> EventDraft {
    EventDraft {
        student: StudentRef::Id(student.id.clone()),
        date: date(2025, 9, 12),
        kind: DraftKind::PositiveAction {
            action_code: "COMPETITION_AWARD".to_string(),
            points: Some(points),
        },
        rationale: "regional science fair".to_string(),
        evidence: Some("certificate.pdf".to_string()),
    }
}

pub(super) fn absence(student: &Student, points: u32) -> EventDraft {
    EventDraft {
        student: StudentRef::Id(student.id.clone()),
        date: date(2025, 9, 15),
        kind: DraftKind::Absence {
            points,
            has_excuse: false,
        },
        rationale: "absent without note".to_string(),
        evidence: None,
    }
}

pub(super) type MemoryService = LedgerService<InMemoryLedgerStore, RecordingAudit>;

pub(super) fn build_service() -> (MemoryService, Arc<InMemoryLedgerStore>, Arc<RecordingAudit>) {
    let store = Arc::new(InMemoryLedgerStore::default());
    let audit = Arc::new(RecordingAudit::default());
    let service = LedgerService::new(store.clone(), audit.clone(), LedgerConfig::default());
    (service, store, audit)
}

pub(super) fn build_faulty_service(
    store: Arc<FaultyStore>,
    max_write_attempts: u32,
) -> (LedgerService<FaultyStore, RecordingAudit>, Arc<RecordingAudit>) {
    let audit = Arc::new(RecordingAudit::default());
    let service = LedgerService::new(store, audit.clone(), config(max_write_attempts));
    (service, audit)
}

pub(super) fn router_with_service<R, A>(service: LedgerService<R, A>) -> Router
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    ledger_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn stored_events(store: &InMemoryLedgerStore, student_id: &StudentId) -> Vec<ScoredEvent> {
    store
        .list_events(&EventFilter::for_student(student_id.clone()))
        .expect("events listed")
}

#[derive(Default)]
pub(super) struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub(super) fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().expect("audit mutex poisoned").push(entry);
        Ok(())
    }
}

/// Sink whose transport is always down; ledger changes must still commit.
pub(super) struct OfflineAudit;

impl AuditSink for OfflineAudit {
    fn record(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        Err(AuditError::Transport("audit queue offline".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ScoresFault {
    Healthy,
    AlwaysStale,
    Unavailable,
}

type Interleaving = Box<dyn FnOnce() + Send>;

/// In-memory store with injectable failures around the aggregate write.
///
/// Queued interleavings run, one per call, at the start of `write_scores`, standing in
/// for a competing writer that lands between the service's read and its write.
pub(super) struct FaultyStore {
    pub(super) inner: Arc<InMemoryLedgerStore>,
    scores_fault: ScoresFault,
    fail_event_deletes: bool,
    interleavings: Mutex<VecDeque<Interleaving>>,
    score_writes: AtomicU32,
}

impl FaultyStore {
    pub(super) fn new(inner: Arc<InMemoryLedgerStore>, scores_fault: ScoresFault) -> Self {
        Self {
            inner,
            scores_fault,
            fail_event_deletes: false,
            interleavings: Mutex::new(VecDeque::new()),
            score_writes: AtomicU32::new(0),
        }
    }

    pub(super) fn failing_event_deletes(mut self) -> Self {
        self.fail_event_deletes = true;
        self
    }

    pub(super) fn interleave(&self, competing: impl FnOnce() + Send + 'static) {
        self.interleavings
            .lock()
            .expect("interleaving mutex poisoned")
            .push_back(Box::new(competing));
    }

    pub(super) fn score_writes(&self) -> u32 {
        self.score_writes.load(Ordering::SeqCst)
    }
}

impl StudentStore for FaultyStore {
    fn get_student(&self, id: &StudentId) -> Result<Option<Student>, StoreError> {
        self.inner.get_student(id)
    }

    fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, StoreError> {
        self.inner.list_students(filter)
    }

    fn create_student(
        &self,
        student: NewStudent,
        scores: ScoreCard,
    ) -> Result<Student, StoreError> {
        self.inner.create_student(student, scores)
    }

    fn update_student(&self, id: &StudentId, patch: StudentPatch) -> Result<Student, StoreError> {
        self.inner.update_student(id, patch)
    }

    fn write_scores(
        &self,
        id: &StudentId,
        expected: Revision,
        scores: ScoreCard,
    ) -> Result<Revision, StoreError> {
        self.score_writes.fetch_add(1, Ordering::SeqCst);
        let competing = self
            .interleavings
            .lock()
            .expect("interleaving mutex poisoned")
            .pop_front();
        if let Some(competing) = competing {
            competing();
        }

        match self.scores_fault {
            ScoresFault::Healthy => self.inner.write_scores(id, expected, scores),
            ScoresFault::AlwaysStale => Err(StoreError::StaleRevision {
                expected,
                actual: expected.next(),
            }),
            ScoresFault::Unavailable => {
                Err(StoreError::Unavailable("primary database timeout".to_string()))
            }
        }
    }
}

impl EventStore for FaultyStore {
    fn get_event(&self, id: &EventId) -> Result<Option<ScoredEvent>, StoreError> {
        self.inner.get_event(id)
    }

    fn list_events(&self, filter: &EventFilter) -> Result<Vec<ScoredEvent>, StoreError> {
        self.inner.list_events(filter)
    }

    fn create_event(&self, record: EventRecord) -> Result<ScoredEvent, StoreError> {
        self.inner.create_event(record)
    }

    fn update_event(&self, event: &ScoredEvent, expected: &EventRecord) -> Result<(), StoreError> {
        self.inner.update_event(event, expected)
    }

    fn delete_event(&self, id: &EventId) -> Result<ScoredEvent, StoreError> {
        if self.fail_event_deletes {
            return Err(StoreError::Unavailable("event table locked".to_string()));
        }
        self.inner.delete_event(id)
    }

    fn restore_event(&self, event: &ScoredEvent) -> Result<(), StoreError> {
        self.inner.restore_event(event)
    }
}
