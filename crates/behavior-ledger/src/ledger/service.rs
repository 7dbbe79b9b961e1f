use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::LedgerConfig;

use super::audit::{AuditEntry, AuditSink, LedgerOperation};
use super::catalog::ReferenceCatalogs;
use super::domain::{
    EventDraft, EventId, EventKind, EventRecord, EventRevision, NewStudent, ScoreField,
    ScoredEvent, Student, StudentId, StudentNumber, StudentPatch, StudentRef,
};
use super::engine::{LossyReversal, ScoreLedger};
use super::policy::{ClampedWarning, ScorePolicy};
use super::reconcile::DriftReport;
use super::repository::{EventFilter, EventStore, StoreError, StudentFilter, StudentStore};
use super::validation::{normalize_new_student, pending_record, resolve_kind, EventValidationError};
use super::views::{self, ScoreCardView, StandingEntry, StudentView};

/// Read-modify-write wrapper around the ledger.
///
/// Every operation reads the student immediately before writing, writes the event first and
/// the aggregate second, and guards the aggregate write with the student's revision. A stale
/// revision triggers a fresh read and a full recomputation, up to
/// [`LedgerConfig::max_write_attempts`] attempts.
pub struct LedgerService<R, A> {
    store: Arc<R>,
    audit: Arc<A>,
    ledger: Arc<ScoreLedger>,
    catalogs: Arc<ReferenceCatalogs>,
    config: LedgerConfig,
}

/// Committed outcome of one ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReceipt {
    pub operation: LedgerOperation,
    pub student: Student,
    /// The event as persisted, or as it was before removal.
    pub event: ScoredEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<ClampedWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lossy_reversal: Option<LossyReversal>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reversed: Vec<LedgerReceipt>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub event_id: EventId,
    pub error: String,
}

/// One attempt's view of what should be written.
struct Plan {
    student: Student,
    event: EventRecord,
    field: ScoreField,
    warning: Option<ClampedWarning>,
    note: Option<LossyReversal>,
}

/// Undo step for an event write whose aggregate write never landed.
enum Rollback {
    Remove(EventId),
    Restore(ScoredEvent),
    Recreate(ScoredEvent),
}

impl<R, A> LedgerService<R, A>
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    pub fn new(store: Arc<R>, audit: Arc<A>, config: LedgerConfig) -> Self {
        Self::with_reference_data(
            store,
            audit,
            config,
            ScorePolicy::standard(),
            ReferenceCatalogs::standard(),
        )
    }

    pub fn with_reference_data(
        store: Arc<R>,
        audit: Arc<A>,
        config: LedgerConfig,
        policy: ScorePolicy,
        catalogs: ReferenceCatalogs,
    ) -> Self {
        Self {
            store,
            audit,
            ledger: Arc::new(ScoreLedger::new(policy)),
            catalogs: Arc::new(catalogs),
            config,
        }
    }

    /// Register a roster entry with the initial aggregates.
    pub fn register_student(&self, student: NewStudent) -> Result<Student, LedgerServiceError> {
        let student = normalize_new_student(student)?;
        let number = student.student_number.clone();
        let created = self
            .store
            .create_student(student, self.ledger.policy().initial_scores())
            .map_err(|error| match error {
                StoreError::Conflict => LedgerServiceError::DuplicateStudent(number),
                other => LedgerServiceError::Store(other),
            })?;

        info!(student_id = %created.id, student_number = %created.student_number, "student registered");
        Ok(created)
    }

    /// Soft delete. The student's events stay resolvable but no further ledger operation
    /// is accepted for them.
    pub fn withdraw_student(
        &self,
        student_id: &StudentId,
        withdrawn_on: NaiveDate,
    ) -> Result<Student, LedgerServiceError> {
        let student = self.student(student_id)?;
        if !student.is_active() {
            return Ok(student);
        }

        let patch = StudentPatch {
            withdrawn_on: Some(withdrawn_on),
            ..StudentPatch::default()
        };
        let updated = self.store.update_student(student_id, patch)?;
        info!(student_id = %student_id, %withdrawn_on, "student withdrawn");
        Ok(updated)
    }

    /// Fetch a student, withdrawn or not.
    pub fn student(&self, student_id: &StudentId) -> Result<Student, LedgerServiceError> {
        self.store
            .get_student(student_id)?
            .ok_or_else(|| LedgerServiceError::unresolved(student_id, UnresolvedReason::Missing))
    }

    pub fn events_for(&self, student_id: &StudentId) -> Result<Vec<ScoredEvent>, LedgerServiceError> {
        let student = self.student(student_id)?;
        Ok(self
            .store
            .list_events(&EventFilter::for_student(student.id))?)
    }

    pub fn event(&self, event_id: &EventId) -> Result<ScoredEvent, LedgerServiceError> {
        self.store
            .get_event(event_id)?
            .ok_or_else(|| LedgerServiceError::EventNotFound(event_id.clone()))
    }

    pub fn score_card(&self, student_id: &StudentId) -> Result<ScoreCardView, LedgerServiceError> {
        let student = self.student(student_id)?;
        let events = self
            .store
            .list_events(&EventFilter::for_student(student.id.clone()))?;
        Ok(ScoreCardView {
            student: StudentView::from(&student),
            events,
        })
    }

    /// Active students ranked by behavior score.
    pub fn standings(&self) -> Result<Vec<StandingEntry>, LedgerServiceError> {
        let students = self.store.list_students(&StudentFilter::active())?;
        Ok(views::standings(&students))
    }

    /// Resolve a reference to exactly one active student.
    pub fn resolve(&self, reference: &StudentRef) -> Result<Student, LedgerServiceError> {
        match reference {
            StudentRef::Id(id) => {
                let student = self.store.get_student(id)?.ok_or_else(|| {
                    LedgerServiceError::unresolved(reference, UnresolvedReason::Missing)
                })?;
                if student.is_active() {
                    Ok(student)
                } else {
                    Err(LedgerServiceError::unresolved(
                        reference,
                        UnresolvedReason::Withdrawn,
                    ))
                }
            }
            StudentRef::Number(number) => {
                let filter = StudentFilter {
                    student_number: Some(number.clone()),
                    include_withdrawn: true,
                };
                let matches = self.store.list_students(&filter)?;
                let any_withdrawn = matches.iter().any(|student| !student.is_active());
                let mut active: Vec<Student> =
                    matches.into_iter().filter(Student::is_active).collect();

                match active.len() {
                    1 => Ok(active.remove(0)),
                    0 if any_withdrawn => Err(LedgerServiceError::unresolved(
                        reference,
                        UnresolvedReason::Withdrawn,
                    )),
                    0 => Err(LedgerServiceError::unresolved(
                        reference,
                        UnresolvedReason::Missing,
                    )),
                    count => Err(LedgerServiceError::unresolved(
                        reference,
                        UnresolvedReason::Ambiguous(count),
                    )),
                }
            }
        }
    }

    /// Apply a new event to its student.
    pub fn record_event(&self, draft: EventDraft) -> Result<LedgerReceipt, LedgerServiceError> {
        let student = self.resolve(&draft.student)?;
        let kind = resolve_kind(&draft.kind, &self.catalogs, self.ledger.policy())?;
        let pending = pending_record(
            student.id.clone(),
            draft.date,
            kind,
            draft.rationale,
            draft.evidence,
        );

        let plan = self.plan_apply(&student, pending.clone());
        let created = self.store.create_event(plan.event.clone())?;
        let rollback = Rollback::Remove(created.id.clone());

        self.settle(
            LedgerOperation::Apply,
            student,
            plan,
            Some(created),
            rollback,
            |fresh| Ok(self.plan_apply(fresh, pending.clone())),
        )
    }

    /// Replace an event's data. The event keeps its student and variant.
    pub fn revise_event(
        &self,
        event_id: &EventId,
        revision: EventRevision,
    ) -> Result<LedgerReceipt, LedgerServiceError> {
        let existing = self.event(event_id)?;
        let kind = resolve_kind(&revision.kind, &self.catalogs, self.ledger.policy())?;
        let replacement = pending_record(
            existing.record.student_id.clone(),
            revision.date,
            kind,
            revision.rationale,
            revision.evidence,
        );
        self.replace(existing, replacement)
    }

    /// Mark an absence as excused; the points stay on the record.
    pub fn excuse_absence(&self, event_id: &EventId) -> Result<LedgerReceipt, LedgerServiceError> {
        self.set_excuse(event_id, true)
    }

    /// Withdraw an excuse, restoring the original deduction.
    pub fn unexcuse_absence(
        &self,
        event_id: &EventId,
    ) -> Result<LedgerReceipt, LedgerServiceError> {
        self.set_excuse(event_id, false)
    }

    fn set_excuse(
        &self,
        event_id: &EventId,
        has_excuse: bool,
    ) -> Result<LedgerReceipt, LedgerServiceError> {
        let existing = self.event(event_id)?;
        let EventKind::Absence { points, .. } = existing.record.kind else {
            return Err(EventValidationError::NotAnAbsence(event_id.clone()).into());
        };

        let replacement = EventRecord {
            kind: EventKind::Absence { points, has_excuse },
            applied_delta: 0,
            ..existing.record.clone()
        };
        self.replace(existing, replacement)
    }

    fn replace(
        &self,
        existing: ScoredEvent,
        replacement: EventRecord,
    ) -> Result<LedgerReceipt, LedgerServiceError> {
        let student = self.resolve(&StudentRef::Id(existing.record.student_id.clone()))?;
        let plan = self.plan_replace(&student, &existing.record, replacement.clone())?;

        let updated = ScoredEvent {
            id: existing.id.clone(),
            record: plan.event.clone(),
        };
        self.store
            .update_event(&updated, &existing.record)
            .map_err(|error| match error {
                StoreError::Conflict => LedgerServiceError::StaleEvent(existing.id.clone()),
                StoreError::NotFound => LedgerServiceError::EventNotFound(existing.id.clone()),
                other => LedgerServiceError::Store(other),
            })?;

        let original = existing.record.clone();
        self.settle(
            LedgerOperation::Replace,
            student,
            plan,
            Some(updated),
            Rollback::Restore(existing),
            |fresh| self.plan_replace(fresh, &original, replacement.clone()),
        )
    }

    /// Delete an event and reverse its stored effective delta.
    pub fn remove_event(&self, event_id: &EventId) -> Result<LedgerReceipt, LedgerServiceError> {
        let existing = self.event(event_id)?;
        let student = self.resolve(&StudentRef::Id(existing.record.student_id.clone()))?;

        // The delete hands back the record that was actually stored, so only one caller
        // ever reverses it.
        let removed = self
            .store
            .delete_event(event_id)
            .map_err(|error| match error {
                StoreError::NotFound => LedgerServiceError::EventNotFound(event_id.clone()),
                other => LedgerServiceError::Store(other),
            })?;

        let plan = self.plan_reverse(&student, &removed.record);
        let record = removed.record.clone();
        let mut receipt = self.settle(
            LedgerOperation::Reverse,
            student,
            plan,
            None,
            Rollback::Recreate(removed.clone()),
            |fresh| Ok(self.plan_reverse(fresh, &record)),
        )?;
        receipt.event = removed;
        Ok(receipt)
    }

    /// Reverse many events. Events of one student are handled in order on a single
    /// blocking task; different students run in parallel up to
    /// [`LedgerConfig::batch_parallelism`].
    pub async fn reverse_many(self: Arc<Self>, event_ids: Vec<EventId>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut groups: BTreeMap<StudentId, Vec<EventId>> = BTreeMap::new();

        for event_id in event_ids {
            match self.event(&event_id) {
                Ok(event) => groups
                    .entry(event.record.student_id)
                    .or_default()
                    .push(event_id),
                Err(error) => report.failures.push(BatchFailure {
                    event_id,
                    error: error.to_string(),
                }),
            }
        }

        let permits = Arc::new(Semaphore::new(self.config.batch_parallelism.max(1)));
        let mut tasks = JoinSet::new();

        for (student_id, group) in groups {
            let service = Arc::clone(&self);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let ids = group.clone();
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(error) => return worker_failures(ids, &error.to_string()),
                };

                let worker = tokio::task::spawn_blocking(move || {
                    group
                        .into_iter()
                        .map(|event_id| {
                            let outcome = service.remove_event(&event_id);
                            (event_id, outcome)
                        })
                        .collect::<Vec<_>>()
                });

                match worker.await {
                    Ok(outcomes) => outcomes,
                    Err(error) => {
                        warn!(student_id = %student_id, error = %error, "batch worker failed");
                        worker_failures(ids, &error.to_string())
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcomes) => {
                    for (event_id, outcome) in outcomes {
                        match outcome {
                            Ok(receipt) => report.reversed.push(receipt),
                            Err(error) => report.failures.push(BatchFailure {
                                event_id,
                                error: error.to_string(),
                            }),
                        }
                    }
                }
                Err(error) => warn!(error = %error, "batch group task aborted"),
            }
        }

        report.reversed.sort_by(|a, b| a.event.id.cmp(&b.event.id));
        report.failures.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        info!(
            reversed = report.reversed.len(),
            failed = report.failures.len(),
            "batch reversal finished"
        );
        report
    }

    /// Compare stored aggregates with a recomputation from the active events.
    pub fn reconcile(&self, student_id: &StudentId) -> Result<DriftReport, LedgerServiceError> {
        let student = self.student(student_id)?;
        self.drift_for(&student)
    }

    fn drift_for(&self, student: &Student) -> Result<DriftReport, LedgerServiceError> {
        let events = self
            .store
            .list_events(&EventFilter::for_student(student.id.clone()))?;
        let expected = self.ledger.recompute(&events);
        Ok(DriftReport::compare(student, expected, events.len()))
    }

    /// Overwrite drifting aggregates with the recomputed values.
    pub fn repair(&self, student_id: &StudentId) -> Result<DriftReport, LedgerServiceError> {
        let max_attempts = self.config.max_write_attempts.max(1);
        let mut attempt = 1;

        loop {
            let student = self.student(student_id)?;
            let report = self.drift_for(&student)?;
            if report.is_consistent() {
                return Ok(report);
            }

            match self
                .store
                .write_scores(&student.id, student.revision, report.expected)
            {
                Ok(_) => {
                    for drift in &report.drifts {
                        self.emit(AuditEntry {
                            operation: LedgerOperation::Repair,
                            student_id: student.id.clone(),
                            event_id: None,
                            field: drift.field,
                            before: drift.stored,
                            after: drift.expected,
                            attempts: attempt,
                            warning: None,
                            recorded_at: Utc::now(),
                        });
                    }
                    warn!(
                        student_id = %student.id,
                        fields = report.drifts.len(),
                        "aggregates repaired from event history"
                    );
                    return Ok(report.mark_repaired());
                }
                Err(StoreError::StaleRevision { .. }) if attempt < max_attempts => {
                    warn!(student_id = %student.id, attempt, "stale revision during repair; retrying");
                    attempt += 1;
                }
                Err(StoreError::StaleRevision { .. }) => {
                    return Err(LedgerServiceError::StaleAggregate {
                        student_id: student.id,
                        attempts: attempt,
                    })
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    fn plan_apply(&self, student: &Student, pending: EventRecord) -> Plan {
        let field = pending.kind.field();
        let applied = self.ledger.apply_new_event(student, pending);
        Plan {
            student: applied.student,
            event: applied.event,
            field,
            warning: applied.warning,
            note: None,
        }
    }

    fn plan_replace(
        &self,
        student: &Student,
        old: &EventRecord,
        new: EventRecord,
    ) -> Result<Plan, LedgerServiceError> {
        let field = new.kind.field();
        let replaced = self.ledger.replace_event(student, old, new)?;
        Ok(Plan {
            student: replaced.student,
            event: replaced.event,
            field,
            warning: replaced.warning,
            note: None,
        })
    }

    fn plan_reverse(&self, student: &Student, event: &EventRecord) -> Plan {
        let reversed = self.ledger.reverse_event(student, event);
        Plan {
            student: reversed.student,
            event: event.clone(),
            field: event.kind.field(),
            warning: reversed.warning,
            note: reversed.note,
        }
    }

    /// Land the aggregate write for an event write that already happened.
    ///
    /// `persisted` is the event currently stored for this operation (none for removals).
    /// On a stale revision the student is re-read, the operation re-planned, and the stored
    /// event conditionally rewritten to the new plan before the next attempt.
    ///
    /// If that rewrite finds the event changed or removed by another writer, the competing
    /// change was planned on top of this one, so the aggregate is still settled and the
    /// caller gets `StaleEvent` instead of a receipt.
    fn settle<F>(
        &self,
        operation: LedgerOperation,
        mut snapshot: Student,
        mut plan: Plan,
        mut persisted: Option<ScoredEvent>,
        rollback: Rollback,
        mut replan: F,
    ) -> Result<LedgerReceipt, LedgerServiceError>
    where
        F: FnMut(&Student) -> Result<Plan, LedgerServiceError>,
    {
        let max_attempts = self.config.max_write_attempts.max(1);
        let event_id = match (&persisted, &rollback) {
            (Some(event), _) => event.id.clone(),
            (None, Rollback::Recreate(event)) => event.id.clone(),
            (None, Rollback::Remove(id)) => id.clone(),
            (None, Rollback::Restore(event)) => event.id.clone(),
        };
        let mut superseded = false;
        let mut attempt = 1;

        loop {
            match self
                .store
                .write_scores(&snapshot.id, snapshot.revision, plan.student.scores)
            {
                Ok(revision) => {
                    let mut student = plan.student;
                    student.revision = revision;

                    if let Some(warning) = &plan.warning {
                        warn!(student_id = %student.id, event_id = %event_id, "{}", warning.message());
                    }
                    if let Some(note) = &plan.note {
                        warn!(student_id = %student.id, event_id = %event_id, "{}", note.message());
                    }
                    info!(
                        student_id = %student.id,
                        event_id = %event_id,
                        operation = operation.label(),
                        attempts = attempt,
                        "ledger change committed"
                    );

                    self.emit(AuditEntry {
                        operation,
                        student_id: student.id.clone(),
                        event_id: Some(event_id.clone()),
                        field: plan.field,
                        before: snapshot.scores.get(plan.field),
                        after: student.scores.get(plan.field),
                        attempts: attempt,
                        warning: plan.warning,
                        recorded_at: Utc::now(),
                    });

                    if superseded {
                        warn!(
                            student_id = %student.id,
                            event_id = %event_id,
                            "event was changed by another writer; aggregate settled, edit not kept"
                        );
                        return Err(LedgerServiceError::StaleEvent(event_id));
                    }

                    let event = persisted.unwrap_or(ScoredEvent {
                        id: event_id,
                        record: plan.event,
                    });
                    return Ok(LedgerReceipt {
                        operation,
                        student,
                        event,
                        warning: plan.warning,
                        lossy_reversal: plan.note,
                        attempts: attempt,
                    });
                }
                Err(StoreError::StaleRevision { expected, actual }) if attempt < max_attempts => {
                    warn!(
                        student_id = %snapshot.id,
                        event_id = %event_id,
                        attempt,
                        expected = expected.0,
                        actual = actual.0,
                        "stale aggregate revision; retrying with a fresh read"
                    );
                    attempt += 1;

                    snapshot = match self.store.get_student(&snapshot.id) {
                        Ok(Some(fresh)) => fresh,
                        Ok(None) => {
                            return Err(self.abandon(
                                &snapshot.id,
                                &event_id,
                                WriteStage::AggregateWrite,
                                StoreError::NotFound,
                            ))
                        }
                        Err(source) => {
                            return Err(self.abandon(
                                &snapshot.id,
                                &event_id,
                                WriteStage::AggregateWrite,
                                source,
                            ))
                        }
                    };

                    if !snapshot.is_active() {
                        return Err(self.withdrawn_mid_write(
                            &snapshot.id,
                            &event_id,
                            &rollback,
                            persisted.as_ref(),
                            superseded,
                        ));
                    }

                    plan = replan(&snapshot)?;

                    if superseded {
                        continue;
                    }
                    if let Some(current) = persisted.as_mut() {
                        let next = ScoredEvent {
                            id: current.id.clone(),
                            record: plan.event.clone(),
                        };
                        match self.store.update_event(&next, &current.record) {
                            Ok(()) => *current = next,
                            Err(StoreError::Conflict) | Err(StoreError::NotFound) => {
                                warn!(
                                    student_id = %snapshot.id,
                                    event_id = %event_id,
                                    "event changed underneath a pending ledger write"
                                );
                                superseded = true;
                            }
                            Err(source) => {
                                return Err(self.abandon(
                                    &snapshot.id,
                                    &event_id,
                                    WriteStage::EventWrite,
                                    source,
                                ));
                            }
                        }
                    }
                }
                Err(source @ StoreError::StaleRevision { .. }) if superseded => {
                    return Err(self.abandon(
                        &snapshot.id,
                        &event_id,
                        WriteStage::AggregateWrite,
                        source,
                    ));
                }
                Err(StoreError::StaleRevision { .. }) => {
                    return Err(self.compensate(
                        &snapshot.id,
                        &event_id,
                        &rollback,
                        persisted.as_ref(),
                        attempt,
                    ));
                }
                Err(source) => {
                    return Err(self.abandon(
                        &snapshot.id,
                        &event_id,
                        WriteStage::AggregateWrite,
                        source,
                    ));
                }
            }
        }
    }

    /// Put the event store back the way it was before this operation's event write.
    fn undo(&self, rollback: &Rollback, persisted: Option<&ScoredEvent>) -> Result<(), StoreError> {
        match rollback {
            Rollback::Remove(id) => self.store.delete_event(id).map(|_| ()),
            Rollback::Restore(original) => match persisted {
                Some(current) => self.store.update_event(original, &current.record),
                None => Ok(()),
            },
            Rollback::Recreate(removed) => self.store.restore_event(removed),
        }
    }

    /// Undo the event write after the attempt budget ran out.
    fn compensate(
        &self,
        student_id: &StudentId,
        event_id: &EventId,
        rollback: &Rollback,
        persisted: Option<&ScoredEvent>,
        attempts: u32,
    ) -> LedgerServiceError {
        match self.undo(rollback, persisted) {
            Ok(()) => {
                warn!(
                    student_id = %student_id,
                    event_id = %event_id,
                    attempts,
                    "aggregate write kept going stale; event write rolled back"
                );
                LedgerServiceError::StaleAggregate {
                    student_id: student_id.clone(),
                    attempts,
                }
            }
            Err(source) => self.abandon(student_id, event_id, WriteStage::Rollback, source),
        }
    }

    /// The student was withdrawn between the first read and the aggregate write.
    fn withdrawn_mid_write(
        &self,
        student_id: &StudentId,
        event_id: &EventId,
        rollback: &Rollback,
        persisted: Option<&ScoredEvent>,
        superseded: bool,
    ) -> LedgerServiceError {
        if superseded {
            return self.abandon(
                student_id,
                event_id,
                WriteStage::AggregateWrite,
                StoreError::Conflict,
            );
        }

        match self.undo(rollback, persisted) {
            Ok(()) => {
                warn!(
                    student_id = %student_id,
                    event_id = %event_id,
                    "student withdrawn during a ledger write; event write rolled back"
                );
                LedgerServiceError::unresolved(
                    StudentRef::Id(student_id.clone()),
                    UnresolvedReason::Withdrawn,
                )
            }
            Err(source) => self.abandon(student_id, event_id, WriteStage::Rollback, source),
        }
    }

    fn abandon(
        &self,
        student_id: &StudentId,
        event_id: &EventId,
        stage: WriteStage,
        source: StoreError,
    ) -> LedgerServiceError {
        let error = LedgerServiceError::PartialWrite {
            student_id: student_id.clone(),
            event_id: Some(event_id.clone()),
            stage,
            source,
        };
        warn!(
            student_id = %student_id,
            event_id = %event_id,
            stage = %stage,
            "partial ledger write; reconciliation required"
        );
        error
    }

    fn emit(&self, entry: AuditEntry) {
        let summary = entry.summary();
        if let Err(error) = self.audit.record(entry) {
            warn!(error = %error, change = %summary, "audit sink rejected ledger change");
        }
    }
}

fn worker_failures(
    ids: Vec<EventId>,
    reason: &str,
) -> Vec<(EventId, Result<LedgerReceipt, LedgerServiceError>)> {
    ids.into_iter()
        .map(|event_id| {
            (
                event_id,
                Err(LedgerServiceError::BatchWorker(reason.to_string())),
            )
        })
        .collect()
}

/// Why a student reference did not resolve to a single active student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "matches", rename_all = "snake_case")]
pub enum UnresolvedReason {
    Missing,
    Withdrawn,
    Ambiguous(usize),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::Missing => write!(f, "no such student"),
            UnresolvedReason::Withdrawn => write!(f, "student has been withdrawn"),
            UnresolvedReason::Ambiguous(count) => {
                write!(f, "{count} active students share this number")
            }
        }
    }
}

/// Which write was in flight when a ledger operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStage {
    EventWrite,
    AggregateWrite,
    Rollback,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteStage::EventWrite => "event write",
            WriteStage::AggregateWrite => "aggregate write",
            WriteStage::Rollback => "rollback",
        })
    }
}

/// Error raised by the ledger service.
#[derive(Debug, thiserror::Error)]
pub enum LedgerServiceError {
    #[error("could not resolve {reference}: {reason}")]
    UnresolvedStudent {
        reference: String,
        reason: UnresolvedReason,
    },
    #[error(transparent)]
    Validation(#[from] EventValidationError),
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("student number {0} is already registered")]
    DuplicateStudent(StudentNumber),
    #[error("event {0} changed while it was being edited")]
    StaleEvent(EventId),
    #[error("aggregates for student {student_id} kept changing; gave up after {attempts} attempts")]
    StaleAggregate { student_id: StudentId, attempts: u32 },
    #[error("partial write for student {student_id} during {stage}: {source}")]
    PartialWrite {
        student_id: StudentId,
        event_id: Option<EventId>,
        stage: WriteStage,
        #[source]
        source: StoreError,
    },
    #[error("batch worker failed: {0}")]
    BatchWorker(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerServiceError {
    fn unresolved(reference: impl fmt::Display, reason: UnresolvedReason) -> Self {
        LedgerServiceError::UnresolvedStudent {
            reference: reference.to_string(),
            reason,
        }
    }

    /// Operator guidance attached to partial writes.
    pub fn reconciliation_hint(&self) -> Option<String> {
        match self {
            LedgerServiceError::PartialWrite {
                student_id,
                event_id,
                ..
            } => {
                let event = event_id
                    .as_ref()
                    .map(|id| format!("event {id}"))
                    .unwrap_or_else(|| "the last event".to_string());
                Some(format!(
                    "{event} may not be reflected in the aggregates of student {student_id}; \
                     run reconciliation for that student before retrying"
                ))
            }
            _ => None,
        }
    }
}
