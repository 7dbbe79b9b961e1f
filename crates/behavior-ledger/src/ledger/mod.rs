//! Behavior score ledger: keeps each student's running aggregates consistent with the
//! history of incidents, positive actions, and absences recorded against them.
//!
//! `engine` holds the pure delta arithmetic, `service` wraps it in the read-modify-write
//! cycle against the stores, and `router` exposes the service over HTTP.

pub mod audit;
pub mod catalog;
pub mod domain;
pub mod engine;
pub mod memory;
pub(crate) mod policy;
pub mod reconcile;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;
pub mod views;

#[cfg(test)]
mod tests;

pub use audit::{AuditEntry, AuditError, AuditSink, LedgerOperation};
pub use catalog::{
    MisconductCatalog, MisconductType, PositiveActionCatalog, PositiveActionType,
    ReferenceCatalogs,
};
pub use domain::{
    DraftKind, EventDraft, EventId, EventKind, EventRecord, EventRevision, NewStudent, Revision,
    ScoreCard, ScoreField, ScoredEvent, Student, StudentId, StudentNumber, StudentPatch,
    StudentRef,
};
pub use engine::{Applied, LossyReversal, Replaced, Reversed, ScoreLedger};
pub use memory::InMemoryLedgerStore;
pub use policy::{Bound, ClampedWarning, ScoreBand, ScorePolicy, Settlement};
pub use reconcile::{DriftReport, FieldDrift};
pub use repository::{
    EventFilter, EventStore, StoreError, StudentFilter, StudentStore,
};
pub use router::{ledger_router, BulkDeleteRequest};
pub use service::{
    BatchFailure, BatchReport, LedgerReceipt, LedgerService, LedgerServiceError,
    UnresolvedReason, WriteStage,
};
pub use validation::EventValidationError;
pub use views::{ScoreCardView, StandingEntry, StudentView};
