use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::audit::AuditSink;
use super::domain::{EventDraft, EventId, EventRevision, NewStudent, StudentId};
use super::repository::{EventStore, StoreError, StudentStore};
use super::service::{LedgerReceipt, LedgerService, LedgerServiceError};
use super::views::StudentView;

/// Router builder exposing the ledger over HTTP.
///
/// Handlers call the synchronous service directly on the runtime worker, which is fine for
/// [`InMemoryLedgerStore`](super::InMemoryLedgerStore). A store that does blocking I/O should
/// move each service call onto `tokio::task::spawn_blocking`, the way
/// [`LedgerService::reverse_many`] already does for its batch workers.
pub fn ledger_router<R, A>(service: Arc<LedgerService<R, A>>) -> Router
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route("/api/v1/students", post(register_handler::<R, A>))
        .route(
            "/api/v1/students/:student_id",
            get(score_card_handler::<R, A>).delete(withdraw_handler::<R, A>),
        )
        .route(
            "/api/v1/students/:student_id/reconciliation",
            get(reconcile_handler::<R, A>),
        )
        .route(
            "/api/v1/students/:student_id/repair",
            post(repair_handler::<R, A>),
        )
        .route("/api/v1/standings", get(standings_handler::<R, A>))
        .route("/api/v1/events", post(record_handler::<R, A>))
        .route(
            "/api/v1/events/bulk-delete",
            post(bulk_delete_handler::<R, A>),
        )
        .route(
            "/api/v1/events/:event_id",
            put(revise_handler::<R, A>).delete(remove_handler::<R, A>),
        )
        .route(
            "/api/v1/events/:event_id/excuse",
            post(excuse_handler::<R, A>).delete(unexcuse_handler::<R, A>),
        )
        .with_state(service)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub event_ids: Vec<EventId>,
}

pub(crate) async fn register_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Json(student): Json<NewStudent>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    match service.register_student(student) {
        Ok(student) => (StatusCode::CREATED, Json(StudentView::from(&student))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn score_card_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Path(student_id): Path<String>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    match service.score_card(&StudentId(student_id)) {
        Ok(card) => (StatusCode::OK, Json(card)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn withdraw_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Path(student_id): Path<String>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    let today = Local::now().date_naive();
    match service.withdraw_student(&StudentId(student_id), today) {
        Ok(student) => (StatusCode::OK, Json(StudentView::from(&student))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reconcile_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Path(student_id): Path<String>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    match service.reconcile(&StudentId(student_id)) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn repair_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Path(student_id): Path<String>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    match service.repair(&StudentId(student_id)) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn standings_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    match service.standings() {
        Ok(standings) => (StatusCode::OK, Json(standings)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn record_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Json(draft): Json<EventDraft>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    receipt_response(StatusCode::CREATED, service.record_event(draft))
}

pub(crate) async fn revise_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Path(event_id): Path<String>,
    Json(revision): Json<EventRevision>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    receipt_response(
        StatusCode::OK,
        service.revise_event(&EventId(event_id), revision),
    )
}

pub(crate) async fn remove_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Path(event_id): Path<String>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    receipt_response(StatusCode::OK, service.remove_event(&EventId(event_id)))
}

pub(crate) async fn excuse_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Path(event_id): Path<String>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    receipt_response(StatusCode::OK, service.excuse_absence(&EventId(event_id)))
}

pub(crate) async fn unexcuse_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Path(event_id): Path<String>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    receipt_response(StatusCode::OK, service.unexcuse_absence(&EventId(event_id)))
}

pub(crate) async fn bulk_delete_handler<R, A>(
    State(service): State<Arc<LedgerService<R, A>>>,
    Json(request): Json<BulkDeleteRequest>,
) -> Response
where
    R: StudentStore + EventStore + 'static,
    A: AuditSink + 'static,
{
    let report = service.reverse_many(request.event_ids).await;
    (StatusCode::OK, Json(report)).into_response()
}

fn receipt_response(
    status: StatusCode,
    outcome: Result<LedgerReceipt, LedgerServiceError>,
) -> Response {
    match outcome {
        Ok(receipt) => (status, Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Map service failures onto status codes. Clamp warnings never reach this path.
pub(crate) fn error_response(error: LedgerServiceError) -> Response {
    let status = match &error {
        LedgerServiceError::UnresolvedStudent { .. }
        | LedgerServiceError::EventNotFound(_)
        | LedgerServiceError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        LedgerServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerServiceError::DuplicateStudent(_)
        | LedgerServiceError::StaleEvent(_)
        | LedgerServiceError::StaleAggregate { .. } => StatusCode::CONFLICT,
        LedgerServiceError::PartialWrite { .. }
        | LedgerServiceError::BatchWorker(_)
        | LedgerServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = match &error {
        LedgerServiceError::UnresolvedStudent { reason, .. } => json!({
            "error": error.to_string(),
            "reason": reason,
        }),
        LedgerServiceError::PartialWrite {
            student_id,
            event_id,
            stage,
            ..
        } => json!({
            "error": error.to_string(),
            "student_id": student_id,
            "event_id": event_id,
            "stage": stage,
            "reconciliation_hint": error.reconciliation_hint(),
        }),
        _ => json!({
            "error": error.to_string(),
        }),
    };

    (status, Json(payload)).into_response()
}
