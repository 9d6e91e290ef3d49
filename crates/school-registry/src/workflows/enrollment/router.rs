use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::curriculum::CatalogError;
use super::domain::{LedgerEntryId, ProgramCode, RequestId, RequestStatus, StudentType, YearLevel};
use super::ledger::LedgerServiceError;
use super::migration::{MigrationError, MigrationSummary};
use super::receipts::ReceiptError;
use super::repository::RepositoryError;
use super::requests::{NewEnrollmentRequest, RequestServiceError};
use super::workflow::EnrollmentWorkflow;

/// Router exposing request intake, reviewer actions, and ledger administration.
pub fn enrollment_router(workflow: Arc<EnrollmentWorkflow>) -> Router {
    let receipt_limit = usize::try_from(workflow.receipts.policy().max_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(1);

    Router::new()
        .route(
            "/api/v1/enrollment/requests",
            post(create_handler).get(list_handler),
        )
        .route(
            "/api/v1/enrollment/requests/:request_id",
            get(get_handler).delete(delete_handler),
        )
        .route(
            "/api/v1/enrollment/requests/:request_id/status",
            patch(status_handler),
        )
        .route(
            "/api/v1/enrollment/requests/bulk/status",
            post(bulk_status_handler),
        )
        .route(
            "/api/v1/enrollment/requests/bulk/delete",
            post(bulk_delete_handler),
        )
        .route(
            "/api/v1/enrollment/students/:student_id/requests",
            get(student_requests_handler),
        )
        .route(
            "/api/v1/enrollment/receipts",
            post(receipt_handler).layer(DefaultBodyLimit::max(receipt_limit)),
        )
        .route("/api/v1/enrollment/migrations", post(migrate_handler))
        .route("/api/v1/enrollment/ledger", get(ledger_list_handler))
        .route("/api/v1/enrollment/ledger/cleanup", post(cleanup_handler))
        .route(
            "/api/v1/enrollment/ledger/:entry_id",
            get(ledger_get_handler),
        )
        .route(
            "/api/v1/enrollment/ledger/:entry_id/status",
            patch(ledger_status_handler),
        )
        .route("/api/v1/enrollment/curriculum", get(curriculum_handler))
        .route("/api/v1/enrollment/fees/quote", get(fee_quote_handler))
        .with_state(workflow)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChange {
    pub status: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkStatusChange {
    pub ids: Vec<RequestId>,
    pub status: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkDelete {
    pub ids: Vec<RequestId>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReceiptQuery {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LedgerQuery {
    pub student_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LedgerStatusChange {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurriculumQuery {
    pub program: String,
    pub year_level: String,
    pub semester: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeeQuoteQuery {
    pub program: String,
    pub year_level: String,
    #[serde(alias = "semester")]
    pub term: String,
    #[serde(default)]
    pub student_type: Option<String>,
    #[serde(default)]
    pub units: Option<u32>,
}

#[derive(Serialize)]
struct MigrationResponse<'a> {
    message: String,
    #[serde(flatten)]
    summary: &'a MigrationSummary,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (status, Json(payload)).into_response()
}

fn request_error_response(error: RequestServiceError) -> Response {
    let status = match &error {
        RequestServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RequestServiceError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        RequestServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        RequestServiceError::AlreadyMigrated(_) => StatusCode::CONFLICT,
        RequestServiceError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        RequestServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, error.to_string())
}

fn ledger_error_response(error: LedgerServiceError) -> Response {
    let status = match &error {
        LedgerServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerServiceError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        LedgerServiceError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        LedgerServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, error.to_string())
}

pub(crate) async fn create_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Json(submission): Json<NewEnrollmentRequest>,
) -> Response {
    match workflow.requests.create(submission) {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(error) => request_error_response(error),
    }
}

pub(crate) async fn list_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<RequestStatus>() {
            Ok(status) => Some(status),
            Err(_) => return request_error_response(RequestServiceError::InvalidStatus(raw.to_string())),
        },
    };

    match workflow.requests.list_all(status) {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(error) => request_error_response(error),
    }
}

pub(crate) async fn get_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Path(request_id): Path<u64>,
) -> Response {
    match workflow.requests.get_by_id(RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(error) => request_error_response(error),
    }
}

pub(crate) async fn delete_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Path(request_id): Path<u64>,
) -> Response {
    match workflow.requests.delete(RequestId(request_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => request_error_response(error),
    }
}

pub(crate) async fn status_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Path(request_id): Path<u64>,
    Json(change): Json<StatusChange>,
) -> Response {
    match workflow
        .requests
        .update_status(RequestId(request_id), &change.status, change.remarks)
    {
        Ok(update) => (StatusCode::OK, Json(update)).into_response(),
        Err(error) => request_error_response(error),
    }
}

pub(crate) async fn bulk_status_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Json(change): Json<BulkStatusChange>,
) -> Response {
    match workflow
        .requests
        .bulk_update_status(&change.ids, &change.status, change.remarks)
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => request_error_response(error),
    }
}

pub(crate) async fn bulk_delete_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Json(payload): Json<BulkDelete>,
) -> Response {
    match workflow.requests.bulk_delete(&payload.ids) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => request_error_response(error),
    }
}

pub(crate) async fn student_requests_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Path(student_id): Path<String>,
) -> Response {
    match workflow.requests.list_by_student(&student_id) {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(error) => request_error_response(error),
    }
}

pub(crate) async fn receipt_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Query(query): Query<ReceiptQuery>,
    body: Bytes,
) -> Response {
    match workflow.receipts.store_receipt(&body, &query.name) {
        Ok(metadata) => (StatusCode::CREATED, Json(metadata)).into_response(),
        Err(error @ ReceiptError::TooLarge { .. }) => {
            error_response(StatusCode::PAYLOAD_TOO_LARGE, error.to_string())
        }
        Err(error @ ReceiptError::UnsupportedType(_)) => {
            error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, error.to_string())
        }
        Err(error @ ReceiptError::Empty) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
        }
        Err(error @ ReceiptError::Storage(_)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

pub(crate) async fn migrate_handler(State(workflow): State<Arc<EnrollmentWorkflow>>) -> Response {
    match workflow.migration.migrate_approved() {
        Ok(summary) => {
            let payload = MigrationResponse {
                message: summary.headline(),
                summary: &summary,
            };
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error @ MigrationError::FatalBatch(_)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
        }
    }
}

pub(crate) async fn ledger_list_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Query(query): Query<LedgerQuery>,
) -> Response {
    match workflow.ledger.list(query.student_id.as_deref()) {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(error) => ledger_error_response(error),
    }
}

pub(crate) async fn ledger_get_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Path(entry_id): Path<u64>,
) -> Response {
    match workflow.ledger.get(LedgerEntryId(entry_id)) {
        Ok(row) => (StatusCode::OK, Json(row)).into_response(),
        Err(error) => ledger_error_response(error),
    }
}

pub(crate) async fn ledger_status_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Path(entry_id): Path<u64>,
    Json(change): Json<LedgerStatusChange>,
) -> Response {
    match workflow
        .ledger
        .set_status(LedgerEntryId(entry_id), &change.status)
    {
        Ok(row) => (StatusCode::OK, Json(row)).into_response(),
        Err(error) => ledger_error_response(error),
    }
}

pub(crate) async fn cleanup_handler(State(workflow): State<Arc<EnrollmentWorkflow>>) -> Response {
    match workflow.ledger.cleanup_duplicates() {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => ledger_error_response(error),
    }
}

pub(crate) async fn curriculum_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Query(query): Query<CurriculumQuery>,
) -> Response {
    let program = match ProgramCode::parse(&query.program) {
        Ok(program) => program,
        Err(error) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
    };
    let year_level = match YearLevel::parse(&query.year_level) {
        Ok(year_level) => year_level,
        Err(error) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
    };

    match workflow
        .curriculum
        .resolve_curriculum(&program, year_level, &query.semester)
    {
        Ok(resolution) => (StatusCode::OK, Json(resolution)).into_response(),
        Err(error @ CatalogError::Unavailable(_)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
        }
    }
}

pub(crate) async fn fee_quote_handler(
    State(workflow): State<Arc<EnrollmentWorkflow>>,
    Query(query): Query<FeeQuoteQuery>,
) -> Response {
    let program = match ProgramCode::parse(&query.program) {
        Ok(program) => program,
        Err(error) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
    };
    let year_level = match YearLevel::parse(&query.year_level) {
        Ok(year_level) => year_level,
        Err(error) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
    };
    let student_type = match query.student_type.as_deref().map(str::trim) {
        None | Some("") => StudentType::default(),
        Some(raw) => match raw.parse::<StudentType>() {
            Ok(student_type) => student_type,
            Err(error) => {
                return error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
            }
        },
    };

    let breakdown = workflow.fees.calculate_fees(
        &program,
        year_level,
        query.term.trim(),
        student_type,
        query.units,
    );
    (StatusCode::OK, Json(breakdown)).into_response()
}
