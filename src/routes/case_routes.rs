use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::{Case, CaseDetails, NewDocument, Payment},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState},
    views::{self, DeadlineEntry},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cases", get(list_cases).post(start_case))
        .route("/cases/{case_id}", get(get_case))
        .route("/cases/{case_id}/deadline", get(get_deadline))
        .route("/cases/{case_id}/payments", post(request_payment))
        .route("/cases/{case_id}/progress", post(set_progress))
        .route("/cases/{case_id}/close", post(close))
        .route("/cases/{case_id}/terminate", post(terminate))
        .route("/cases/{case_id}/end", post(end_by_client))
        .route("/cases/{case_id}/documents", post(add_document))
        .route("/cases/{case_id}/documents/{document_id}", delete(remove_document))
        .route("/cases/{case_id}/messages", post(add_message))
}

/* ============================================================
   Access helpers
   ============================================================ */

fn load_case(state: &AppState, case_id: Uuid) -> Result<Case, ApiError> {
    Ok(state.engine.snapshot().case(case_id)?.clone())
}

fn ensure_party(auth: &AuthContext, c: &Case) -> Result<(), ApiError> {
    if c.involves(auth.account_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Not a party to this case"))
    }
}

fn ensure_lawyer_of(auth: &AuthContext, c: &Case) -> Result<(), ApiError> {
    if auth.is_lawyer() && c.lawyer_id == auth.account_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the case's lawyer can do this"))
    }
}

fn ensure_client_of(auth: &AuthContext, c: &Case) -> Result<(), ApiError> {
    if auth.is_client() && c.client_id == auth.account_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the case's client can do this"))
    }
}

/* ============================================================
   Request DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct StartCaseRequest {
    pub appointment_id: Uuid,
    #[serde(flatten)]
    pub details: CaseDetails,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: i64,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress: u8,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub body: String,
}

/* ============================================================
   Reads
   ============================================================ */

pub async fn list_cases(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Case>>>, ApiError> {
    let books = state.engine.snapshot();
    Ok(Json(ApiOk::new(views::cases_for(&books, auth.actor()))))
}

pub async fn get_case(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    let c = load_case(&state, case_id)?;
    ensure_party(&auth, &c)?;
    Ok(Json(ApiOk::new(c)))
}

pub async fn get_deadline(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<ApiOk<Option<DeadlineEntry>>>, ApiError> {
    let c = load_case(&state, case_id)?;
    ensure_party(&auth, &c)?;
    let entry = views::case_deadline(&c, state.engine.now(), state.engine.config());
    Ok(Json(ApiOk::new(entry)))
}

/* ============================================================
   Lawyer commands
   ============================================================ */

pub async fn start_case(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<StartCaseRequest>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    let appointment = state
        .engine
        .snapshot()
        .appointment(req.appointment_id)?
        .clone();
    if !(auth.is_lawyer() && appointment.lawyer_id == auth.account_id) {
        return Err(ApiError::forbidden("Only the appointment's lawyer can open a case"));
    }
    let c = state.engine.start_case(req.appointment_id, req.details)?;
    Ok(Json(ApiOk::new(c)))
}

pub async fn request_payment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<ApiOk<Payment>>, ApiError> {
    ensure_lawyer_of(&auth, &load_case(&state, case_id)?)?;
    let p = state
        .engine
        .request_case_payment(case_id, req.amount, &req.description)?;
    Ok(Json(ApiOk::new(p)))
}

pub async fn set_progress(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    ensure_lawyer_of(&auth, &load_case(&state, case_id)?)?;
    let c = state.engine.update_case_progress(case_id, req.progress)?;
    Ok(Json(ApiOk::new(c)))
}

pub async fn close(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    ensure_lawyer_of(&auth, &load_case(&state, case_id)?)?;
    let c = state.engine.close_case(case_id)?;
    Ok(Json(ApiOk::new(c)))
}

pub async fn terminate(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    ensure_lawyer_of(&auth, &load_case(&state, case_id)?)?;
    let c = state.engine.terminate_case(case_id, &req.reason)?;
    Ok(Json(ApiOk::new(c)))
}

/* ============================================================
   Client commands
   ============================================================ */

pub async fn end_by_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    ensure_client_of(&auth, &load_case(&state, case_id)?)?;
    let c = state.engine.end_case_by_client(case_id, &req.reason)?;
    Ok(Json(ApiOk::new(c)))
}

/* ============================================================
   Shared workspace
   ============================================================ */

pub async fn add_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(req): Json<NewDocument>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    ensure_party(&auth, &load_case(&state, case_id)?)?;
    let c = state.engine.add_document_to_case(case_id, auth.account_id, req)?;
    Ok(Json(ApiOk::new(c)))
}

pub async fn remove_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((case_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    ensure_party(&auth, &load_case(&state, case_id)?)?;
    let c = state.engine.remove_document_from_case(case_id, document_id)?;
    Ok(Json(ApiOk::new(c)))
}

pub async fn add_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(case_id): Path<Uuid>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<ApiOk<Case>>, ApiError> {
    ensure_party(&auth, &load_case(&state, case_id)?)?;
    let c = state.engine.add_message_to_case(case_id, auth.account_id, &req.body)?;
    Ok(Json(ApiOk::new(c)))
}
