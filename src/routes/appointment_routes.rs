use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    engine::Approval,
    entities::{Appointment, NewAppointment},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ActorRole, ApiOk, AppState},
    views::{self, DeadlineEntry},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(book_appointment))
        .route("/appointments/{appointment_id}", get(get_appointment))
        .route("/appointments/{appointment_id}/deadline", get(get_deadline))
        .route("/appointments/{appointment_id}/approve", post(approve))
        .route("/appointments/{appointment_id}/decline", post(decline))
        .route("/appointments/{appointment_id}/cancel", post(cancel))
        .route("/appointments/{appointment_id}/complete", post(complete))
}

/* ============================================================
   Access helpers
   ============================================================ */

fn load_appointment(state: &AppState, appointment_id: Uuid) -> Result<Appointment, ApiError> {
    Ok(state.engine.snapshot().appointment(appointment_id)?.clone())
}

fn ensure_party(auth: &AuthContext, a: &Appointment) -> Result<(), ApiError> {
    if a.involves(auth.account_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Not a party to this appointment"))
    }
}

fn ensure_lawyer_of(auth: &AuthContext, a: &Appointment) -> Result<(), ApiError> {
    if auth.is_lawyer() && a.lawyer_id == auth.account_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the appointment's lawyer can do this"))
    }
}

fn ensure_client_of(auth: &AuthContext, a: &Appointment) -> Result<(), ApiError> {
    if auth.is_client() && a.client_id == auth.account_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the appointment's client can do this"))
    }
}

/* ============================================================
   Reads
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let books = state.engine.snapshot();
    Ok(Json(ApiOk::new(views::appointments_for(&books, auth.actor()))))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let a = load_appointment(&state, appointment_id)?;
    ensure_party(&auth, &a)?;
    Ok(Json(ApiOk::new(a)))
}

/// `data` is null when the appointment has no live deadline.
pub async fn get_deadline(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Option<DeadlineEntry>>>, ApiError> {
    let a = load_appointment(&state, appointment_id)?;
    ensure_party(&auth, &a)?;
    let entry = views::appointment_deadline(&a, state.engine.now(), state.engine.config());
    Ok(Json(ApiOk::new(entry)))
}

/* ============================================================
   Commands
   ============================================================ */

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<NewAppointment>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    if !auth.is_client() {
        return Err(ApiError::forbidden("Only clients can book consultations"));
    }
    let lawyer = state.store.find_account(req.lawyer_id).await?;
    if !lawyer.is_some_and(|l| l.is_active && l.role == ActorRole::Lawyer) {
        return Err(ApiError::NotFound(
            "NOT_FOUND",
            format!("lawyer {} not found", req.lawyer_id),
        ));
    }
    let a = state.engine.request_appointment(auth.account_id, req)?;
    Ok(Json(ApiOk::new(a)))
}

pub async fn approve(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Approval>>, ApiError> {
    ensure_lawyer_of(&auth, &load_appointment(&state, appointment_id)?)?;
    let approval = state.engine.approve_appointment(appointment_id)?;
    Ok(Json(ApiOk::new(approval)))
}

#[derive(Debug, Deserialize)]
pub struct DeclineRequest {
    pub reason: String,
}

pub async fn decline(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<DeclineRequest>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    ensure_lawyer_of(&auth, &load_appointment(&state, appointment_id)?)?;
    let a = state.engine.decline_appointment(appointment_id, &req.reason)?;
    Ok(Json(ApiOk::new(a)))
}

pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    ensure_client_of(&auth, &load_appointment(&state, appointment_id)?)?;
    let a = state.engine.cancel_appointment(appointment_id)?;
    Ok(Json(ApiOk::new(a)))
}

pub async fn complete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    ensure_lawyer_of(&auth, &load_appointment(&state, appointment_id)?)?;
    let a = state.engine.complete_consultation(appointment_id)?;
    Ok(Json(ApiOk::new(a)))
}
