use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    engine::Collections,
    entities::{Payment, PaymentTarget},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState},
    views,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list_payments))
        .route("/payments/{payment_id}", get(get_payment))
        .route("/payments/{payment_id}/confirm", post(confirm))
        .route("/payments/{payment_id}/refund", post(refund))
}

/// (client_id, lawyer_id) of whatever the payment settles.
fn parties(books: &Collections, p: &Payment) -> Result<(Uuid, Uuid), ApiError> {
    match p.target {
        PaymentTarget::Appointment(id) => {
            let a = books.appointment(id)?;
            Ok((a.client_id, a.lawyer_id))
        }
        PaymentTarget::Case(id) => {
            let c = books.case(id)?;
            Ok((c.client_id, c.lawyer_id))
        }
    }
}

fn load_payment(state: &AppState, payment_id: Uuid) -> Result<(Payment, Uuid, Uuid), ApiError> {
    let books = state.engine.snapshot();
    let p = books.payment(payment_id)?.clone();
    let (client_id, lawyer_id) = parties(&books, &p)?;
    Ok((p, client_id, lawyer_id))
}

pub async fn list_payments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Payment>>>, ApiError> {
    let books = state.engine.snapshot();
    Ok(Json(ApiOk::new(views::payments_for(&books, auth.actor()))))
}

pub async fn get_payment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Payment>>, ApiError> {
    let (p, client_id, lawyer_id) = load_payment(&state, payment_id)?;
    if auth.account_id != client_id && auth.account_id != lawyer_id {
        return Err(ApiError::forbidden("Not a party to this payment"));
    }
    Ok(Json(ApiOk::new(p)))
}

/// Client settles a pending payment.
pub async fn confirm(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Payment>>, ApiError> {
    let (_, client_id, _) = load_payment(&state, payment_id)?;
    if !(auth.is_client() && auth.account_id == client_id) {
        return Err(ApiError::forbidden("Only the paying client can confirm a payment"));
    }
    let p = state.engine.confirm_payment(payment_id)?;
    Ok(Json(ApiOk::new(p)))
}

pub async fn refund(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Payment>>, ApiError> {
    let (_, _, lawyer_id) = load_payment(&state, payment_id)?;
    if !(auth.is_lawyer() && auth.account_id == lawyer_id) {
        return Err(ApiError::forbidden("Only the receiving lawyer can refund a payment"));
    }
    let p = state.engine.refund_payment(payment_id)?;
    Ok(Json(ApiOk::new(p)))
}
