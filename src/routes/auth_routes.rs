use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::Duration;

use crate::{
    auth::{generate_access_token, hash_access_token, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<LoginResponseData>>, ApiError> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "email and password are required".into(),
        ));
    }

    let account = state
        .store
        .find_account_by_email(email)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    if !account.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    if !verify_password(&req.password, &account.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let access_token = generate_access_token();
    let expires_at = Duration::try_hours(state.session_ttl_hours)
        .and_then(|ttl| state.engine.now().checked_add_signed(ttl))
        .ok_or_else(|| ApiError::Internal("session expiry out of range".into()))?;

    let session = state
        .store
        .insert_session(NewSession {
            account_id: account.account_id,
            token_hash: hash_access_token(&access_token),
            device_name: req.device_name.clone(),
            expires_at,
        })
        .await?;

    tracing::info!(account_id = %account.account_id, role = account.role.as_str(), "login");

    Ok(Json(ApiOk::new(LoginResponseData {
        access_token,
        expires_at: session.expires_at,
        account: AccountProfile::from(&account),
    })))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<MeResponseData>>, ApiError> {
    let account = state
        .store
        .find_account(auth.account_id)
        .await?
        .filter(|a| a.is_active)
        .ok_or_else(ApiError::session_expired)?;

    Ok(Json(ApiOk::new(MeResponseData {
        account: AccountProfile::from(&account),
        session: SessionInfo {
            session_token_id: auth.session_token_id,
            expires_at: auth.expires_at,
        },
    })))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    state
        .store
        .revoke_session(auth.session_token_id, state.engine.now())
        .await?;
    Ok(Json(ApiOk::new(OkData { ok: true })))
}
