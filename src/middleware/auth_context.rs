use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::{ActorRole, AppState};
use crate::views::Actor;

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: Uuid,
    pub role: ActorRole,
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl AuthContext {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.account_id,
            role: self.role,
        }
    }

    pub fn is_lawyer(&self) -> bool {
        self.role == ActorRole::Lawyer
    }

    pub fn is_client(&self) -> bool {
        self.role == ActorRole::Client
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Authorization: Bearer <token>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            let token_hash = hash_access_token(authz.token());
            let now = state.engine.now();

            let session = state
                .store
                .find_session(&token_hash, now)
                .await?
                .ok_or_else(ApiError::session_expired)?;

            // best-effort
            if let Err(e) = state.store.touch_session(session.session_token_id, now).await {
                tracing::debug!(error = %e, "failed to touch session");
            }

            Ok(AuthContext {
                account_id: session.account_id,
                role: session.role,
                session_token_id: session.session_token_id,
                expires_at: session.expires_at,
            })
        }
    }
}
