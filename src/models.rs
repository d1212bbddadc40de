use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Store;
use crate::engine::LifecycleEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub store: Arc<dyn Store>,
    pub session_ttl_hours: i64,
}

/* -------------------------
   API envelope
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

impl<T> ApiOk<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/* -------------------------
   Accounts
--------------------------*/

/// Stored as smallint: 0 client, 1 lawyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum ActorRole {
    Client = 0,
    Lawyer = 1,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Client => "client",
            ActorRole::Lawyer => "lawyer",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub account_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: ActorRole,
    pub is_active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub session_token_id: Uuid,
    pub account_id: Uuid,
    pub role: ActorRole,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub account_id: Uuid,
    pub token_hash: String,
    pub device_name: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   Auth DTOs
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountProfile,
}

#[derive(Debug, Serialize)]
pub struct AccountProfile {
    pub account_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: ActorRole,
}

impl From<&AccountRow> for AccountProfile {
    fn from(row: &AccountRow) -> Self {
        Self {
            account_id: row.account_id,
            email: row.email.clone(),
            display_name: row.display_name.clone(),
            role: row.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MeResponseData {
    pub account: AccountProfile,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}
