//! Persistence boundary.
//!
//! The engine never calls into this module. At boot the server loads the
//! canonical collections through [`Store::load_all`]; afterwards the commit
//! writer task feeds every engine commit to [`Store::commit`] as one batch.
//! A batch lands entirely or not at all. Rows are upserts keyed by id, so
//! replaying a batch is harmless.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::engine::Collections;
use crate::entities::{
    Appointment, Case, CaseDocument, CaseMessage, ConsultationType, Payment, PaymentTarget,
    TimelineEvent,
};
use crate::events::EngineEvent;
use crate::models::{AccountRow, NewSession, SessionRow};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("row decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn load_all(&self) -> Result<Collections, StoreError>;

    /// Persists every change of one engine commit atomically.
    async fn commit(&self, changes: &[EngineEvent]) -> Result<(), StoreError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRow>, StoreError>;

    async fn find_account(&self, account_id: Uuid) -> Result<Option<AccountRow>, StoreError>;

    async fn insert_session(&self, session: NewSession) -> Result<SessionRow, StoreError>;

    /// Live (unrevoked, unexpired, active account) session for a token hash.
    async fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRow>, StoreError>;

    async fn touch_session(&self, session_token_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    async fn revoke_session(&self, session_token_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;
}

pub async fn connect_pg(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/* ============================================================
   Postgres
   ============================================================ */

pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRecord {
    appointment_id: Uuid,
    client_id: Uuid,
    lawyer_id: Uuid,
    consultation_type: String,
    case_type: String,
    description: String,
    selected_date: NaiveDate,
    selected_time: NaiveTime,
    consultation_fee: i64,
    status: String,
    approval_deadline: Option<DateTime<Utc>>,
    approval_duration_secs: i64,
    payment_deadline: Option<DateTime<Utc>>,
    payment_duration_secs: i64,
    decline_reason: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<AppointmentRecord> for Appointment {
    type Error = StoreError;

    fn try_from(r: AppointmentRecord) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: r.appointment_id,
            client_id: r.client_id,
            lawyer_id: r.lawyer_id,
            consultation_type: ConsultationType::parse(&r.consultation_type).ok_or_else(|| {
                StoreError::Decode(format!("unknown consultation_type: {}", r.consultation_type))
            })?,
            case_type: r.case_type,
            description: r.description,
            selected_date: r.selected_date,
            selected_time: r.selected_time,
            consultation_fee: r.consultation_fee,
            status: r.status.parse().map_err(decode)?,
            approval_deadline: r.approval_deadline,
            approval_duration_secs: r.approval_duration_secs,
            payment_deadline: r.payment_deadline,
            payment_duration_secs: r.payment_duration_secs,
            decline_reason: r.decline_reason,
            created_at: r.created_at,
            completed_at: r.completed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CaseRecord {
    case_id: Uuid,
    appointment_id: Uuid,
    client_id: Uuid,
    lawyer_id: Uuid,
    title: String,
    description: String,
    case_type: String,
    status: String,
    total_fees: i64,
    paid_amount: i64,
    progress: i16,
    documents: Json<Vec<CaseDocument>>,
    messages: Json<Vec<CaseMessage>>,
    timeline: Json<Vec<TimelineEvent>>,
    next_payment_deadline: Option<DateTime<Utc>>,
    payment_duration_secs: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<CaseRecord> for Case {
    type Error = StoreError;

    fn try_from(r: CaseRecord) -> Result<Self, Self::Error> {
        Ok(Case {
            id: r.case_id,
            appointment_id: r.appointment_id,
            client_id: r.client_id,
            lawyer_id: r.lawyer_id,
            title: r.title,
            description: r.description,
            case_type: r.case_type,
            status: r.status.parse().map_err(decode)?,
            total_fees: r.total_fees,
            paid_amount: r.paid_amount,
            progress: u8::try_from(r.progress)
                .map_err(|_| StoreError::Decode(format!("progress out of range: {}", r.progress)))?,
            documents: r.documents.0,
            messages: r.messages.0,
            timeline: r.timeline.0,
            next_payment_deadline: r.next_payment_deadline,
            payment_duration_secs: r.payment_duration_secs,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRecord {
    payment_id: Uuid,
    appointment_id: Option<Uuid>,
    case_id: Option<Uuid>,
    amount: i64,
    description: String,
    status: String,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRecord> for Payment {
    type Error = StoreError;

    fn try_from(r: PaymentRecord) -> Result<Self, Self::Error> {
        let target = match (r.appointment_id, r.case_id) {
            (Some(id), None) => PaymentTarget::Appointment(id),
            (None, Some(id)) => PaymentTarget::Case(id),
            _ => {
                return Err(StoreError::Decode(format!(
                    "payment {} must reference exactly one of appointment or case",
                    r.payment_id
                )));
            }
        };
        Ok(Payment {
            id: r.payment_id,
            target,
            amount: r.amount,
            description: r.description,
            status: r.status.parse().map_err(decode)?,
            created_at: r.created_at,
            paid_at: r.paid_at,
            refunded_at: r.refunded_at,
        })
    }
}

fn decode(e: crate::error::LifecycleError) -> StoreError {
    StoreError::Decode(e.to_string())
}

#[async_trait]
impl Store for PgStore {
    async fn load_all(&self) -> Result<Collections, StoreError> {
        let appointments = sqlx::query_as::<_, AppointmentRecord>(
            r#"
            SELECT appointment_id, client_id, lawyer_id, consultation_type, case_type,
                   description, selected_date, selected_time, consultation_fee, status,
                   approval_deadline, approval_duration_secs, payment_deadline,
                   payment_duration_secs, decline_reason, created_at, completed_at
            FROM appointment
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let cases = sqlx::query_as::<_, CaseRecord>(
            r#"
            SELECT case_id, appointment_id, client_id, lawyer_id, title, description,
                   case_type, status, total_fees, paid_amount, progress, documents,
                   messages, timeline, next_payment_deadline, payment_duration_secs,
                   created_at
            FROM legal_case
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let payments = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT payment_id, appointment_id, case_id, amount, description, status,
                   created_at, paid_at, refunded_at
            FROM payment
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut books = Collections::default();
        for r in appointments {
            let a = Appointment::try_from(r)?;
            books.appointments.insert(a.id, Arc::new(a));
        }
        for r in cases {
            let c = Case::try_from(r)?;
            books.cases.insert(c.id, Arc::new(c));
        }
        for r in payments {
            let p = Payment::try_from(r)?;
            books.payments.insert(p.id, Arc::new(p));
        }
        Ok(books)
    }

    async fn commit(&self, changes: &[EngineEvent]) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;
        for change in changes {
            upsert(&mut *tx, change).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRow>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT account_id, email, display_name, password_hash, role, is_active
            FROM account
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<AccountRow>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT account_id, email, display_name, password_hash, role, is_active
            FROM account
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert_session(&self, session: NewSession) -> Result<SessionRow, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            WITH inserted AS (
              INSERT INTO session_token (account_id, session_token_hash, device_name, expires_at)
              VALUES ($1, $2, $3, $4)
              RETURNING session_token_id, account_id, expires_at
            )
            SELECT i.session_token_id, i.account_id, a.role, i.expires_at
            FROM inserted i
            JOIN account a ON a.account_id = i.account_id
            "#,
        )
        .bind(session.account_id)
        .bind(&session.token_hash)
        .bind(session.device_name.as_deref())
        .bind(session.expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRow>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT st.session_token_id, st.account_id, a.role, st.expires_at
            FROM session_token st
            JOIN account a ON a.account_id = st.account_id
            WHERE st.session_token_hash = $1
              AND st.revoked_at IS NULL
              AND st.expires_at > $2
              AND a.is_active = true
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn touch_session(&self, session_token_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE session_token
            SET last_seen_at = $2
            WHERE session_token_id = $1
            "#,
        )
        .bind(session_token_id)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn revoke_session(&self, session_token_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE session_token
            SET revoked_at = COALESCE(revoked_at, $2)
            WHERE session_token_id = $1
            "#,
        )
        .bind(session_token_id)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

async fn upsert(conn: &mut PgConnection, change: &EngineEvent) -> Result<(), sqlx::Error> {
    match change {
        EngineEvent::Appointment(a) => {
            sqlx::query(
                r#"
                INSERT INTO appointment (
                  appointment_id, client_id, lawyer_id, consultation_type, case_type,
                  description, selected_date, selected_time, consultation_fee, status,
                  approval_deadline, approval_duration_secs, payment_deadline,
                  payment_duration_secs, decline_reason, created_at, completed_at
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
                ON CONFLICT (appointment_id) DO UPDATE SET
                  status = EXCLUDED.status,
                  approval_deadline = EXCLUDED.approval_deadline,
                  payment_deadline = EXCLUDED.payment_deadline,
                  payment_duration_secs = EXCLUDED.payment_duration_secs,
                  decline_reason = EXCLUDED.decline_reason,
                  completed_at = EXCLUDED.completed_at
                "#,
            )
            .bind(a.id)
            .bind(a.client_id)
            .bind(a.lawyer_id)
            .bind(a.consultation_type.as_str())
            .bind(&a.case_type)
            .bind(&a.description)
            .bind(a.selected_date)
            .bind(a.selected_time)
            .bind(a.consultation_fee)
            .bind(a.status.as_str())
            .bind(a.approval_deadline)
            .bind(a.approval_duration_secs)
            .bind(a.payment_deadline)
            .bind(a.payment_duration_secs)
            .bind(a.decline_reason.as_deref())
            .bind(a.created_at)
            .bind(a.completed_at)
            .execute(&mut *conn)
            .await?;
        }
        EngineEvent::Case(c) => {
            sqlx::query(
                r#"
                INSERT INTO legal_case (
                  case_id, appointment_id, client_id, lawyer_id, title, description,
                  case_type, status, total_fees, paid_amount, progress, documents,
                  messages, timeline, next_payment_deadline, payment_duration_secs,
                  created_at
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
                ON CONFLICT (case_id) DO UPDATE SET
                  status = EXCLUDED.status,
                  total_fees = EXCLUDED.total_fees,
                  paid_amount = EXCLUDED.paid_amount,
                  progress = EXCLUDED.progress,
                  documents = EXCLUDED.documents,
                  messages = EXCLUDED.messages,
                  timeline = EXCLUDED.timeline,
                  next_payment_deadline = EXCLUDED.next_payment_deadline,
                  payment_duration_secs = EXCLUDED.payment_duration_secs
                "#,
            )
            .bind(c.id)
            .bind(c.appointment_id)
            .bind(c.client_id)
            .bind(c.lawyer_id)
            .bind(&c.title)
            .bind(&c.description)
            .bind(&c.case_type)
            .bind(c.status.as_str())
            .bind(c.total_fees)
            .bind(c.paid_amount)
            .bind(i16::from(c.progress))
            .bind(Json(&c.documents))
            .bind(Json(&c.messages))
            .bind(Json(&c.timeline))
            .bind(c.next_payment_deadline)
            .bind(c.payment_duration_secs)
            .bind(c.created_at)
            .execute(&mut *conn)
            .await?;
        }
        EngineEvent::Payment(p) => {
            sqlx::query(
                r#"
                INSERT INTO payment (
                  payment_id, appointment_id, case_id, amount, description, status,
                  created_at, paid_at, refunded_at
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
                ON CONFLICT (payment_id) DO UPDATE SET
                  status = EXCLUDED.status,
                  paid_at = EXCLUDED.paid_at,
                  refunded_at = EXCLUDED.refunded_at
                "#,
            )
            .bind(p.id)
            .bind(p.target.appointment_id())
            .bind(p.target.case_id())
            .bind(p.amount)
            .bind(&p.description)
            .bind(p.status.as_str())
            .bind(p.created_at)
            .bind(p.paid_at)
            .bind(p.refunded_at)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/* ============================================================
   In-memory
   ============================================================ */

#[derive(Debug, Clone)]
struct MemorySession {
    account_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct MemoryInner {
    books: Collections,
    accounts: HashMap<Uuid, AccountRow>,
    sessions: HashMap<Uuid, MemorySession>,
}

/// Process-local store for development runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, account: AccountRow) {
        self.lock().accounts.insert(account.account_id, account);
    }

    /// Everything committed so far.
    pub fn committed(&self) -> Collections {
        self.lock().books.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_all(&self) -> Result<Collections, StoreError> {
        Ok(self.lock().books.clone())
    }

    async fn commit(&self, changes: &[EngineEvent]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for change in changes {
            inner.books.apply(change);
        }
        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRow>, StoreError> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<AccountRow>, StoreError> {
        Ok(self.lock().accounts.get(&account_id).cloned())
    }

    async fn insert_session(&self, session: NewSession) -> Result<SessionRow, StoreError> {
        let mut inner = self.lock();
        let role = inner
            .accounts
            .get(&session.account_id)
            .map(|a| a.role)
            .ok_or_else(|| StoreError::Decode(format!("account {} not found", session.account_id)))?;

        let session_token_id = Uuid::new_v4();
        inner.sessions.insert(
            session_token_id,
            MemorySession {
                account_id: session.account_id,
                token_hash: session.token_hash,
                expires_at: session.expires_at,
                revoked_at: None,
            },
        );
        Ok(SessionRow {
            session_token_id,
            account_id: session.account_id,
            role,
            expires_at: session.expires_at,
        })
    }

    async fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRow>, StoreError> {
        let inner = self.lock();
        let found = inner.sessions.iter().find(|(_, s)| {
            s.token_hash == token_hash && s.revoked_at.is_none() && s.expires_at > now
        });
        let Some((id, s)) = found else {
            return Ok(None);
        };
        let Some(account) = inner.accounts.get(&s.account_id).filter(|a| a.is_active) else {
            return Ok(None);
        };
        Ok(Some(SessionRow {
            session_token_id: *id,
            account_id: s.account_id,
            role: account.role,
            expires_at: s.expires_at,
        }))
    }

    async fn touch_session(&self, _session_token_id: Uuid, _now: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn revoke_session(&self, session_token_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(s) = self.lock().sessions.get_mut(&session_token_id) {
            s.revoked_at.get_or_insert(now);
        }
        Ok(())
    }
}
