//! Canonical appointment, case and payment records plus the input shapes the
//! engine accepts for creating them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{AppointmentStatus, CaseStatus, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationType {
    Video,
    InOffice,
    Phone,
}

impl ConsultationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationType::Video => "video",
            ConsultationType::InOffice => "in_office",
            ConsultationType::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(ConsultationType::Video),
            "in_office" => Some(ConsultationType::InOffice),
            "phone" => Some(ConsultationType::Phone),
            _ => None,
        }
    }
}

/* -------------------------
   Appointment
--------------------------*/

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub lawyer_id: Uuid,
    pub consultation_type: ConsultationType,
    pub case_type: String,
    pub description: String,
    pub selected_date: NaiveDate,
    pub selected_time: NaiveTime,
    pub consultation_fee: i64,
    pub status: AppointmentStatus,
    pub approval_deadline: Option<DateTime<Utc>>,
    /// Length of the approval window in seconds; the denominator for urgency.
    pub approval_duration_secs: i64,
    pub payment_deadline: Option<DateTime<Utc>>,
    /// Length of the payment window the current `payment_deadline` was cut
    /// from; 0 until the appointment is approved.
    #[serde(default)]
    pub payment_duration_secs: i64,
    pub decline_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// At most one deadline is set, and only in its matching pending status.
    pub fn deadlines_consistent(&self) -> bool {
        let approval_ok = self.approval_deadline.is_some()
            == (self.status == AppointmentStatus::PendingLawyerApproval);
        let payment_ok = self.payment_deadline.is_some()
            == (self.status == AppointmentStatus::ApprovedAwaitingPayment);
        approval_ok && payment_ok
    }

    pub fn involves(&self, actor_id: Uuid) -> bool {
        self.client_id == actor_id || self.lawyer_id == actor_id
    }
}

/// Client booking request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub lawyer_id: Uuid,
    pub consultation_type: ConsultationType,
    pub case_type: String,
    pub description: String,
    pub selected_date: NaiveDate,
    pub selected_time: NaiveTime,
    pub consultation_fee: i64,
}

/* -------------------------
   Case
--------------------------*/

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDocument {
    pub id: Uuid,
    pub name: String,
    pub url: Option<String>,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event: String,
    pub date: DateTime<Utc>,
    pub status: CaseStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub client_id: Uuid,
    pub lawyer_id: Uuid,
    pub title: String,
    pub description: String,
    pub case_type: String,
    pub status: CaseStatus,
    pub total_fees: i64,
    pub paid_amount: i64,
    pub progress: u8,
    pub documents: Vec<CaseDocument>,
    pub messages: Vec<CaseMessage>,
    pub timeline: Vec<TimelineEvent>,
    pub next_payment_deadline: Option<DateTime<Utc>>,
    /// Window length behind `next_payment_deadline`; 0 before the first request.
    #[serde(default)]
    pub payment_duration_secs: i64,
    pub created_at: DateTime<Utc>,
}

impl Case {
    pub fn record(&mut self, event: impl Into<String>, at: DateTime<Utc>) {
        self.timeline.push(TimelineEvent {
            event: event.into(),
            date: at,
            status: self.status,
        });
    }

    pub fn outstanding_fees(&self) -> i64 {
        self.total_fees - self.paid_amount
    }

    pub fn involves(&self, actor_id: Uuid) -> bool {
        self.client_id == actor_id || self.lawyer_id == actor_id
    }
}

/// Lawyer-supplied details when converting a completed consultation.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseDetails {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the appointment's case type.
    pub case_type: Option<String>,
    #[serde(default)]
    pub total_fees: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub name: String,
    pub url: Option<String>,
}

/* -------------------------
   Payment
--------------------------*/

/// The obligation a payment settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTarget {
    Appointment(Uuid),
    Case(Uuid),
}

impl PaymentTarget {
    pub fn appointment_id(&self) -> Option<Uuid> {
        match self {
            PaymentTarget::Appointment(id) => Some(*id),
            PaymentTarget::Case(_) => None,
        }
    }

    pub fn case_id(&self) -> Option<Uuid> {
        match self {
            PaymentTarget::Case(id) => Some(*id),
            PaymentTarget::Appointment(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub target: PaymentTarget,
    pub amount: i64,
    pub description: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn pending(target: PaymentTarget, amount: i64, description: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            amount,
            description,
            status: PaymentStatus::Pending,
            created_at: now,
            paid_at: None,
            refunded_at: None,
        }
    }
}
