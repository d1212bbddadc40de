//! Closed status enumerations for appointments, cases and payments.
//!
//! Each enum owns its transition table. Engine commands never assign a status
//! directly; they call `transition` so that an edge missing from the table is
//! rejected with [`LifecycleError::InvalidTransition`].
//!
//! ```text
//! PENDING_LAWYER_APPROVAL ──► APPROVED_AWAITING_PAYMENT ──► CONFIRMED ──► COMPLETED
//!        │                              │
//!        ├─► DECLINED_BY_LAWYER         ├─► PAYMENT_EXPIRED
//!        ├─► EXPIRED                    └─► CANCELLED_BY_CLIENT
//!        └─► CANCELLED_BY_CLIENT
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

// ---------------------------------------------------------------------------
// AppointmentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    PendingLawyerApproval,
    ApprovedAwaitingPayment,
    Confirmed,
    Completed,
    DeclinedByLawyer,
    Expired,
    PaymentExpired,
    CancelledByClient,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 8] = [
        Self::PendingLawyerApproval,
        Self::ApprovedAwaitingPayment,
        Self::Confirmed,
        Self::Completed,
        Self::DeclinedByLawyer,
        Self::Expired,
        Self::PaymentExpired,
        Self::CancelledByClient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingLawyerApproval => "PENDING_LAWYER_APPROVAL",
            Self::ApprovedAwaitingPayment => "APPROVED_AWAITING_PAYMENT",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::DeclinedByLawyer => "DECLINED_BY_LAWYER",
            Self::Expired => "EXPIRED",
            Self::PaymentExpired => "PAYMENT_EXPIRED",
            Self::CancelledByClient => "CANCELLED_BY_CLIENT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DeclinedByLawyer
                | Self::Expired
                | Self::PaymentExpired
                | Self::CancelledByClient
                | Self::Completed
        )
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (
                PendingLawyerApproval,
                ApprovedAwaitingPayment | DeclinedByLawyer | Expired | CancelledByClient
            ) | (
                ApprovedAwaitingPayment,
                Confirmed | PaymentExpired | CancelledByClient
            ) | (Confirmed, Completed)
        )
    }

    /// Returns `next` when the edge exists, otherwise `InvalidTransition`.
    pub fn transition(self, next: AppointmentStatus) -> Result<Self, LifecycleError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LifecycleError::InvalidTransition(format!(
                "appointment cannot move from {self} to {next}"
            )))
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| LifecycleError::Validation(format!("unknown appointment status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// CaseStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Active,
    PaymentPending,
    PaymentOverdue,
    ClosedByLawyer,
    EndedByClient,
    Terminated,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 6] = [
        Self::Active,
        Self::PaymentPending,
        Self::PaymentOverdue,
        Self::ClosedByLawyer,
        Self::EndedByClient,
        Self::Terminated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::PaymentPending => "PAYMENT_PENDING",
            Self::PaymentOverdue => "PAYMENT_OVERDUE",
            Self::ClosedByLawyer => "CLOSED_BY_LAWYER",
            Self::EndedByClient => "ENDED_BY_CLIENT",
            Self::Terminated => "TERMINATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClosedByLawyer | Self::EndedByClient | Self::Terminated
        )
    }

    /// A payment request is outstanding; `next_payment_deadline` must be set.
    pub fn awaits_payment(&self) -> bool {
        matches!(self, Self::PaymentPending | Self::PaymentOverdue)
    }

    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        use CaseStatus::*;
        matches!(
            (self, next),
            (
                Active,
                PaymentPending | ClosedByLawyer | Terminated | EndedByClient
            ) | (PaymentPending, Active | PaymentOverdue | Terminated)
                | (PaymentOverdue, Active | Terminated)
        )
    }

    pub fn transition(self, next: CaseStatus) -> Result<Self, LifecycleError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LifecycleError::InvalidTransition(format!(
                "case cannot move from {self} to {next}"
            )))
        }
    }

    /// Guard for commands that only touch owned collections.
    pub fn ensure_open(self) -> Result<(), LifecycleError> {
        if self.is_terminal() {
            Err(LifecycleError::InvalidTransition(format!(
                "case is {self} and no longer accepts changes"
            )))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| LifecycleError::Validation(format!("unknown case status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// PaymentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Expired,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        Self::Pending,
        Self::Success,
        Self::Failed,
        Self::Expired,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Refunded => "REFUNDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Expired | Self::Refunded)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Success | Failed | Expired) | (Success, Refunded)
        )
    }

    pub fn transition(self, next: PaymentStatus) -> Result<Self, LifecycleError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LifecycleError::InvalidTransition(format!(
                "payment cannot move from {self} to {next}"
            )))
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| LifecycleError::Validation(format!("unknown payment status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
