//! Passive expiry of elapsed deadlines.
//!
//! Candidates are picked from the latest published snapshot without taking the
//! writer lock. Each candidate is then transitioned through the normal commit
//! path, which re-reads the entity and re-checks status and deadline. If an
//! explicit command got there first the re-check fails with
//! `InvalidTransition` and the candidate is skipped.

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::{LifecycleEngine, Staged};
use crate::entities::PaymentTarget;
use crate::error::LifecycleError;
use crate::schedule::is_elapsed;
use crate::status::{AppointmentStatus, CaseStatus, PaymentStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub approvals_expired: usize,
    pub payments_expired: usize,
    pub cases_overdue: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.approvals_expired + self.payments_expired + self.cases_overdue
    }
}

impl LifecycleEngine {
    pub fn sweep_expired(&self) -> SweepReport {
        let snapshot = self.snapshot();
        let now = self.now();
        let mut report = SweepReport::default();

        let appointments: Vec<Uuid> = snapshot
            .appointments
            .values()
            .filter(|a| {
                a.approval_deadline.is_some_and(|d| is_elapsed(d, now))
                    || a.payment_deadline.is_some_and(|d| is_elapsed(d, now))
            })
            .map(|a| a.id)
            .collect();

        let cases: Vec<Uuid> = snapshot
            .cases
            .values()
            .filter(|c| {
                c.status == CaseStatus::PaymentPending
                    && c.next_payment_deadline.is_some_and(|d| is_elapsed(d, now))
            })
            .map(|c| c.id)
            .collect();

        for id in appointments {
            match self.expire_appointment(id) {
                Ok(Some(AppointmentStatus::Expired)) => report.approvals_expired += 1,
                Ok(Some(_)) => report.payments_expired += 1,
                Ok(None) => {}
                Err(e) if e.is_race_outcome() => {
                    debug!(appointment_id = %id, error = %e, "sweep skipped appointment");
                }
                Err(e) => debug!(appointment_id = %id, error = %e, "sweep lookup failed"),
            }
        }

        for id in cases {
            match self.mark_case_overdue(id) {
                Ok(true) => report.cases_overdue += 1,
                Ok(false) => {}
                Err(e) => debug!(case_id = %id, error = %e, "sweep skipped case"),
            }
        }

        if report.total() > 0 {
            info!(
                approvals_expired = report.approvals_expired,
                payments_expired = report.payments_expired,
                cases_overdue = report.cases_overdue,
                "expiry sweep applied"
            );
        }
        report
    }

    /// Expires one appointment whose governing deadline has elapsed.
    ///
    /// Returns the new status, or `None` if the deadline has not elapsed yet.
    /// An appointment no longer in a pending status fails `InvalidTransition`.
    pub fn expire_appointment(&self, id: Uuid) -> Result<Option<AppointmentStatus>, LifecycleError> {
        self.commit("expire_appointment", |books, now| {
            let mut appointment = books.appointment(id)?.clone();

            let (next, deadline) = match appointment.status {
                AppointmentStatus::PendingLawyerApproval => {
                    (AppointmentStatus::Expired, appointment.approval_deadline)
                }
                AppointmentStatus::ApprovedAwaitingPayment => {
                    (AppointmentStatus::PaymentExpired, appointment.payment_deadline)
                }
                other => {
                    return Err(LifecycleError::InvalidTransition(format!(
                        "appointment {id} is {other}; nothing to expire"
                    )));
                }
            };
            if !deadline.is_some_and(|d| is_elapsed(d, now)) {
                return Ok(Staged::new(None));
            }

            appointment.status = appointment.status.transition(next)?;
            appointment.approval_deadline = None;
            appointment.payment_deadline = None;

            let mut staged = Staged::new(Some(next)).appointment(appointment);
            for pending in books.pending_payments_for(PaymentTarget::Appointment(id)) {
                let mut expired = pending.clone();
                expired.status = expired.status.transition(PaymentStatus::Expired)?;
                staged = staged.payment(expired);
            }
            Ok(staged)
        })
    }

    /// Moves a PAYMENT_PENDING case past its deadline to PAYMENT_OVERDUE.
    /// The deadline is kept so the overdue period stays visible.
    pub fn mark_case_overdue(&self, id: Uuid) -> Result<bool, LifecycleError> {
        self.commit("mark_case_overdue", |books, now| {
            let mut case = books.case(id)?.clone();
            case.status = case.status.transition(CaseStatus::PaymentOverdue)?;
            if !case.next_payment_deadline.is_some_and(|d| is_elapsed(d, now)) {
                return Ok(Staged::new(false));
            }
            case.record("Payment overdue", now);
            Ok(Staged::new(true).case(case))
        })
    }
}
