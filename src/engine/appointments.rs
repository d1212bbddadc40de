use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::{require_positive, require_text, LifecycleEngine, Staged};
use crate::entities::{Appointment, NewAppointment, Payment, PaymentTarget};
use crate::error::LifecycleError;
use crate::schedule::is_elapsed;
use crate::status::{AppointmentStatus, PaymentStatus};

/// Result of a lawyer approval: the appointment plus the payment it opened.
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub appointment: Appointment,
    pub payment: Payment,
}

impl LifecycleEngine {
    /// Client books a consultation; it waits for the lawyer's decision.
    pub fn request_appointment(
        &self,
        client_id: Uuid,
        req: NewAppointment,
    ) -> Result<Appointment, LifecycleError> {
        let case_type = require_text("case_type", &req.case_type)?;
        let description = require_text("description", &req.description)?;
        let consultation_fee = require_positive("consultation_fee", req.consultation_fee)?;
        if req.lawyer_id == client_id {
            return Err(LifecycleError::Validation(
                "client and lawyer must be different accounts".into(),
            ));
        }
        let window = self.config.approval_window;

        let appointment = self.commit("request_appointment", |_books, now| {
            let appointment = Appointment {
                id: Uuid::new_v4(),
                client_id,
                lawyer_id: req.lawyer_id,
                consultation_type: req.consultation_type,
                case_type,
                description,
                selected_date: req.selected_date,
                selected_time: req.selected_time,
                consultation_fee,
                status: AppointmentStatus::PendingLawyerApproval,
                approval_deadline: Some(window.deadline_from(now)?),
                approval_duration_secs: window.as_duration().num_seconds(),
                payment_deadline: None,
                payment_duration_secs: 0,
                decline_reason: None,
                created_at: now,
                completed_at: None,
            };
            Ok(Staged::new(appointment.clone()).appointment(appointment))
        })?;

        info!(appointment_id = %appointment.id, lawyer_id = %appointment.lawyer_id, "appointment requested");
        Ok(appointment)
    }

    pub fn approve_appointment(&self, id: Uuid) -> Result<Approval, LifecycleError> {
        let window = self.config.payment_window;

        let approval = self.commit("approve_appointment", |books, now| {
            let mut appointment = books.appointment(id)?.clone();
            appointment.status = appointment
                .status
                .transition(AppointmentStatus::ApprovedAwaitingPayment)?;
            if appointment.approval_deadline.is_some_and(|d| is_elapsed(d, now)) {
                return Err(LifecycleError::DeadlinePassed(format!(
                    "approval window for appointment {id} has closed"
                )));
            }

            appointment.approval_deadline = None;
            appointment.payment_deadline = Some(window.deadline_from(now)?);
            appointment.payment_duration_secs = window.as_duration().num_seconds();

            let payment = Payment::pending(
                PaymentTarget::Appointment(id),
                appointment.consultation_fee,
                format!("Consultation fee ({})", appointment.case_type),
                now,
            );

            Ok(Staged::new(Approval {
                appointment: appointment.clone(),
                payment: payment.clone(),
            })
            .appointment(appointment)
            .payment(payment))
        })?;

        info!(appointment_id = %id, payment_id = %approval.payment.id, "appointment approved");
        Ok(approval)
    }

    pub fn decline_appointment(&self, id: Uuid, reason: &str) -> Result<Appointment, LifecycleError> {
        let reason = require_text("reason", reason)?;

        let appointment = self.commit("decline_appointment", |books, _now| {
            let mut appointment = books.appointment(id)?.clone();
            appointment.status = appointment
                .status
                .transition(AppointmentStatus::DeclinedByLawyer)?;
            appointment.decline_reason = Some(reason);
            appointment.approval_deadline = None;
            appointment.payment_deadline = None;
            Ok(Staged::new(appointment.clone()).appointment(appointment))
        })?;

        info!(appointment_id = %id, "appointment declined");
        Ok(appointment)
    }

    /// Client withdraws before the consultation is paid for. An open
    /// consultation payment is voided as FAILED.
    pub fn cancel_appointment(&self, id: Uuid) -> Result<Appointment, LifecycleError> {
        let appointment = self.commit("cancel_appointment", |books, _now| {
            let mut appointment = books.appointment(id)?.clone();
            appointment.status = appointment
                .status
                .transition(AppointmentStatus::CancelledByClient)?;
            appointment.approval_deadline = None;
            appointment.payment_deadline = None;

            let mut staged = Staged::new(appointment.clone()).appointment(appointment);
            for pending in books.pending_payments_for(PaymentTarget::Appointment(id)) {
                let mut voided = pending.clone();
                voided.status = voided.status.transition(PaymentStatus::Failed)?;
                staged = staged.payment(voided);
            }
            Ok(staged)
        })?;

        info!(appointment_id = %id, "appointment cancelled by client");
        Ok(appointment)
    }

    pub fn complete_consultation(&self, id: Uuid) -> Result<Appointment, LifecycleError> {
        let appointment = self.commit("complete_consultation", |books, now| {
            let mut appointment = books.appointment(id)?.clone();
            appointment.status = appointment.status.transition(AppointmentStatus::Completed)?;
            appointment.completed_at = Some(now);
            Ok(Staged::new(appointment.clone()).appointment(appointment))
        })?;

        info!(appointment_id = %id, "consultation completed");
        Ok(appointment)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::LifecycleConfig;
    use crate::engine::MAX_AMOUNT;
    use crate::entities::ConsultationType;

    fn engine() -> (Arc<ManualClock>, LifecycleEngine) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()));
        let engine = LifecycleEngine::new(clock.clone(), LifecycleConfig::default());
        (clock, engine)
    }

    fn booking(lawyer_id: Uuid) -> NewAppointment {
        NewAppointment {
            lawyer_id,
            consultation_type: ConsultationType::Video,
            case_type: "Family law".into(),
            description: "Custody arrangement".into(),
            selected_date: NaiveDate::from_ymd_opt(2026, 5, 6).unwrap(),
            selected_time: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
            consultation_fee: 2500,
        }
    }

    #[test]
    fn request_sets_approval_deadline_only() {
        let (clock, engine) = engine();
        let a = engine.request_appointment(Uuid::new_v4(), booking(Uuid::new_v4())).unwrap();
        assert_eq!(a.status, AppointmentStatus::PendingLawyerApproval);
        assert_eq!(a.approval_deadline, Some(clock.now() + Duration::hours(24)));
        assert_eq!(a.payment_deadline, None);
        assert_eq!(a.approval_duration_secs, 24 * 3600);
        assert!(a.deadlines_consistent());
    }

    #[test]
    fn request_rejects_bad_fee_and_self_booking() {
        let (_clock, engine) = engine();
        let client = Uuid::new_v4();

        let mut req = booking(Uuid::new_v4());
        req.consultation_fee = 0;
        assert!(matches!(
            engine.request_appointment(client, req),
            Err(LifecycleError::Validation(_))
        ));

        assert!(matches!(
            engine.request_appointment(client, booking(client)),
            Err(LifecycleError::Validation(_))
        ));
        assert!(engine.snapshot().appointments.is_empty());
    }

    #[test]
    fn request_rejects_fee_above_ceiling() {
        let (_clock, engine) = engine();
        let mut req = booking(Uuid::new_v4());
        req.consultation_fee = MAX_AMOUNT + 1;
        assert!(matches!(
            engine.request_appointment(Uuid::new_v4(), req),
            Err(LifecycleError::Validation(_))
        ));

        let mut req = booking(Uuid::new_v4());
        req.consultation_fee = MAX_AMOUNT;
        assert!(engine.request_appointment(Uuid::new_v4(), req).is_ok());
    }

    #[test]
    fn approve_opens_payment_for_fee() {
        let (_clock, engine) = engine();
        let a = engine.request_appointment(Uuid::new_v4(), booking(Uuid::new_v4())).unwrap();
        let approval = engine.approve_appointment(a.id).unwrap();

        assert_eq!(approval.payment.amount, 2500);
        assert_eq!(approval.payment.target, PaymentTarget::Appointment(a.id));
        assert_eq!(approval.payment.status, PaymentStatus::Pending);
        assert!(approval.appointment.deadlines_consistent());
        assert_eq!(engine.snapshot().payments.len(), 1);
    }

    #[test]
    fn approve_after_deadline_fails_without_mutation() {
        let (clock, engine) = engine();
        let a = engine.request_appointment(Uuid::new_v4(), booking(Uuid::new_v4())).unwrap();
        clock.advance(Duration::hours(24));

        let err = engine.approve_appointment(a.id).unwrap_err();
        assert!(matches!(err, LifecycleError::DeadlinePassed(_)));

        let snap = engine.snapshot();
        assert_eq!(snap.appointments[&a.id].status, AppointmentStatus::PendingLawyerApproval);
        assert!(snap.payments.is_empty());
    }

    #[test]
    fn decline_requires_reason_and_clears_deadline() {
        let (_clock, engine) = engine();
        let a = engine.request_appointment(Uuid::new_v4(), booking(Uuid::new_v4())).unwrap();
        assert!(matches!(
            engine.decline_appointment(a.id, "  "),
            Err(LifecycleError::Validation(_))
        ));

        let d = engine.decline_appointment(a.id, "Conflict of interest").unwrap();
        assert_eq!(d.status, AppointmentStatus::DeclinedByLawyer);
        assert_eq!(d.decline_reason.as_deref(), Some("Conflict of interest"));
        assert!(d.deadlines_consistent());
    }

    #[test]
    fn decline_after_approval_is_invalid() {
        let (_clock, engine) = engine();
        let a = engine.request_appointment(Uuid::new_v4(), booking(Uuid::new_v4())).unwrap();
        engine.approve_appointment(a.id).unwrap();
        assert!(matches!(
            engine.decline_appointment(a.id, "changed my mind"),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[test]
    fn cancel_voids_open_payment() {
        let (_clock, engine) = engine();
        let a = engine.request_appointment(Uuid::new_v4(), booking(Uuid::new_v4())).unwrap();
        let approval = engine.approve_appointment(a.id).unwrap();

        let c = engine.cancel_appointment(a.id).unwrap();
        assert_eq!(c.status, AppointmentStatus::CancelledByClient);
        assert!(c.deadlines_consistent());
        assert_eq!(
            engine.snapshot().payments[&approval.payment.id].status,
            PaymentStatus::Failed
        );
    }

    #[test]
    fn complete_requires_confirmed() {
        let (_clock, engine) = engine();
        let a = engine.request_appointment(Uuid::new_v4(), booking(Uuid::new_v4())).unwrap();
        assert!(matches!(
            engine.complete_consultation(a.id),
            Err(LifecycleError::InvalidTransition(_))
        ));
        assert!(matches!(
            engine.complete_consultation(Uuid::new_v4()),
            Err(LifecycleError::NotFound(_))
        ));
    }
}
