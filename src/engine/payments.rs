use tracing::info;
use uuid::Uuid;

use super::{LifecycleEngine, Staged};
use crate::entities::{Payment, PaymentTarget};
use crate::error::LifecycleError;
use crate::schedule::is_elapsed;
use crate::status::{AppointmentStatus, CaseStatus, PaymentStatus};

impl LifecycleEngine {
    /// Settles a pending payment and advances whatever it was paying for.
    ///
    /// Appointment payments must land before the appointment's payment
    /// deadline. Case payments are accepted while the case is pending or
    /// overdue and return it to ACTIVE.
    pub fn confirm_payment(&self, payment_id: Uuid) -> Result<Payment, LifecycleError> {
        let payment = self.commit("confirm_payment", |books, now| {
            let mut payment = books.payment(payment_id)?.clone();
            payment.status = payment.status.transition(PaymentStatus::Success)?;
            payment.paid_at = Some(now);

            match payment.target {
                PaymentTarget::Appointment(appointment_id) => {
                    let mut appointment = books.appointment(appointment_id)?.clone();
                    appointment.status = appointment.status.transition(AppointmentStatus::Confirmed)?;
                    if appointment.payment_deadline.is_some_and(|d| is_elapsed(d, now)) {
                        return Err(LifecycleError::DeadlinePassed(format!(
                            "payment window for appointment {appointment_id} has closed"
                        )));
                    }
                    appointment.payment_deadline = None;

                    Ok(Staged::new(payment.clone())
                        .payment(payment)
                        .appointment(appointment))
                }
                PaymentTarget::Case(case_id) => {
                    let mut case = books.case(case_id)?.clone();
                    case.status.ensure_open()?;

                    let paid = case
                        .paid_amount
                        .checked_add(payment.amount)
                        .filter(|paid| *paid <= case.total_fees)
                        .ok_or_else(|| {
                            LifecycleError::Validation(format!(
                                "payment of {} exceeds outstanding fees on case {case_id}",
                                payment.amount
                            ))
                        })?;
                    case.paid_amount = paid;

                    if case.status.awaits_payment() {
                        case.status = case.status.transition(CaseStatus::Active)?;
                        case.next_payment_deadline = None;
                    }
                    case.record(format!("Payment received: {}", payment.description), now);

                    Ok(Staged::new(payment.clone()).payment(payment).case(case))
                }
            }
        })?;

        info!(payment_id = %payment.id, amount = payment.amount, "payment confirmed");
        Ok(payment)
    }

    /// Marks a settled payment as refunded. Case `paid_amount` is not reduced.
    pub fn refund_payment(&self, payment_id: Uuid) -> Result<Payment, LifecycleError> {
        let payment = self.commit("refund_payment", |books, now| {
            let mut payment = books.payment(payment_id)?.clone();
            payment.status = payment.status.transition(PaymentStatus::Refunded)?;
            payment.refunded_at = Some(now);
            Ok(Staged::new(payment.clone()).payment(payment))
        })?;

        info!(payment_id = %payment.id, "payment refunded");
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LifecycleConfig;
    use crate::entities::{CaseDetails, ConsultationType, NewAppointment};

    fn setup() -> (Arc<ManualClock>, LifecycleEngine, Uuid) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()));
        let engine = LifecycleEngine::new(clock.clone(), LifecycleConfig::default());
        let a = engine
            .request_appointment(
                Uuid::new_v4(),
                NewAppointment {
                    lawyer_id: Uuid::new_v4(),
                    consultation_type: ConsultationType::Phone,
                    case_type: "Employment".into(),
                    description: "Wrongful dismissal".into(),
                    selected_date: NaiveDate::from_ymd_opt(2026, 6, 3).unwrap(),
                    selected_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    consultation_fee: 4000,
                },
            )
            .unwrap();
        (clock, engine, a.id)
    }

    #[test]
    fn confirm_moves_appointment_to_confirmed() {
        let (_clock, engine, id) = setup();
        let approval = engine.approve_appointment(id).unwrap();
        let paid = engine.confirm_payment(approval.payment.id).unwrap();

        assert_eq!(paid.status, PaymentStatus::Success);
        assert!(paid.paid_at.is_some());
        let snap = engine.snapshot();
        let a = &snap.appointments[&id];
        assert_eq!(a.status, AppointmentStatus::Confirmed);
        assert!(a.deadlines_consistent());
    }

    #[test]
    fn confirm_after_payment_window_is_deadline_passed() {
        let (clock, engine, id) = setup();
        let approval = engine.approve_appointment(id).unwrap();
        clock.advance(Duration::minutes(10));

        assert!(matches!(
            engine.confirm_payment(approval.payment.id),
            Err(LifecycleError::DeadlinePassed(_))
        ));
        assert_eq!(
            engine.snapshot().payments[&approval.payment.id].status,
            PaymentStatus::Pending
        );
    }

    #[test]
    fn confirm_twice_is_invalid_transition() {
        let (_clock, engine, id) = setup();
        let approval = engine.approve_appointment(id).unwrap();
        engine.confirm_payment(approval.payment.id).unwrap();
        assert!(matches!(
            engine.confirm_payment(approval.payment.id),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[test]
    fn refund_keeps_case_paid_amount() {
        let (_clock, engine, id) = setup();
        let approval = engine.approve_appointment(id).unwrap();
        engine.confirm_payment(approval.payment.id).unwrap();
        engine.complete_consultation(id).unwrap();
        let case = engine
            .start_case(
                id,
                CaseDetails {
                    title: "Dismissal claim".into(),
                    description: String::new(),
                    case_type: None,
                    total_fees: 10_000,
                },
            )
            .unwrap();
        let fee = engine.request_case_payment(case.id, 3000, "Retainer").unwrap();
        engine.confirm_payment(fee.id).unwrap();

        let refunded = engine.refund_payment(fee.id).unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(engine.snapshot().cases[&case.id].paid_amount, 3000);

        assert!(matches!(
            engine.refund_payment(fee.id),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[test]
    fn refund_of_pending_payment_is_invalid() {
        let (_clock, engine, id) = setup();
        let approval = engine.approve_appointment(id).unwrap();
        assert!(matches!(
            engine.refund_payment(approval.payment.id),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }
}
