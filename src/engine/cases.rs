use tracing::info;
use uuid::Uuid;

use super::{require_positive, require_text, LifecycleEngine, Staged, MAX_AMOUNT};
use crate::entities::{Case, CaseDetails, CaseDocument, CaseMessage, NewDocument, Payment, PaymentTarget};
use crate::error::LifecycleError;
use crate::status::{AppointmentStatus, CaseStatus, PaymentStatus};

impl LifecycleEngine {
    /// Opens a case from a completed consultation. One case per appointment.
    pub fn start_case(&self, appointment_id: Uuid, details: CaseDetails) -> Result<Case, LifecycleError> {
        let title = require_text("title", &details.title)?;
        if !(0..=MAX_AMOUNT).contains(&details.total_fees) {
            return Err(LifecycleError::Validation(format!(
                "total_fees must be between 0 and {MAX_AMOUNT}"
            )));
        }

        let case = self.commit("start_case", |books, now| {
            let appointment = books.appointment(appointment_id)?;
            if appointment.status != AppointmentStatus::Completed {
                return Err(LifecycleError::InvalidTransition(format!(
                    "appointment {appointment_id} is {} and cannot open a case",
                    appointment.status
                )));
            }
            if let Some(existing) = books.case_for_appointment(appointment_id) {
                return Err(LifecycleError::DuplicateCase(format!(
                    "appointment {appointment_id} already converted to case {}",
                    existing.id
                )));
            }

            let case_type = details
                .case_type
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(&appointment.case_type)
                .to_string();

            let mut case = Case {
                id: Uuid::new_v4(),
                appointment_id,
                client_id: appointment.client_id,
                lawyer_id: appointment.lawyer_id,
                title,
                description: details.description.trim().to_string(),
                case_type,
                status: CaseStatus::Active,
                total_fees: details.total_fees,
                paid_amount: 0,
                progress: 0,
                documents: Vec::new(),
                messages: Vec::new(),
                timeline: Vec::new(),
                next_payment_deadline: None,
                payment_duration_secs: 0,
                created_at: now,
            };
            case.record("Case opened", now);

            Ok(Staged::new(case.clone()).case(case))
        })?;

        info!(case_id = %case.id, appointment_id = %appointment_id, "case started");
        Ok(case)
    }

    /// Lawyer bills the client. Only one request may be outstanding: the case
    /// must be ACTIVE, and the amount must fit within the unpaid fees.
    pub fn request_case_payment(
        &self,
        case_id: Uuid,
        amount: i64,
        description: &str,
    ) -> Result<Payment, LifecycleError> {
        let amount = require_positive("amount", amount)?;
        let description = require_text("description", description)?;
        let window = self.config.case_payment_window;

        let payment = self.commit("request_case_payment", |books, now| {
            let mut case = books.case(case_id)?.clone();
            case.status = case.status.transition(CaseStatus::PaymentPending)?;
            if amount > case.outstanding_fees() {
                return Err(LifecycleError::Validation(format!(
                    "amount {amount} exceeds outstanding fees {}",
                    case.outstanding_fees()
                )));
            }
            case.next_payment_deadline = Some(window.deadline_from(now)?);
            case.payment_duration_secs = window.as_duration().num_seconds();
            case.record(format!("Payment requested: {description}"), now);

            let payment = Payment::pending(PaymentTarget::Case(case_id), amount, description, now);
            Ok(Staged::new(payment.clone()).payment(payment).case(case))
        })?;

        info!(case_id = %case_id, payment_id = %payment.id, amount, "case payment requested");
        Ok(payment)
    }

    pub fn close_case(&self, case_id: Uuid) -> Result<Case, LifecycleError> {
        let case = self.commit("close_case", |books, now| {
            let mut case = books.case(case_id)?.clone();
            case.status = case.status.transition(CaseStatus::ClosedByLawyer)?;
            case.progress = 100;
            case.record("Case closed by lawyer", now);
            Ok(Staged::new(case.clone()).case(case))
        })?;

        info!(case_id = %case_id, "case closed");
        Ok(case)
    }

    /// Ends the engagement from any live status. Outstanding case payments are
    /// voided as FAILED.
    pub fn terminate_case(&self, case_id: Uuid, reason: &str) -> Result<Case, LifecycleError> {
        let reason = require_text("reason", reason)?;

        let case = self.commit("terminate_case", |books, now| {
            let mut case = books.case(case_id)?.clone();
            case.status = case.status.transition(CaseStatus::Terminated)?;
            case.next_payment_deadline = None;
            case.record(format!("Case terminated: {reason}"), now);

            let mut staged = Staged::new(case.clone()).case(case);
            for pending in books.pending_payments_for(PaymentTarget::Case(case_id)) {
                let mut voided = pending.clone();
                voided.status = voided.status.transition(PaymentStatus::Failed)?;
                staged = staged.payment(voided);
            }
            Ok(staged)
        })?;

        info!(case_id = %case_id, "case terminated");
        Ok(case)
    }

    /// Client ends an ACTIVE case with nothing outstanding.
    pub fn end_case_by_client(&self, case_id: Uuid, reason: &str) -> Result<Case, LifecycleError> {
        let reason = reason.trim();

        let case = self.commit("end_case_by_client", |books, now| {
            let mut case = books.case(case_id)?.clone();
            case.status = case.status.transition(CaseStatus::EndedByClient)?;
            let event = if reason.is_empty() {
                "Case ended by client".to_string()
            } else {
                format!("Case ended by client: {reason}")
            };
            case.record(event, now);
            Ok(Staged::new(case.clone()).case(case))
        })?;

        info!(case_id = %case_id, "case ended by client");
        Ok(case)
    }

    pub fn update_case_progress(&self, case_id: Uuid, progress: u8) -> Result<Case, LifecycleError> {
        if progress > 100 {
            return Err(LifecycleError::Validation("progress must be between 0 and 100".into()));
        }

        self.commit("update_case_progress", |books, now| {
            let mut case = books.case(case_id)?.clone();
            case.status.ensure_open()?;
            case.progress = progress;
            case.record(format!("Progress updated to {progress}%"), now);
            Ok(Staged::new(case.clone()).case(case))
        })
    }

    pub fn add_document_to_case(
        &self,
        case_id: Uuid,
        uploaded_by: Uuid,
        doc: NewDocument,
    ) -> Result<Case, LifecycleError> {
        let name = require_text("name", &doc.name)?;

        self.commit("add_document_to_case", |books, now| {
            let mut case = books.case(case_id)?.clone();
            case.status.ensure_open()?;
            case.documents.push(CaseDocument {
                id: Uuid::new_v4(),
                name,
                url: doc.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
                uploaded_by,
                uploaded_at: now,
            });
            Ok(Staged::new(case.clone()).case(case))
        })
    }

    pub fn remove_document_from_case(&self, case_id: Uuid, document_id: Uuid) -> Result<Case, LifecycleError> {
        self.commit("remove_document_from_case", |books, _now| {
            let mut case = books.case(case_id)?.clone();
            case.status.ensure_open()?;
            let before = case.documents.len();
            case.documents.retain(|d| d.id != document_id);
            if case.documents.len() == before {
                return Err(LifecycleError::NotFound(format!(
                    "document {document_id} not found on case {case_id}"
                )));
            }
            Ok(Staged::new(case.clone()).case(case))
        })
    }

    pub fn add_message_to_case(&self, case_id: Uuid, sender_id: Uuid, body: &str) -> Result<Case, LifecycleError> {
        let body = require_text("body", body)?;

        self.commit("add_message_to_case", |books, now| {
            let mut case = books.case(case_id)?.clone();
            case.status.ensure_open()?;
            case.messages.push(CaseMessage {
                id: Uuid::new_v4(),
                sender_id,
                body,
                sent_at: now,
            });
            Ok(Staged::new(case.clone()).case(case))
        })
    }
}
