//! Lifecycle engine: the single owner and mutator of appointments, cases and
//! payments.
//!
//! # Write boundary
//!
//! Every command runs inside [`LifecycleEngine::commit`], which holds the
//! writer lock for the whole validate-then-apply step. A command closure sees
//! the canonical collections read-only and returns the full set of entities it
//! wants to replace; nothing is written unless the closure returns `Ok`. Two
//! competing commands on the same entity are therefore serialized and the
//! second one re-validates against the first one's result.
//!
//! # Reads
//!
//! After each commit an immutable snapshot is published behind an `Arc`.
//! [`LifecycleEngine::snapshot`] only clones that `Arc`, so readers never wait
//! on command validation and never see a half-applied commit. Entities are
//! held behind `Arc` too: publishing copies map nodes and bumps reference
//! counts, and untouched entities are shared between snapshots.
//!
//! # Notifications
//!
//! Each commit is broadcast as one [`CommitBatch`] in commit order. The engine
//! performs no I/O; persistence and SSE consume the channel.

mod appointments;
mod cases;
mod payments;
mod sweep;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::LifecycleConfig;
use crate::entities::{Appointment, Case, Payment, PaymentTarget};
use crate::error::LifecycleError;
use crate::events::{CommitBatch, EngineEvent};
use crate::status::PaymentStatus;

pub use appointments::Approval;
pub use sweep::SweepReport;

const EVENT_BUS_CAPACITY: usize = 1024;

/// Ceiling for any single amount, in minor units. Keeps sums over a whole
/// book of payments far from `i64` overflow.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// The three canonical collections, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Collections {
    pub appointments: BTreeMap<Uuid, Arc<Appointment>>,
    pub cases: BTreeMap<Uuid, Arc<Case>>,
    pub payments: BTreeMap<Uuid, Arc<Payment>>,
}

impl Collections {
    pub fn appointment(&self, id: Uuid) -> Result<&Appointment, LifecycleError> {
        self.appointments
            .get(&id)
            .map(Arc::as_ref)
            .ok_or_else(|| LifecycleError::NotFound(format!("appointment {id} not found")))
    }

    pub fn case(&self, id: Uuid) -> Result<&Case, LifecycleError> {
        self.cases
            .get(&id)
            .map(Arc::as_ref)
            .ok_or_else(|| LifecycleError::NotFound(format!("case {id} not found")))
    }

    pub fn payment(&self, id: Uuid) -> Result<&Payment, LifecycleError> {
        self.payments
            .get(&id)
            .map(Arc::as_ref)
            .ok_or_else(|| LifecycleError::NotFound(format!("payment {id} not found")))
    }

    pub fn case_for_appointment(&self, appointment_id: Uuid) -> Option<&Case> {
        self.cases
            .values()
            .find(|c| c.appointment_id == appointment_id)
            .map(Arc::as_ref)
    }

    pub fn pending_payments_for(&self, target: PaymentTarget) -> impl Iterator<Item = &Payment> {
        self.payments
            .values()
            .filter(move |p| p.target == target && p.status == PaymentStatus::Pending)
            .map(Arc::as_ref)
    }

    pub(crate) fn apply(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Appointment(a) => {
                self.appointments.insert(a.id, Arc::clone(a));
            }
            EngineEvent::Case(c) => {
                self.cases.insert(c.id, Arc::clone(c));
            }
            EngineEvent::Payment(p) => {
                self.payments.insert(p.id, Arc::clone(p));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Staged
// ---------------------------------------------------------------------------

/// Entities a command wants to write, plus the value returned to the caller.
struct Staged<T> {
    changes: Vec<EngineEvent>,
    value: T,
}

impl<T> Staged<T> {
    fn new(value: T) -> Self {
        Self {
            changes: Vec::new(),
            value,
        }
    }

    fn appointment(mut self, a: Appointment) -> Self {
        self.changes.push(EngineEvent::Appointment(Arc::new(a)));
        self
    }

    fn case(mut self, c: Case) -> Self {
        self.changes.push(EngineEvent::Case(Arc::new(c)));
        self
    }

    fn payment(mut self, p: Payment) -> Self {
        self.changes.push(EngineEvent::Payment(Arc::new(p)));
        self
    }
}

// ---------------------------------------------------------------------------
// LifecycleEngine
// ---------------------------------------------------------------------------

pub struct LifecycleEngine {
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    books: Mutex<Collections>,
    published: RwLock<Arc<Collections>>,
    bus: broadcast::Sender<Arc<CommitBatch>>,
}

impl LifecycleEngine {
    pub fn new(clock: Arc<dyn Clock>, config: LifecycleConfig) -> Self {
        Self::with_collections(clock, config, Collections::default())
    }

    /// Start from collections loaded at the persistence boundary.
    pub fn with_collections(
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
        collections: Collections,
    ) -> Self {
        let (bus, _rx) = broadcast::channel(EVENT_BUS_CAPACITY);
        let published = Arc::new(collections.clone());
        Self {
            clock,
            config,
            books: Mutex::new(collections),
            published: RwLock::new(published),
            bus,
        }
    }

    pub fn snapshot(&self) -> Arc<Collections> {
        Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Post-commit hook: one batch per commit, in commit order.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CommitBatch>> {
        self.bus.subscribe()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    fn commit<T>(
        &self,
        op: &'static str,
        stage: impl FnOnce(&Collections, DateTime<Utc>) -> Result<Staged<T>, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        let mut books = self.books.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        let Staged { changes, value } = stage(&books, now)?;
        if changes.is_empty() {
            return Ok(value);
        }

        for change in &changes {
            books.apply(change);
        }
        *self.published.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(books.clone());

        let batch = Arc::new(CommitBatch { op, at: now, changes });

        // Sent under the writer lock so subscribers observe commit order.
        let _ = self.bus.send(batch);
        debug!(op, "committed");

        Ok(value)
    }
}

fn require_text(field: &str, value: &str) -> Result<String, LifecycleError> {
    let v = value.trim();
    if v.is_empty() {
        Err(LifecycleError::Validation(format!("{field} is required")))
    } else {
        Ok(v.to_string())
    }
}

fn require_positive(field: &str, value: i64) -> Result<i64, LifecycleError> {
    if value <= 0 {
        Err(LifecycleError::Validation(format!("{field} must be > 0")))
    } else if value > MAX_AMOUNT {
        Err(LifecycleError::Validation(format!("{field} must not exceed {MAX_AMOUNT}")))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    use super::*;
    use crate::clock::ManualClock;
    use crate::entities::{ConsultationType, NewAppointment};
    use crate::status::AppointmentStatus;

    fn booking() -> NewAppointment {
        NewAppointment {
            lawyer_id: Uuid::new_v4(),
            consultation_type: ConsultationType::Phone,
            case_type: "Estate".into(),
            description: "Will update".into(),
            selected_date: NaiveDate::from_ymd_opt(2026, 8, 2).unwrap(),
            selected_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            consultation_fee: 1500,
        }
    }

    #[test]
    fn publishing_shares_untouched_entities() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap()));
        let engine = LifecycleEngine::new(clock, LifecycleConfig::default());
        let ids: Vec<Uuid> = (0..50)
            .map(|_| engine.request_appointment(Uuid::new_v4(), booking()).unwrap().id)
            .collect();

        let before = engine.snapshot();
        engine.approve_appointment(ids[0]).unwrap();
        let after = engine.snapshot();

        assert!(!Arc::ptr_eq(&before.appointments[&ids[0]], &after.appointments[&ids[0]]));
        for id in &ids[1..] {
            assert!(Arc::ptr_eq(&before.appointments[id], &after.appointments[id]));
        }
        assert_eq!(
            before.appointments[&ids[0]].status,
            AppointmentStatus::PendingLawyerApproval
        );
    }

    #[test]
    fn one_batch_per_commit() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap()));
        let engine = LifecycleEngine::new(clock.clone(), LifecycleConfig::default());
        let mut rx = engine.subscribe();

        let a = engine.request_appointment(Uuid::new_v4(), booking()).unwrap();
        engine.approve_appointment(a.id).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(first.changes.len(), 1);
        assert_eq!(second.op, "approve_appointment");
        assert_eq!(second.at, clock.now());
        assert_eq!(
            second.changes.iter().map(EngineEvent::kind).collect::<Vec<_>>(),
            ["appointment", "payment"]
        );
    }

    #[test]
    fn amounts_are_bounded() {
        assert!(require_positive("fee", 1).is_ok());
        assert!(require_positive("fee", MAX_AMOUNT).is_ok());
        assert!(require_positive("fee", MAX_AMOUNT + 1).is_err());
        assert!(require_positive("fee", 0).is_err());
    }
}
