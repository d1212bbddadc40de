//! Read-only projections over an engine snapshot.
//!
//! Every function here is a deterministic function of its arguments: the
//! snapshot, the actor, and the instants passed in. Nothing is cached.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::engine::Collections;
use crate::entities::{Appointment, Case, Payment, PaymentTarget};
use crate::models::ActorRole;
use crate::schedule::{time_remaining, urgency_level, TimeRemaining, Urgency};
use crate::status::{AppointmentStatus, CaseStatus, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    fn owns_appointment(&self, a: &Appointment) -> bool {
        match self.role {
            ActorRole::Client => a.client_id == self.id,
            ActorRole::Lawyer => a.lawyer_id == self.id,
        }
    }

    fn owns_case(&self, c: &Case) -> bool {
        match self.role {
            ActorRole::Client => c.client_id == self.id,
            ActorRole::Lawyer => c.lawyer_id == self.id,
        }
    }
}

/* -------------------------
   Actor slices
--------------------------*/

pub fn appointments_for(books: &Collections, actor: Actor) -> Vec<Appointment> {
    let mut out: Vec<Appointment> = books
        .appointments
        .values()
        .filter(|a| actor.owns_appointment(a))
        .map(|a| Appointment::clone(a))
        .collect();
    out.sort_by_key(|a| (a.created_at, a.id));
    out
}

pub fn cases_for(books: &Collections, actor: Actor) -> Vec<Case> {
    let mut out: Vec<Case> = books
        .cases
        .values()
        .filter(|c| actor.owns_case(c))
        .map(|c| Case::clone(c))
        .collect();
    out.sort_by_key(|c| (c.created_at, c.id));
    out
}

/// Payments reachable through the actor's appointments and cases.
pub fn payments_for(books: &Collections, actor: Actor) -> Vec<Payment> {
    let mut out: Vec<Payment> = reachable_payments(books, actor).cloned().collect();
    out.sort_by_key(|p| (p.created_at, p.id));
    out
}

fn reachable_payments(books: &Collections, actor: Actor) -> impl Iterator<Item = &Payment> {
    let appointments: HashSet<Uuid> = books
        .appointments
        .values()
        .filter(|a| actor.owns_appointment(a))
        .map(|a| a.id)
        .collect();
    let cases: HashSet<Uuid> = books
        .cases
        .values()
        .filter(|c| actor.owns_case(c))
        .map(|c| c.id)
        .collect();

    books
        .payments
        .values()
        .map(Arc::as_ref)
        .filter(move |p| match p.target {
            PaymentTarget::Appointment(id) => appointments.contains(&id),
            PaymentTarget::Case(id) => cases.contains(&id),
        })
}

/* -------------------------
   Counts
--------------------------*/

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub pending_requests: usize,
    pub awaiting_payment: usize,
    pub confirmed_appointments: usize,
    pub completed_appointments: usize,
    pub active_cases: usize,
    pub payment_pending_cases: usize,
    pub overdue_cases: usize,
    pub total_earned: i64,
}

pub fn dashboard_counts(books: &Collections, actor: Actor) -> DashboardCounts {
    let mut counts = DashboardCounts::default();

    for a in books.appointments.values().filter(|a| actor.owns_appointment(a)) {
        match a.status {
            AppointmentStatus::PendingLawyerApproval => counts.pending_requests += 1,
            AppointmentStatus::ApprovedAwaitingPayment => counts.awaiting_payment += 1,
            AppointmentStatus::Confirmed => counts.confirmed_appointments += 1,
            AppointmentStatus::Completed => counts.completed_appointments += 1,
            _ => {}
        }
    }

    for c in books.cases.values().filter(|c| actor.owns_case(c)) {
        match c.status {
            CaseStatus::Active => counts.active_cases += 1,
            CaseStatus::PaymentPending => counts.payment_pending_cases += 1,
            CaseStatus::PaymentOverdue => counts.overdue_cases += 1,
            _ => {}
        }
    }

    counts.total_earned = reachable_payments(books, actor)
        .filter(|p| p.status == PaymentStatus::Success)
        .fold(0i64, |total, p| total.saturating_add(p.amount));

    counts
}

/// CONFIRMED appointments scheduled on `today`, earliest slot first.
///
/// `today` is the calendar date in the actor's own time zone.
pub fn todays_appointments(books: &Collections, actor: Actor, today: NaiveDate) -> Vec<Appointment> {
    let mut out: Vec<Appointment> = books
        .appointments
        .values()
        .filter(|a| {
            actor.owns_appointment(a)
                && a.status == AppointmentStatus::Confirmed
                && a.selected_date == today
        })
        .map(|a| Appointment::clone(a))
        .collect();
    out.sort_by_key(|a| (a.selected_time, a.id));
    out
}

/* -------------------------
   Deadline board
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineKind {
    LawyerApproval,
    ClientPayment,
    CasePayment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadlineEntry {
    pub kind: DeadlineKind,
    pub entity_id: Uuid,
    pub deadline: DateTime<Utc>,
    pub remaining: TimeRemaining,
    pub urgency: Urgency,
}

fn entry(
    kind: DeadlineKind,
    entity_id: Uuid,
    deadline: DateTime<Utc>,
    total: Duration,
    now: DateTime<Utc>,
    cfg: &LifecycleConfig,
) -> DeadlineEntry {
    DeadlineEntry {
        kind,
        entity_id,
        deadline,
        remaining: time_remaining(deadline, now),
        urgency: urgency_level(deadline, total, now, &cfg.urgency),
    }
}

/// Countdown and urgency for one appointment's live deadline, if any.
///
/// Urgency is measured against the window length stored on the entity, so a
/// config change never rescales deadlines that are already running.
pub fn appointment_deadline(a: &Appointment, now: DateTime<Utc>, cfg: &LifecycleConfig) -> Option<DeadlineEntry> {
    if let Some(d) = a.approval_deadline {
        let total = Duration::seconds(a.approval_duration_secs);
        return Some(entry(DeadlineKind::LawyerApproval, a.id, d, total, now, cfg));
    }
    a.payment_deadline.map(|d| {
        let total = Duration::seconds(a.payment_duration_secs);
        entry(DeadlineKind::ClientPayment, a.id, d, total, now, cfg)
    })
}

pub fn case_deadline(c: &Case, now: DateTime<Utc>, cfg: &LifecycleConfig) -> Option<DeadlineEntry> {
    c.next_payment_deadline.map(|d| {
        let total = Duration::seconds(c.payment_duration_secs);
        entry(DeadlineKind::CasePayment, c.id, d, total, now, cfg)
    })
}

/// Every live deadline visible to the actor, soonest first.
pub fn deadline_board(
    books: &Collections,
    actor: Actor,
    now: DateTime<Utc>,
    cfg: &LifecycleConfig,
) -> Vec<DeadlineEntry> {
    let appointments = books
        .appointments
        .values()
        .filter(|a| actor.owns_appointment(a))
        .filter_map(|a| appointment_deadline(a, now, cfg));
    let cases = books
        .cases
        .values()
        .filter(|c| actor.owns_case(c))
        .filter_map(|c| case_deadline(c, now, cfg));

    let mut out: Vec<DeadlineEntry> = appointments.chain(cases).collect();
    out.sort_by_key(|e| (e.deadline, e.entity_id));
    out
}

/* -------------------------
   Dashboard
--------------------------*/

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub today: NaiveDate,
    pub counts: DashboardCounts,
    pub todays_appointments: Vec<Appointment>,
    pub deadlines: Vec<DeadlineEntry>,
}

pub fn build_dashboard(
    books: &Collections,
    actor: Actor,
    today: NaiveDate,
    now: DateTime<Utc>,
    cfg: &LifecycleConfig,
) -> Dashboard {
    Dashboard {
        today,
        counts: dashboard_counts(books, actor),
        todays_appointments: todays_appointments(books, actor, today),
        deadlines: deadline_board(books, actor, now, cfg),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveTime, TimeZone};

    use super::*;
    use crate::clock::ManualClock;
    use crate::schedule::{TimeUnit, Window};
    use crate::engine::LifecycleEngine;
    use crate::entities::{CaseDetails, ConsultationType, NewAppointment};

    struct World {
        clock: Arc<ManualClock>,
        engine: LifecycleEngine,
        lawyer: Actor,
        client: Actor,
        other_lawyer: Actor,
    }

    fn book(w: &World, lawyer: Uuid, date: NaiveDate, hour: u32, fee: i64) -> Appointment {
        w.engine
            .request_appointment(
                w.client.id,
                NewAppointment {
                    lawyer_id: lawyer,
                    consultation_type: ConsultationType::Video,
                    case_type: "Contract".into(),
                    description: "Lease review".into(),
                    selected_date: date,
                    selected_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                    consultation_fee: fee,
                },
            )
            .unwrap()
    }

    fn world() -> World {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 9, 14, 8, 0, 0).unwrap()));
        World {
            engine: LifecycleEngine::new(clock.clone(), LifecycleConfig::default()),
            clock,
            lawyer: Actor { id: Uuid::new_v4(), role: ActorRole::Lawyer },
            client: Actor { id: Uuid::new_v4(), role: ActorRole::Client },
            other_lawyer: Actor { id: Uuid::new_v4(), role: ActorRole::Lawyer },
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 14).unwrap()
    }

    #[test]
    fn counts_and_earnings_are_scoped_to_actor() {
        let w = world();
        let pending = book(&w, w.lawyer.id, today(), 9, 1000);
        let confirmed = book(&w, w.lawyer.id, today(), 15, 2000);
        let elsewhere = book(&w, w.other_lawyer.id, today(), 10, 7000);
        let _ = pending;

        let approval = w.engine.approve_appointment(confirmed.id).unwrap();
        w.engine.confirm_payment(approval.payment.id).unwrap();
        let other = w.engine.approve_appointment(elsewhere.id).unwrap();
        w.engine.confirm_payment(other.payment.id).unwrap();

        let snap = w.engine.snapshot();
        let counts = dashboard_counts(&snap, w.lawyer);
        assert_eq!(counts.pending_requests, 1);
        assert_eq!(counts.confirmed_appointments, 1);
        assert_eq!(counts.total_earned, 2000);

        let client_counts = dashboard_counts(&snap, w.client);
        assert_eq!(client_counts.confirmed_appointments, 2);
        assert_eq!(client_counts.total_earned, 9000);

        assert_eq!(payments_for(&snap, w.lawyer).len(), 1);
        assert_eq!(appointments_for(&snap, w.other_lawyer).len(), 1);
    }

    #[test]
    fn todays_schedule_lists_confirmed_only_in_slot_order() {
        let w = world();
        let late = book(&w, w.lawyer.id, today(), 16, 1000);
        let early = book(&w, w.lawyer.id, today(), 9, 1000);
        let tomorrow = book(&w, w.lawyer.id, today().succ_opt().unwrap(), 9, 1000);
        let unpaid = book(&w, w.lawyer.id, today(), 11, 1000);

        for a in [&late, &early, &tomorrow] {
            let approval = w.engine.approve_appointment(a.id).unwrap();
            w.engine.confirm_payment(approval.payment.id).unwrap();
        }
        w.engine.approve_appointment(unpaid.id).unwrap();

        let snap = w.engine.snapshot();
        let ids: Vec<Uuid> = todays_appointments(&snap, w.lawyer, today())
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn deadline_board_orders_soonest_first() {
        let w = world();
        let waiting = book(&w, w.lawyer.id, today(), 9, 1000);
        let approved = book(&w, w.lawyer.id, today(), 10, 1000);
        w.engine.approve_appointment(approved.id).unwrap();

        let snap = w.engine.snapshot();
        let board = deadline_board(&snap, w.lawyer, w.engine.now(), w.engine.config());
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].entity_id, approved.id);
        assert_eq!(board[0].kind, DeadlineKind::ClientPayment);
        assert_eq!(board[1].entity_id, waiting.id);
        assert_eq!(board[1].urgency, Urgency::Normal);
        assert!(deadline_board(&snap, w.other_lawyer, w.engine.now(), w.engine.config()).is_empty());
    }

    #[test]
    fn case_payments_are_reachable_through_cases() {
        let w = world();
        let a = book(&w, w.lawyer.id, today(), 9, 1000);
        let approval = w.engine.approve_appointment(a.id).unwrap();
        w.engine.confirm_payment(approval.payment.id).unwrap();
        w.engine.complete_consultation(a.id).unwrap();
        let case = w
            .engine
            .start_case(
                a.id,
                CaseDetails {
                    title: "Lease dispute".into(),
                    description: String::new(),
                    case_type: None,
                    total_fees: 20_000,
                },
            )
            .unwrap();
        w.engine.request_case_payment(case.id, 5_000, "Retainer").unwrap();

        let snap = w.engine.snapshot();
        assert_eq!(payments_for(&snap, w.client).len(), 2);
        let counts = dashboard_counts(&snap, w.lawyer);
        assert_eq!(counts.payment_pending_cases, 1);
        assert_eq!(counts.completed_appointments, 1);
        assert_eq!(counts.total_earned, 1000);
        assert_eq!(cases_for(&snap, w.client).len(), 1);
    }

    #[test]
    fn views_are_deterministic() {
        let w = world();
        book(&w, w.lawyer.id, today(), 9, 1000);
        book(&w, w.lawyer.id, today(), 10, 1000);
        let snap = w.engine.snapshot();
        let now = w.engine.now();
        let first = build_dashboard(&snap, w.lawyer, today(), now, w.engine.config());
        let second = build_dashboard(&snap, w.lawyer, today(), now, w.engine.config());
        assert_eq!(first.counts, second.counts);
        assert_eq!(first.deadlines, second.deadlines);
    }

    #[test]
    fn urgency_follows_the_window_the_deadline_was_cut_from() {
        let w = world();
        let a = book(&w, w.lawyer.id, today(), 9, 1000);
        let approved = w.engine.approve_appointment(a.id).unwrap().appointment;
        assert_eq!(approved.payment_duration_secs, 600);

        let mut widened = *w.engine.config();
        widened.payment_window = Window::new(2, TimeUnit::Days);

        let fresh = appointment_deadline(&approved, w.engine.now(), &widened).unwrap();
        assert_eq!(fresh.urgency, Urgency::Normal);

        w.clock.advance(Duration::minutes(8));
        let late = appointment_deadline(&approved, w.engine.now(), &widened).unwrap();
        assert_eq!(late.urgency, Urgency::Warning);
        assert_eq!(late.remaining.minutes, 2);
    }

    #[test]
    fn case_urgency_uses_stored_window() {
        let w = world();
        let a = book(&w, w.lawyer.id, today(), 9, 1000);
        let approval = w.engine.approve_appointment(a.id).unwrap();
        w.engine.confirm_payment(approval.payment.id).unwrap();
        w.engine.complete_consultation(a.id).unwrap();
        let case = w
            .engine
            .start_case(
                a.id,
                CaseDetails {
                    title: "Lease dispute".into(),
                    description: String::new(),
                    case_type: None,
                    total_fees: 20_000,
                },
            )
            .unwrap();
        w.engine.request_case_payment(case.id, 5_000, "Retainer").unwrap();

        let mut widened = *w.engine.config();
        widened.case_payment_window = Window::new(365, TimeUnit::Days);

        let snap = w.engine.snapshot();
        let billed = &snap.cases[&case.id];
        assert_eq!(billed.payment_duration_secs, 7 * 24 * 3600);
        let entry = case_deadline(billed, w.engine.now(), &widened).unwrap();
        assert_eq!(entry.urgency, Urgency::Normal);
    }

    #[test]
    fn total_earned_saturates() {
        let w = world();
        let first = book(&w, w.lawyer.id, today(), 9, 1000);
        let second = book(&w, w.lawyer.id, today(), 10, 1000);
        for a in [&first, &second] {
            let approval = w.engine.approve_appointment(a.id).unwrap();
            w.engine.confirm_payment(approval.payment.id).unwrap();
        }

        let mut books = Collections::clone(&w.engine.snapshot());
        for payment in books.payments.values_mut() {
            Arc::make_mut(payment).amount = i64::MAX / 2 + 1;
        }

        let counts = dashboard_counts(&books, w.lawyer);
        assert_eq!(counts.total_earned, i64::MAX);
    }
}
