//! Daily budget ledger.
//!
//! All mutation goes through one mutex-guarded `Ledger`, so every
//! check-then-record is atomic with respect to every other caller, whatever
//! article or role it comes from.
//!
//! Calls normally go through two steps: `reserve` holds an upper bound on
//! the call's cost against the limit before the request is sent, and `settle`
//! swaps the hold for the backend-reported actual cost. `release` drops a
//! hold for an attempt that produced nothing billable. A settled call is
//! always recorded, since the backend has already billed it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::{debug, warn};

use newswire_types::article::UsageRecord;
use newswire_types::budget::{BudgetState, UsageSummary};
use newswire_types::error::BudgetError;
use newswire_types::event::PipelineEvent;
use newswire_types::llm::{ProviderProfile, Role};

use super::clock::{Clock, SystemClock};
use crate::event::bus::EventBus;

/// Spend fraction at which the once-per-day warning fires.
pub const WARNING_THRESHOLD: f64 = 0.9;

/// Absorbs float rounding so a call landing exactly on the limit fits.
const LIMIT_EPSILON: f64 = 1e-9;

/// A hold on part of the daily budget for one in-flight call.
///
/// Must be handed back through [`CostTracker::settle`] or
/// [`CostTracker::release`].
#[must_use = "a reservation holds budget until settled or released"]
#[derive(Debug, PartialEq)]
pub struct Reservation {
    provider: String,
    role: Role,
    amount_usd: f64,
}

impl Reservation {
    pub fn amount_usd(&self) -> f64 {
        self.amount_usd
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }
}

#[derive(Debug)]
struct Ledger {
    daily_limit_usd: f64,
    spent_today_usd: f64,
    reserved_usd: f64,
    day_boundary: NaiveDate,
    warned_today: bool,
    records: Vec<UsageRecord>,
}

impl Ledger {
    fn roll_over(&mut self, today: NaiveDate) {
        if today > self.day_boundary {
            debug!(
                from = %self.day_boundary,
                to = %today,
                spent_usd = self.spent_today_usd,
                "Budget day rolled over"
            );
            self.spent_today_usd = 0.0;
            self.day_boundary = today;
            self.warned_today = false;
        }
    }

    fn fits(&self, cost_usd: f64) -> bool {
        self.spent_today_usd + self.reserved_usd + cost_usd <= self.daily_limit_usd + LIMIT_EPSILON
    }

    fn exceeded(&self, requested_usd: f64) -> BudgetError {
        BudgetError::Exceeded {
            requested_usd,
            spent_usd: self.spent_today_usd,
            reserved_usd: self.reserved_usd,
            limit_usd: self.daily_limit_usd,
        }
    }

    /// Append a record; returns true when this record crossed the warning line.
    fn record(&mut self, record: UsageRecord) -> bool {
        let before = self.spent_today_usd;
        self.spent_today_usd += record.cost_usd;
        self.records.push(record);

        let line = self.daily_limit_usd * WARNING_THRESHOLD;
        if !self.warned_today && before < line && self.spent_today_usd >= line {
            self.warned_today = true;
            return true;
        }
        false
    }

    fn snapshot(&self) -> BudgetState {
        BudgetState {
            daily_limit_usd: self.daily_limit_usd,
            spent_today_usd: self.spent_today_usd,
            reserved_usd: self.reserved_usd,
            day_boundary: self.day_boundary,
        }
    }
}

pub struct CostTracker {
    profiles: HashMap<String, ProviderProfile>,
    ledger: Mutex<Ledger>,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl CostTracker {
    pub fn new(
        profiles: impl IntoIterator<Item = ProviderProfile>,
        daily_limit_usd: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        let ledger = Ledger {
            daily_limit_usd,
            spent_today_usd: 0.0,
            reserved_usd: 0.0,
            day_boundary: clock.today(),
            warned_today: false,
            records: Vec::new(),
        };
        Self {
            profiles,
            ledger: Mutex::new(ledger),
            clock,
            events: None,
        }
    }

    pub fn with_system_clock(
        profiles: impl IntoIterator<Item = ProviderProfile>,
        daily_limit_usd: f64,
    ) -> Self {
        Self::new(profiles, daily_limit_usd, Arc::new(SystemClock))
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Dollar cost of a call, from the static pricing table.
    ///
    /// Unknown providers are priced at the most expensive configured profile.
    pub fn estimate_cost(
        &self,
        provider: &str,
        _role: Role,
        input_tokens: u32,
        output_tokens: u32,
    ) -> f64 {
        match self.profiles.get(provider) {
            Some(profile) => profile.cost_usd(input_tokens, output_tokens),
            None => self
                .profiles
                .values()
                .map(|p| p.cost_usd(input_tokens, output_tokens))
                .fold(0.0, f64::max),
        }
    }

    /// Atomically check the limit and record the call.
    ///
    /// Of two concurrent calls that only fit one at a time, exactly one
    /// succeeds.
    pub fn try_reserve_and_record(
        &self,
        provider: &str,
        role: Role,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<UsageRecord, BudgetError> {
        let cost_usd = self.estimate_cost(provider, role, input_tokens, output_tokens);
        let now = self.clock.now();

        let mut ledger = self.ledger.lock().expect("budget ledger lock poisoned");
        ledger.roll_over(now.date_naive());
        if !ledger.fits(cost_usd) {
            let err = ledger.exceeded(cost_usd);
            drop(ledger);
            self.reject(provider, role, &err);
            return Err(err);
        }

        let record = UsageRecord {
            provider: provider.to_string(),
            role,
            input_tokens,
            output_tokens,
            cost_usd,
            timestamp: now,
        };
        let crossed = ledger.record(record.clone());
        let state = ledger.snapshot();
        drop(ledger);

        if crossed {
            self.warn_threshold(&state);
        }
        Ok(record)
    }

    /// Hold the estimated cost of a call before it is issued.
    ///
    /// Fails without side effects when spend plus outstanding holds plus
    /// this estimate would exceed the limit.
    pub fn reserve(
        &self,
        provider: &str,
        role: Role,
        est_input_tokens: u32,
        est_output_tokens: u32,
    ) -> Result<Reservation, BudgetError> {
        let amount_usd = self.estimate_cost(provider, role, est_input_tokens, est_output_tokens);

        let mut ledger = self.ledger.lock().expect("budget ledger lock poisoned");
        ledger.roll_over(self.clock.today());
        if !ledger.fits(amount_usd) {
            let err = ledger.exceeded(amount_usd);
            drop(ledger);
            self.reject(provider, role, &err);
            return Err(err);
        }
        ledger.reserved_usd += amount_usd;

        Ok(Reservation {
            provider: provider.to_string(),
            role,
            amount_usd,
        })
    }

    /// Replace a hold with the actual cost reported by the backend.
    pub fn settle(
        &self,
        reservation: Reservation,
        input_tokens: u32,
        output_tokens: u32,
    ) -> UsageRecord {
        let cost_usd = self.estimate_cost(
            &reservation.provider,
            reservation.role,
            input_tokens,
            output_tokens,
        );
        let now = self.clock.now();

        let mut ledger = self.ledger.lock().expect("budget ledger lock poisoned");
        ledger.roll_over(now.date_naive());
        ledger.reserved_usd = (ledger.reserved_usd - reservation.amount_usd).max(0.0);

        if cost_usd > reservation.amount_usd + LIMIT_EPSILON {
            warn!(
                provider = %reservation.provider,
                role = %reservation.role,
                estimated_usd = reservation.amount_usd,
                actual_usd = cost_usd,
                "Actual cost exceeded the reserved estimate"
            );
        }

        let record = UsageRecord {
            provider: reservation.provider,
            role: reservation.role,
            input_tokens,
            output_tokens,
            cost_usd,
            timestamp: now,
        };
        let crossed = ledger.record(record.clone());
        let state = ledger.snapshot();
        drop(ledger);

        if crossed {
            self.warn_threshold(&state);
        }
        record
    }

    /// Drop a hold for an attempt that produced nothing billable.
    pub fn release(&self, reservation: Reservation) {
        let mut ledger = self.ledger.lock().expect("budget ledger lock poisoned");
        ledger.reserved_usd = (ledger.reserved_usd - reservation.amount_usd).max(0.0);
    }

    pub fn budget_state(&self) -> BudgetState {
        let mut ledger = self.ledger.lock().expect("budget ledger lock poisoned");
        ledger.roll_over(self.clock.today());
        ledger.snapshot()
    }

    pub fn remaining_usd(&self) -> f64 {
        self.budget_state().remaining_usd()
    }

    /// Every call recorded by this process, oldest first.
    pub fn records(&self) -> Vec<UsageRecord> {
        self.ledger
            .lock()
            .expect("budget ledger lock poisoned")
            .records
            .clone()
    }

    pub fn summary(&self) -> UsageSummary {
        let ledger = self.ledger.lock().expect("budget ledger lock poisoned");
        let mut summary = UsageSummary::default();
        for record in &ledger.records {
            summary.total_requests += 1;
            summary.total_input_tokens += u64::from(record.input_tokens);
            summary.total_output_tokens += u64::from(record.output_tokens);
            summary.total_cost_usd += record.cost_usd;

            let entry = summary.by_provider.entry(record.provider.clone()).or_default();
            entry.requests += 1;
            entry.input_tokens += u64::from(record.input_tokens);
            entry.output_tokens += u64::from(record.output_tokens);
            entry.cost_usd += record.cost_usd;
        }
        summary
    }

    fn reject(&self, provider: &str, role: Role, err: &BudgetError) {
        warn!(provider, role = %role, error = %err, "Budget exceeded, call rejected");
        if let Some(events) = &self.events {
            events.publish(PipelineEvent::BudgetExceeded {
                role,
                provider: provider.to_string(),
                requested_usd: err.requested_usd(),
                remaining_usd: err.remaining_usd(),
            });
        }
    }

    fn warn_threshold(&self, state: &BudgetState) {
        warn!(
            spent_usd = state.spent_today_usd,
            limit_usd = state.daily_limit_usd,
            "Daily spend crossed {:.0}% of budget",
            WARNING_THRESHOLD * 100.0
        );
        if let Some(events) = &self.events {
            events.publish(PipelineEvent::BudgetWarning {
                spent_usd: state.spent_today_usd,
                limit_usd: state.daily_limit_usd,
            });
        }
    }
}

impl std::fmt::Debug for CostTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostTracker")
            .field("providers", &self.profiles.keys().collect::<Vec<_>>())
            .field("state", &self.budget_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::clock::ManualClock;
    use crate::event::bus::drain;
    use crate::llm::testing::test_profile;
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::Barrier;

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ))
    }

    /// test_profile prices input at $1 per million tokens.
    fn tokens_for(usd: f64) -> u32 {
        (usd * 1_000_000.0).round() as u32
    }

    fn tracker(limit: f64, clock: Arc<ManualClock>) -> CostTracker {
        CostTracker::new([test_profile("p1"), test_profile("p2")], limit, clock)
    }

    #[test]
    fn estimate_cost_is_pure_table_lookup() {
        let tracker = tracker(5.0, manual_clock());
        let cost = tracker.estimate_cost("p1", Role::Summarize, 1_000_000, 500_000);
        assert!((cost - 2.0).abs() < 1e-12, "got {cost}");
        assert!(tracker.records().is_empty());
    }

    #[test]
    fn unknown_provider_priced_conservatively() {
        let mut pricey = test_profile("pricey");
        pricey.input_price_per_million = 10.0;
        let tracker = CostTracker::new([test_profile("p1"), pricey], 5.0, manual_clock());
        let cost = tracker.estimate_cost("mystery", Role::Sentiment, 1_000_000, 0);
        assert!((cost - 10.0).abs() < 1e-12);
    }

    #[test]
    fn records_within_budget() {
        let tracker = tracker(1.0, manual_clock());
        let record = tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(0.4), 0)
            .unwrap();
        assert!((record.cost_usd - 0.4).abs() < 1e-9);
        assert_eq!(record.role, Role::Summarize);
        assert!((tracker.budget_state().spent_today_usd - 0.4).abs() < 1e-9);
    }

    #[test]
    fn rejects_call_that_would_exceed_limit() {
        let tracker = tracker(1.0, manual_clock());
        tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(0.7), 0)
            .unwrap();
        let err = tracker
            .try_reserve_and_record("p1", Role::Sentiment, tokens_for(0.4), 0)
            .unwrap_err();
        assert!((err.requested_usd() - 0.4).abs() < 1e-9);
        assert_eq!(tracker.records().len(), 1);
    }

    #[test]
    fn call_landing_exactly_on_limit_fits() {
        let tracker = tracker(1.0, manual_clock());
        tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(1.0), 0)
            .unwrap();
        assert!(tracker.remaining_usd() < 1e-9);
    }

    #[test]
    fn concurrent_pair_exactly_one_succeeds() {
        for _ in 0..50 {
            let tracker = Arc::new(tracker(1.0, manual_clock()));
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let tracker = Arc::clone(&tracker);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        tracker
                            .try_reserve_and_record("p1", Role::Summarize, tokens_for(0.6), 0)
                            .is_ok()
                    })
                })
                .collect();
            let successes = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(successes, 1);
        }
    }

    #[tokio::test]
    async fn many_concurrent_callers_never_overspend() {
        let tracker = Arc::new(tracker(5.0, manual_clock()));
        let mut handles = Vec::new();
        for i in 0..100 {
            let tracker = Arc::clone(&tracker);
            let role = if i % 2 == 0 { Role::Summarize } else { Role::Sentiment };
            handles.push(tokio::spawn(async move {
                tracker.try_reserve_and_record("p2", role, tokens_for(0.07), 0)
            }));
        }
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }

        let recorded: f64 = tracker.records().iter().map(|r| r.cost_usd).sum();
        assert!(recorded <= 5.0 + 1e-9, "recorded {recorded}");
        assert_eq!(ok, 71);
    }

    #[test]
    fn day_rollover_resets_spend() {
        let clock = manual_clock();
        let tracker = tracker(1.0, Arc::clone(&clock));
        tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(1.0), 0)
            .unwrap();
        assert!(tracker
            .try_reserve_and_record("p1", Role::Summarize, 1, 0)
            .is_err());

        clock.advance(TimeDelta::days(1));

        let record = tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(0.9), 0)
            .unwrap();
        let state = tracker.budget_state();
        assert!((state.spent_today_usd - record.cost_usd).abs() < 1e-12);
        assert_eq!(state.day_boundary, clock.today());
        // History survives the reset.
        assert_eq!(tracker.records().len(), 2);
    }

    #[test]
    fn reservation_blocks_concurrent_overcommit() {
        let tracker = tracker(1.0, manual_clock());
        let held = tracker
            .reserve("p1", Role::Summarize, tokens_for(0.6), 0)
            .unwrap();
        assert!(tracker
            .reserve("p2", Role::Sentiment, tokens_for(0.6), 0)
            .is_err());

        tracker.release(held);
        let again = tracker
            .reserve("p2", Role::Sentiment, tokens_for(0.6), 0)
            .unwrap();
        assert!((tracker.budget_state().reserved_usd - 0.6).abs() < 1e-9);
        tracker.release(again);
        assert_eq!(tracker.budget_state().reserved_usd, 0.0);
        assert!(tracker.records().is_empty());
    }

    #[test]
    fn settle_records_actual_usage_and_frees_hold() {
        let tracker = tracker(1.0, manual_clock());
        let held = tracker
            .reserve("p1", Role::Summarize, tokens_for(0.5), 0)
            .unwrap();
        let record = tracker.settle(held, tokens_for(0.2), 0);

        assert!((record.cost_usd - 0.2).abs() < 1e-9);
        let state = tracker.budget_state();
        assert_eq!(state.reserved_usd, 0.0);
        assert!((state.spent_today_usd - 0.2).abs() < 1e-9);
        assert_eq!(tracker.records(), vec![record]);
    }

    #[test]
    fn warning_fires_once_per_day() {
        let clock = manual_clock();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let tracker = tracker(1.0, Arc::clone(&clock)).with_event_bus(bus);

        tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(0.5), 0)
            .unwrap();
        assert!(drain(&mut rx).is_empty());

        tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(0.45), 0)
            .unwrap();
        tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(0.03), 0)
            .unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PipelineEvent::BudgetWarning { .. }));

        clock.advance(TimeDelta::days(1));
        tracker
            .try_reserve_and_record("p1", Role::Summarize, tokens_for(0.95), 0)
            .unwrap();
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn rejection_publishes_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let tracker = tracker(0.1, manual_clock()).with_event_bus(bus);

        assert!(tracker
            .reserve("p2", Role::Sentiment, tokens_for(0.2), 0)
            .is_err());
        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [PipelineEvent::BudgetExceeded { role: Role::Sentiment, provider, .. }] if provider == "p2"
        ));
    }

    #[test]
    fn summary_totals_by_provider() {
        let tracker = tracker(5.0, manual_clock());
        tracker.try_reserve_and_record("p1", Role::Summarize, 100, 20).unwrap();
        tracker.try_reserve_and_record("p1", Role::Sentiment, 50, 10).unwrap();
        tracker.try_reserve_and_record("p2", Role::Summarize, 10, 5).unwrap();

        let summary = tracker.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.total_input_tokens, 160);
        assert_eq!(summary.total_output_tokens, 35);
        assert_eq!(summary.by_provider["p1"].requests, 2);
        assert_eq!(summary.by_provider["p2"].output_tokens, 5);
    }
}
