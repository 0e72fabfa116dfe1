//! Periodic poll loop for the selected unit (or the fleet aggregate).
//!
//! One task per selection. Selecting again replaces the task; the old task is
//! aborted and its generation retired, so a cycle that was mid-fetch never
//! reports. Cycles never overlap: the next tick is awaited only after the
//! previous cycle has reported.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::demand::DemandSource;
use crate::history::{Fetcher, PowerLogSink};
use crate::model::{PollResult, PowerLogEntry, Selection};
use crate::power::estimate_from_series;
use crate::registry::UnitRegistry;
use crate::report::Reporter;
use crate::status::Classifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Scheduled,
}

/// Collaborators shared by every cycle.
#[derive(Clone)]
pub struct PollContext {
    pub fetcher: Fetcher,
    pub demand: Arc<dyn DemandSource>,
    pub power_log: Arc<dyn PowerLogSink>,
    pub registry: Arc<UnitRegistry>,
    pub classifier: Classifier,
    pub reporter: Arc<dyn Reporter>,
    pub interval: Duration,
}

struct Shared {
    generation: u64,
    state: PollState,
    selection: Option<Selection>,
}

pub struct Aggregator {
    ctx: PollContext,
    shared: Arc<Mutex<Shared>>,
    task: Option<JoinHandle<()>>,
}

impl Aggregator {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx,
            shared: Arc::new(Mutex::new(Shared {
                generation: 0,
                state: PollState::Idle,
                selection: None,
            })),
            task: None,
        }
    }

    /// Start polling `selection`, replacing whatever was being polled.
    /// The first cycle runs immediately.
    pub fn select(&mut self, selection: Selection) {
        self.retire();
        let generation = {
            let mut shared = lock(&self.shared);
            shared.selection = Some(selection.clone());
            shared.state = PollState::Polling;
            shared.generation
        };
        info!(selection = %selection, interval = ?self.ctx.interval, "polling started");
        self.task = Some(tokio::spawn(run(
            self.ctx.clone(),
            self.shared.clone(),
            selection,
            generation,
        )));
    }

    /// Stop polling. Any in-flight cycle is discarded.
    pub fn stop(&mut self) {
        if self.retire() {
            info!("polling stopped");
        }
    }

    pub fn state(&self) -> PollState {
        lock(&self.shared).state
    }

    pub fn selection(&self) -> Option<Selection> {
        lock(&self.shared).selection.clone()
    }

    fn retire(&mut self) -> bool {
        {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.state = PollState::Idle;
            shared.selection = None;
        }
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.retire();
    }
}

async fn run(ctx: PollContext, shared: Arc<Mutex<Shared>>, selection: Selection, generation: u64) {
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        // first tick completes immediately
        ticker.tick().await;
        if !transition(&shared, generation, PollState::Polling) {
            return;
        }
        let outcome = cycle(&ctx, &selection).await;

        // Report under the lock so a concurrent `select` either sees this
        // result delivered or suppresses it, power log included.
        {
            let mut guard = lock(&shared);
            if guard.generation != generation {
                debug!(selection = %selection, "discarding stale poll result");
                return;
            }
            guard.state = PollState::Scheduled;
            if let Some(entry) = outcome.power_log {
                spawn_power_log(&ctx, entry);
            }
            ctx.reporter.on_result(outcome.result);
        }
    }
}

fn transition(shared: &Mutex<Shared>, generation: u64, state: PollState) -> bool {
    let mut guard = lock(shared);
    if guard.generation != generation {
        return false;
    }
    guard.state = state;
    true
}

/// What one cycle produced. The power log entry is only sent once the
/// result is known to be current.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub result: PollResult,
    pub power_log: Option<PowerLogEntry>,
}

/// One fetch, estimate, classify pass. Has no side effects besides fetch
/// advisories.
pub async fn cycle(ctx: &PollContext, selection: &Selection) -> CycleOutcome {
    let series = ctx.fetcher.fetch_all(selection).await;
    let rating = ctx.registry.rating(selection);
    let power_w = estimate_from_series(&series.rpm, rating);
    let demand_w = ctx.demand.demand(rating.capacity_w).await;
    let status = ctx.classifier.classify(power_w, demand_w, rating.capacity_w);
    debug!(selection = %selection, power_w, demand_w, %status, "poll cycle complete");

    let power_log = match selection.unit_id() {
        Some(unit_id) if power_w > 0.0 => Some(PowerLogEntry {
            unit_id: unit_id.to_string(),
            current_power: power_w,
            city_demand: demand_w,
        }),
        _ => None,
    };

    CycleOutcome {
        result: PollResult {
            selection: selection.clone(),
            series,
            power_w,
            demand_w,
            capacity_w: rating.capacity_w,
            status,
            produced_at: Utc::now(),
        },
        power_log,
    }
}

/// Best effort; detached from the poll task so teardown does not cancel it.
fn spawn_power_log(ctx: &PollContext, entry: PowerLogEntry) {
    let sink = ctx.power_log.clone();
    let reporter = ctx.reporter.clone();
    tokio::spawn(async move {
        match sink.log_power(&entry).await {
            Ok(()) => debug!(unit = %entry.unit_id, "power log appended"),
            Err(e) => {
                warn!(unit = %entry.unit_id, error = %e, "failed to send power log");
                reporter.on_log_entry(format!("⚠️ {e}"));
            }
        }
    });
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
