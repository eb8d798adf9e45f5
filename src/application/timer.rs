use crate::domain::cycle::{CycleController, PhaseNotifier, TickOutcome};
use crate::domain::models::{CycleDurations, CycleSnapshot, Phase, PhaseRecord, Transition};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::history_repository::PhaseHistoryRepository;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);
const TICK_LOG_COMMAND: &str = "tick";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub type SnapshotObserver = Arc<dyn Fn(&CycleSnapshot) + Send + Sync>;

struct TickerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

struct TimerState {
    controller: CycleController,
    ticker: Option<TickerSlot>,
    generation: u64,
}

impl TimerState {
    fn arm(&mut self, runtime: &Handle, shared: Arc<TimerShared>) {
        self.disarm();
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let handle = runtime.spawn(run_ticker(shared, generation));
        self.ticker = Some(TickerSlot { generation, handle });
    }

    fn disarm(&mut self) {
        if let Some(slot) = self.ticker.take() {
            slot.handle.abort();
        }
    }

    fn owns_ticker(&self, generation: u64) -> bool {
        self.ticker
            .as_ref()
            .is_some_and(|slot| slot.generation == generation)
    }
}

struct TimerShared {
    state: Mutex<TimerState>,
    observer: Mutex<Option<SnapshotObserver>>,
    history: Arc<dyn PhaseHistoryRepository>,
    log: Arc<CommandLog>,
}

impl TimerShared {
    fn lock_state(&self) -> Result<MutexGuard<'_, TimerState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::Runtime(format!("timer lock poisoned: {error}")))
    }

    // Called with the state lock held so observers see changes in order.
    fn publish(&self, snapshot: &CycleSnapshot) {
        let observer = match self.observer.lock() {
            Ok(observer) => observer.clone(),
            Err(_) => return,
        };
        if let Some(observer) = observer {
            observer(snapshot);
        }
    }

    /// Appends a history row for a phase that actually ended. Restarting the
    /// current phase and anything involving Stopped leave no trace.
    fn record(&self, transition: &Transition, snapshot: &CycleSnapshot) {
        if transition.from == transition.to || transition.from == Phase::Stopped {
            return;
        }
        let record = PhaseRecord {
            id: next_id("phase"),
            phase: transition.from,
            cause: transition.cause,
            elapsed_seconds: transition.elapsed_seconds,
            completed_work_units: snapshot.completed_work_units,
            ended_at: Utc::now(),
        };
        if let Err(error) = self.history.append(&record) {
            self.log.error(
                "record_phase",
                &format!("failed to record {} phase: {error}", record.phase.as_str()),
            );
        }
    }

    /// A tick from a ticker that has since been replaced or disarmed is
    /// ignored.
    fn tick(&self, generation: u64) -> Result<TickOutcome, InfraError> {
        let mut state = self.lock_state()?;
        if !state.owns_ticker(generation) {
            return Ok(TickOutcome::Idle);
        }
        let outcome = state.controller.tick();
        let snapshot = state.controller.snapshot();
        if let TickOutcome::Completed(transition) = &outcome {
            // the task leaves its loop after this tick
            state.ticker = None;
            self.log.info(
                TICK_LOG_COMMAND,
                &format!(
                    "{} phase expired; next phase {}",
                    transition.from.as_str(),
                    transition.to.as_str()
                ),
            );
            self.record(transition, &snapshot);
        }
        if outcome != TickOutcome::Idle {
            self.publish(&snapshot);
        }
        Ok(outcome)
    }
}

async fn run_ticker(shared: Arc<TimerShared>, generation: u64) {
    let mut ticks = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    loop {
        ticks.tick().await;
        match shared.tick(generation) {
            Ok(TickOutcome::Counted) => {}
            Ok(TickOutcome::Completed(_) | TickOutcome::Idle) => break,
            Err(error) => {
                shared.log.error(TICK_LOG_COMMAND, &error.to_string());
                break;
            }
        }
    }
}

/// Drives one [`CycleController`] from a once-per-second tokio task.
///
/// The controller and the ticker handle share one mutex, and every operation
/// arms or disarms the ticker, records history and notifies the observer
/// before releasing it. The observer therefore must not call back into the
/// service.
pub struct TimerService {
    shared: Arc<TimerShared>,
}

impl TimerService {
    pub fn new(
        durations: CycleDurations,
        notifier: Arc<dyn PhaseNotifier>,
        history: Arc<dyn PhaseHistoryRepository>,
        log: Arc<CommandLog>,
    ) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                state: Mutex::new(TimerState {
                    controller: CycleController::new(durations, notifier),
                    ticker: None,
                    generation: 0,
                }),
                observer: Mutex::new(None),
                history,
                log,
            }),
        }
    }

    pub fn set_observer(&self, observer: SnapshotObserver) -> Result<(), InfraError> {
        let mut slot = self
            .shared
            .observer
            .lock()
            .map_err(|error| InfraError::Runtime(format!("observer lock poisoned: {error}")))?;
        *slot = Some(observer);
        Ok(())
    }

    pub fn durations(&self) -> Result<CycleDurations, InfraError> {
        Ok(*self.shared.lock_state()?.controller.durations())
    }

    pub fn snapshot(&self) -> Result<CycleSnapshot, InfraError> {
        Ok(self.shared.lock_state()?.controller.snapshot())
    }

    pub fn start(&self) -> Result<CycleSnapshot, InfraError> {
        let runtime = Handle::try_current().map_err(|error| {
            InfraError::Runtime(format!("timer requires a tokio runtime: {error}"))
        })?;
        let mut state = self.shared.lock_state()?;
        if state.controller.is_running() {
            return Ok(state.controller.snapshot());
        }
        let snapshot = state.controller.start();
        state.arm(&runtime, Arc::clone(&self.shared));
        self.shared.publish(&snapshot);
        Ok(snapshot)
    }

    pub fn pause(&self) -> Result<CycleSnapshot, InfraError> {
        let mut state = self.shared.lock_state()?;
        let snapshot = state.controller.pause();
        state.disarm();
        self.shared.publish(&snapshot);
        Ok(snapshot)
    }

    pub fn reset(&self) -> Result<CycleSnapshot, InfraError> {
        let mut state = self.shared.lock_state()?;
        let snapshot = state.controller.reset();
        state.disarm();
        self.shared.publish(&snapshot);
        Ok(snapshot)
    }

    pub fn skip_to_break(&self) -> Result<CycleSnapshot, InfraError> {
        let mut state = self.shared.lock_state()?;
        let Some(transition) = state.controller.skip_to_break() else {
            return Ok(state.controller.snapshot());
        };
        let snapshot = state.controller.snapshot();
        state.disarm();
        self.shared.record(&transition, &snapshot);
        self.shared.publish(&snapshot);
        Ok(snapshot)
    }

    pub fn skip_to_work(&self) -> Result<CycleSnapshot, InfraError> {
        let mut state = self.shared.lock_state()?;
        let transition = state.controller.skip_to_work();
        let snapshot = state.controller.snapshot();
        state.disarm();
        self.shared.record(&transition, &snapshot);
        self.shared.publish(&snapshot);
        Ok(snapshot)
    }

    pub fn history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PhaseRecord>, InfraError> {
        self.shared.history.list_between(start, end)
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.disarm();
        }
    }
}
