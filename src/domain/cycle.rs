use crate::domain::models::{CycleDurations, CycleSnapshot, Phase, Transition, TransitionCause};
use std::fmt;
use std::sync::Arc;

/// Receives a signal each time a phase runs out. Implementations own their
/// failures; nothing is reported back to the controller.
pub trait PhaseNotifier: Send + Sync {
    fn phase_completed(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Counted,
    Completed(Transition),
}

pub struct CycleController {
    durations: CycleDurations,
    phase: Phase,
    remaining: u32,
    running: bool,
    completed_work_units: u32,
    notifier: Arc<dyn PhaseNotifier>,
}

impl fmt::Debug for CycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleController")
            .field("durations", &self.durations)
            .field("phase", &self.phase)
            .field("remaining", &self.remaining)
            .field("running", &self.running)
            .field("completed_work_units", &self.completed_work_units)
            .finish_non_exhaustive()
    }
}

impl CycleController {
    pub fn new(durations: CycleDurations, notifier: Arc<dyn PhaseNotifier>) -> Self {
        Self {
            durations,
            phase: Phase::Work,
            remaining: durations.work_seconds,
            running: false,
            completed_work_units: 0,
            notifier,
        }
    }

    pub fn durations(&self) -> &CycleDurations {
        &self.durations
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        CycleSnapshot {
            phase: self.phase,
            remaining_seconds: self.remaining,
            running: self.running,
            completed_work_units: self.completed_work_units,
        }
    }

    pub fn start(&mut self) -> CycleSnapshot {
        self.running = true;
        self.snapshot()
    }

    pub fn pause(&mut self) -> CycleSnapshot {
        self.running = false;
        self.snapshot()
    }

    pub fn reset(&mut self) -> CycleSnapshot {
        self.pause();
        let phase = match self.phase {
            Phase::Stopped => Phase::Work,
            other => other,
        };
        self.enter(phase);
        self.snapshot()
    }

    /// One elapsed second. Either counts down or, once the countdown already
    /// sits at zero, completes the phase. Does nothing while paused.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.running {
            return TickOutcome::Idle;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return TickOutcome::Counted;
        }
        TickOutcome::Completed(self.complete_phase())
    }

    pub fn skip_to_break(&mut self) -> Option<Transition> {
        if self.phase != Phase::Work {
            return None;
        }
        let elapsed_seconds = self.elapsed_in_phase();
        self.pause();
        self.completed_work_units = self.completed_work_units.saturating_add(1);
        self.enter(self.durations.break_after(self.completed_work_units));
        Some(Transition {
            from: Phase::Work,
            to: self.phase,
            cause: TransitionCause::Skipped,
            elapsed_seconds,
        })
    }

    pub fn skip_to_work(&mut self) -> Transition {
        let from = self.phase;
        let elapsed_seconds = self.elapsed_in_phase();
        self.pause();
        self.enter(Phase::Work);
        Transition {
            from,
            to: Phase::Work,
            cause: TransitionCause::Skipped,
            elapsed_seconds,
        }
    }

    fn complete_phase(&mut self) -> Transition {
        let from = self.phase;
        let elapsed_seconds = self.elapsed_in_phase();
        self.pause();
        self.notifier.phase_completed();

        match from {
            Phase::Work => {
                self.completed_work_units = self.completed_work_units.saturating_add(1);
                self.enter(self.durations.break_after(self.completed_work_units));
            }
            Phase::ShortBreak | Phase::LongBreak => self.enter(Phase::Work),
            Phase::Stopped => {}
        }

        Transition {
            from,
            to: self.phase,
            cause: TransitionCause::Expired,
            elapsed_seconds,
        }
    }

    // phase and remaining always move together
    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.remaining = self.durations.duration_for(phase);
    }

    fn elapsed_in_phase(&self) -> u32 {
        self.durations
            .duration_for(self.phase)
            .saturating_sub(self.remaining)
    }
}
