use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORK_SECONDS: u32 = 25 * 60;
pub const DEFAULT_SHORT_BREAK_SECONDS: u32 = 5 * 60;
pub const DEFAULT_LONG_BREAK_SECONDS: u32 = 15 * 60;
pub const DEFAULT_LONG_BREAK_EVERY: u32 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Work,
    ShortBreak,
    LongBreak,
    Stopped,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::ShortBreak => "short_break",
            Self::LongBreak => "long_break",
            Self::Stopped => "stopped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "work" => Some(Self::Work),
            "short_break" => Some(Self::ShortBreak),
            "long_break" => Some(Self::LongBreak),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    pub fn is_break(self) -> bool {
        matches!(self, Self::ShortBreak | Self::LongBreak)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    Expired,
    Skipped,
}

impl TransitionCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "expired" => Some(Self::Expired),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleDurations {
    pub work_seconds: u32,
    pub short_break_seconds: u32,
    pub long_break_seconds: u32,
    pub long_break_every: u32,
}

impl Default for CycleDurations {
    fn default() -> Self {
        Self {
            work_seconds: DEFAULT_WORK_SECONDS,
            short_break_seconds: DEFAULT_SHORT_BREAK_SECONDS,
            long_break_seconds: DEFAULT_LONG_BREAK_SECONDS,
            long_break_every: DEFAULT_LONG_BREAK_EVERY,
        }
    }
}

impl CycleDurations {
    pub fn validate(&self) -> Result<(), String> {
        if self.work_seconds == 0 {
            return Err("timer.work_seconds must be > 0".to_string());
        }
        if self.short_break_seconds == 0 {
            return Err("timer.short_break_seconds must be > 0".to_string());
        }
        if self.long_break_seconds == 0 {
            return Err("timer.long_break_seconds must be > 0".to_string());
        }
        if self.long_break_every == 0 {
            return Err("timer.long_break_every must be > 0".to_string());
        }
        Ok(())
    }

    /// Stopped has no duration of its own and counts against the work length.
    pub fn duration_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Work | Phase::Stopped => self.work_seconds,
            Phase::ShortBreak => self.short_break_seconds,
            Phase::LongBreak => self.long_break_seconds,
        }
    }

    /// A cadence of zero never earns a long break.
    pub fn break_after(&self, completed_work_units: u32) -> Phase {
        match completed_work_units.checked_rem(self.long_break_every) {
            Some(0) => Phase::LongBreak,
            _ => Phase::ShortBreak,
        }
    }
}

/// Point-in-time copy of the controller state handed to observers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleSnapshot {
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub running: bool,
    pub completed_work_units: u32,
}

impl CycleSnapshot {
    pub fn clock_label(&self) -> String {
        let minutes = self.remaining_seconds / 60;
        let seconds = self.remaining_seconds % 60;
        format!("{minutes:02}:{seconds:02}")
    }

    pub fn progress(&self, durations: &CycleDurations) -> f64 {
        let total = durations.duration_for(self.phase);
        if total == 0 {
            return 0.0;
        }
        let remaining = self.remaining_seconds.min(total);
        1.0 - f64::from(remaining) / f64::from(total)
    }

    pub fn session_number(&self) -> u32 {
        self.completed_work_units.saturating_add(1)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub cause: TransitionCause,
    pub elapsed_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseRecord {
    pub id: String,
    pub phase: Phase,
    pub cause: TransitionCause,
    pub elapsed_seconds: u32,
    pub completed_work_units: u32,
    pub ended_at: DateTime<Utc>,
}

impl PhaseRecord {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("phase_record.id must not be empty".to_string());
        }
        if self.phase == Phase::Stopped {
            return Err("phase_record.phase must not be stopped".to_string());
        }
        Ok(())
    }
}
