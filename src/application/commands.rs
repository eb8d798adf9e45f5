use crate::application::bootstrap::bootstrap_workspace;
use crate::application::timer::{SnapshotObserver, TimerService};
use crate::domain::models::{CycleDurations, CycleSnapshot, Phase, TransitionCause};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::history_repository::SqlitePhaseHistoryRepository;
use crate::infrastructure::notifier::build_notifier;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    log: Arc<CommandLog>,
    timer: TimerService,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let log = Arc::new(CommandLog::new(&bootstrap.logs_dir));
        let notifier = build_notifier(bootstrap.config.app.notification_command(), Arc::clone(&log));
        let history = Arc::new(SqlitePhaseHistoryRepository::new(&bootstrap.database_path));
        let timer = TimerService::new(
            bootstrap.config.timer.durations(),
            notifier,
            history,
            Arc::clone(&log),
        );

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            log,
            timer,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn set_observer(&self, observer: SnapshotObserver) -> Result<(), InfraError> {
        self.timer.set_observer(observer)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.log.info(command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.log.error(command, message);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerStateResponse {
    pub phase: String,
    pub remaining_seconds: u32,
    pub running: bool,
    pub completed_work_units: u32,
    pub session_number: u32,
    pub clock_label: String,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReflectionLogItem {
    pub id: String,
    pub phase: String,
    pub cause: String,
    pub elapsed_seconds: u32,
    pub completed_work_units: u32,
    pub ended_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReflectionSummaryResponse {
    pub start: String,
    pub end: String,
    pub completed_work_units: u32,
    pub skipped_work_units: u32,
    pub completed_breaks: u32,
    pub total_focus_minutes: u32,
    pub logs: Vec<ReflectionLogItem>,
}

pub fn start_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let snapshot = state.timer.start()?;
    state.log_info(
        "start_timer",
        &format!(
            "running phase={} remaining={}",
            snapshot.phase.as_str(),
            snapshot.remaining_seconds
        ),
    );
    to_timer_state_response(state, &snapshot)
}

pub fn pause_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let snapshot = state.timer.pause()?;
    state.log_info(
        "pause_timer",
        &format!("paused with remaining={}", snapshot.remaining_seconds),
    );
    to_timer_state_response(state, &snapshot)
}

pub fn reset_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let snapshot = state.timer.reset()?;
    state.log_info(
        "reset_timer",
        &format!("reset phase={}", snapshot.phase.as_str()),
    );
    to_timer_state_response(state, &snapshot)
}

pub fn skip_to_break_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let snapshot = state.timer.skip_to_break()?;
    state.log_info(
        "skip_to_break",
        &format!(
            "phase={} completed_work_units={}",
            snapshot.phase.as_str(),
            snapshot.completed_work_units
        ),
    );
    to_timer_state_response(state, &snapshot)
}

pub fn skip_to_work_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let snapshot = state.timer.skip_to_work()?;
    state.log_info("skip_to_work", "switched to work phase");
    to_timer_state_response(state, &snapshot)
}

pub fn get_timer_state_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let snapshot = state.timer.snapshot()?;
    to_timer_state_response(state, &snapshot)
}

pub fn get_reflection_summary_impl(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<ReflectionSummaryResponse, InfraError> {
    let now = Utc::now();
    let start = match start {
        Some(raw) => parse_datetime_input(&raw, "start")?,
        None => start_of_day(now),
    };
    let end = match end {
        Some(raw) => parse_datetime_input(&raw, "end")?,
        None => now,
    };
    if end <= start {
        return Err(InfraError::InvalidInput(
            "end must be greater than start".to_string(),
        ));
    }

    let records = state.timer.history(start, end)?;
    let completed_work_units = records
        .iter()
        .filter(|record| record.phase == Phase::Work && record.cause == TransitionCause::Expired)
        .count() as u32;
    let skipped_work_units = records
        .iter()
        .filter(|record| record.phase == Phase::Work && record.cause == TransitionCause::Skipped)
        .count() as u32;
    let completed_breaks = records
        .iter()
        .filter(|record| record.phase.is_break() && record.cause == TransitionCause::Expired)
        .count() as u32;
    let total_focus_minutes = records
        .iter()
        .filter(|record| record.phase == Phase::Work)
        .map(|record| record.elapsed_seconds)
        .sum::<u32>()
        / 60;

    let logs = records
        .into_iter()
        .map(|record| ReflectionLogItem {
            id: record.id,
            phase: record.phase.as_str().to_string(),
            cause: record.cause.as_str().to_string(),
            elapsed_seconds: record.elapsed_seconds,
            completed_work_units: record.completed_work_units,
            ended_at: record.ended_at.to_rfc3339(),
        })
        .collect::<Vec<_>>();

    Ok(ReflectionSummaryResponse {
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        completed_work_units,
        skipped_work_units,
        completed_breaks,
        total_focus_minutes,
        logs,
    })
}

fn to_timer_state_response(
    state: &AppState,
    snapshot: &CycleSnapshot,
) -> Result<TimerStateResponse, InfraError> {
    let durations: CycleDurations = state.timer.durations()?;
    Ok(TimerStateResponse {
        phase: snapshot.phase.as_str().to_string(),
        remaining_seconds: snapshot.remaining_seconds,
        running: snapshot.running,
        completed_work_units: snapshot.completed_work_units,
        session_number: snapshot.session_number(),
        clock_label: snapshot.clock_label(),
        progress: snapshot.progress(&durations),
    })
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now)
}

fn parse_datetime_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    Err(InfraError::InvalidInput(format!(
        "{field_name} must be RFC3339 or YYYY-MM-DD"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Duration;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomocycle-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn with_timer_config(self, work: u32, short_break: u32, long_break: u32) -> Self {
            let config_dir = self.path.join("config");
            fs::create_dir_all(&config_dir).expect("create config dir");
            fs::write(
                config_dir.join("timer.json"),
                serde_json::json!({
                    "schema": 1,
                    "workSeconds": work,
                    "shortBreakSeconds": short_break,
                    "longBreakSeconds": long_break,
                    "longBreakEvery": 4
                })
                .to_string(),
            )
            .expect("write timer config");
            self
        }

        fn app_state(&self) -> AppState {
            AppState::new(self.path.clone()).expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn fresh_state_is_paused_work() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let response = get_timer_state_impl(&state).expect("state");
        assert_eq!(response.phase, "work");
        assert_eq!(response.remaining_seconds, 1500);
        assert_eq!(response.clock_label, "25:00");
        assert_eq!(response.session_number, 1);
        assert!(!response.running);
        assert!(state.database_path().exists());
        assert!(state.config_dir().join("timer.json").exists());
    }

    #[test]
    fn skip_to_break_from_fresh_work() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let response = skip_to_break_impl(&state).expect("skip");
        assert_eq!(response.phase, "short_break");
        assert_eq!(response.remaining_seconds, 300);
        assert_eq!(response.completed_work_units, 1);
        assert_eq!(response.session_number, 2);

        let summary = get_reflection_summary_impl(&state, None, None).expect("summary");
        assert_eq!(summary.skipped_work_units, 1);
        assert_eq!(summary.completed_work_units, 0);
        assert_eq!(summary.logs.len(), 1);
        assert_eq!(summary.logs[0].cause, "skipped");
    }

    #[tokio::test(start_paused = true)]
    async fn start_pause_and_reset_flow() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let started = start_timer_impl(&state).expect("start");
        assert!(started.running);
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let paused = pause_timer_impl(&state).expect("pause");
        assert_eq!(paused.remaining_seconds, 1498);
        assert_eq!(paused.clock_label, "24:58");
        assert!(!paused.running);

        let reset = reset_timer_impl(&state).expect("reset");
        assert_eq!(reset.remaining_seconds, 1500);
        assert!(!reset.running);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_recorded_in_summary() {
        let workspace = TempWorkspace::new().with_timer_config(2, 1, 3);
        let state = workspace.app_state();

        start_timer_impl(&state).expect("start");
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let response = get_timer_state_impl(&state).expect("state");
        assert_eq!(response.phase, "short_break");
        assert_eq!(response.remaining_seconds, 1);

        let summary = get_reflection_summary_impl(&state, None, None).expect("summary");
        assert_eq!(summary.completed_work_units, 1);
        assert_eq!(summary.logs[0].phase, "work");
        assert_eq!(summary.logs[0].elapsed_seconds, 2);

        let back = skip_to_work_impl(&state).expect("skip to work");
        assert_eq!(back.phase, "work");
        assert_eq!(back.remaining_seconds, 2);
    }

    #[test]
    fn reflection_summary_rejects_inverted_window() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let result = get_reflection_summary_impl(
            &state,
            Some("2026-10-19".to_string()),
            Some("2026-10-18".to_string()),
        );
        assert!(matches!(result, Err(InfraError::InvalidInput(_))));
        assert!(get_reflection_summary_impl(&state, Some("yesterday".to_string()), None).is_err());
    }

    #[test]
    fn command_error_is_logged() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let message = state.command_error(
            "start_timer",
            &InfraError::Runtime("timer requires a tokio runtime".to_string()),
        );
        assert!(message.contains("tokio runtime"));

        let raw = fs::read_to_string(workspace.path.join("logs").join("commands.log"))
            .expect("read command log");
        assert!(raw.contains("\"level\":\"error\""));
        assert!(raw.contains("start_timer"));
    }
}
