pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    get_reflection_summary_impl, get_timer_state_impl, pause_timer_impl, reset_timer_impl,
    skip_to_break_impl, skip_to_work_impl, start_timer_impl, AppState, ReflectionSummaryResponse,
    TimerStateResponse,
};
use clap::Parser;
use domain::models::CycleSnapshot;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Pomodoro work/break cycle timer
#[derive(Debug, Parser)]
#[command(name = "pomocycle", version, about)]
struct Cli {
    /// Workspace holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Start the first work phase right away
    #[arg(long)]
    autostart: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionCommand {
    Start,
    Pause,
    Toggle,
    Reset,
    SkipToBreak,
    SkipToWork,
    Status,
    Summary { start: Option<String>, end: Option<String> },
    Help,
    Quit,
}

impl SessionCommand {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "start" | "s" => Self::Start,
            "pause" | "p" => Self::Pause,
            "toggle" | "t" => Self::Toggle,
            "reset" | "r" => Self::Reset,
            "break" | "b" => Self::SkipToBreak,
            "work" | "w" => Self::SkipToWork,
            "status" => Self::Status,
            "summary" => Self::Summary {
                start: words.next().map(ToOwned::to_owned),
                end: words.next().map(ToOwned::to_owned),
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(format!("unknown command: {other} (try `help`)")),
        };
        Ok(Some(command))
    }
}

const HELP: &str = "commands: start | pause | toggle | reset | break | work | status | summary [start] [end] | quit";

fn start_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    start_timer_impl(state).map_err(|error| state.command_error("start_timer", &error))
}

fn pause_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    pause_timer_impl(state).map_err(|error| state.command_error("pause_timer", &error))
}

fn toggle_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    if get_timer_state(state)?.running {
        pause_timer(state)
    } else {
        start_timer(state)
    }
}

fn reset_timer(state: &AppState) -> Result<TimerStateResponse, String> {
    reset_timer_impl(state).map_err(|error| state.command_error("reset_timer", &error))
}

fn skip_to_break(state: &AppState) -> Result<TimerStateResponse, String> {
    skip_to_break_impl(state).map_err(|error| state.command_error("skip_to_break", &error))
}

fn skip_to_work(state: &AppState) -> Result<TimerStateResponse, String> {
    skip_to_work_impl(state).map_err(|error| state.command_error("skip_to_work", &error))
}

fn get_timer_state(state: &AppState) -> Result<TimerStateResponse, String> {
    get_timer_state_impl(state).map_err(|error| state.command_error("get_timer_state", &error))
}

fn get_reflection_summary(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<ReflectionSummaryResponse, String> {
    get_reflection_summary_impl(state, start, end)
        .map_err(|error| state.command_error("get_reflection_summary", &error))
}

fn render_snapshot(snapshot: &CycleSnapshot) {
    let status = if snapshot.running { "running" } else { "paused" };
    println!(
        "[{}] {} {} (session #{}, completed {})",
        snapshot.phase.as_str(),
        snapshot.clock_label(),
        status,
        snapshot.session_number(),
        snapshot.completed_work_units
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let formatted = serde_json::to_string_pretty(value).map_err(|error| error.to_string())?;
    println!("{formatted}");
    Ok(())
}

fn dispatch(state: &AppState, command: SessionCommand) -> Result<bool, String> {
    match command {
        SessionCommand::Start => start_timer(state).map(|_| ())?,
        SessionCommand::Pause => pause_timer(state).map(|_| ())?,
        SessionCommand::Toggle => toggle_timer(state).map(|_| ())?,
        SessionCommand::Reset => reset_timer(state).map(|_| ())?,
        SessionCommand::SkipToBreak => skip_to_break(state).map(|_| ())?,
        SessionCommand::SkipToWork => skip_to_work(state).map(|_| ())?,
        SessionCommand::Status => print_json(&get_timer_state(state)?)?,
        SessionCommand::Summary { start, end } => {
            print_json(&get_reflection_summary(state, start, end)?)?
        }
        SessionCommand::Help => println!("{HELP}"),
        SessionCommand::Quit => return Ok(false),
    }
    Ok(true)
}

async fn run_session(workspace_root: PathBuf, autostart: bool) -> Result<(), String> {
    let state = AppState::new(workspace_root).map_err(|error| error.to_string())?;
    state
        .set_observer(Arc::new(render_snapshot))
        .map_err(|error| error.to_string())?;
    state.log_info(
        "session",
        &format!(
            "terminal session opened config_dir={} database={}",
            state.config_dir().display(),
            state.database_path().display()
        ),
    );

    println!("{HELP}");
    print_json(&get_timer_state(&state)?)?;
    if autostart {
        start_timer(&state)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.map_err(|error| error.to_string())? {
        let command = match SessionCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        match dispatch(&state, command) {
            Ok(true) => {}
            Ok(false) => break,
            Err(message) => eprintln!("error: {message}"),
        }
    }

    state.log_info("session", "terminal session closed");
    Ok(())
}

pub fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| error.to_string())?;
    runtime.block_on(run_session(workspace_root, cli.autostart))
}
