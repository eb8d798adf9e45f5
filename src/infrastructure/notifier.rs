use crate::domain::cycle::PhaseNotifier;
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

const NOTIFY_LOG_COMMAND: &str = "notify";

/// Runs an external program (typically a sound player) without waiting for it.
#[derive(Debug)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
    log: Arc<CommandLog>,
}

impl CommandNotifier {
    pub fn from_parts(parts: Vec<String>, log: Arc<CommandLog>) -> Result<Self, InfraError> {
        let mut parts = parts.into_iter();
        let program = parts
            .next()
            .map(|program| program.trim().to_string())
            .filter(|program| !program.is_empty())
            .ok_or_else(|| {
                InfraError::InvalidConfig("notificationCommand must name a program".to_string())
            })?;
        Ok(Self {
            program,
            args: parts.collect(),
            log,
        })
    }
}

impl PhaseNotifier for CommandNotifier {
    fn phase_completed(&self) {
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => {
                // reap in the background so the tick path never blocks
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(error) => self.log.error(
                NOTIFY_LOG_COMMAND,
                &format!("failed to run {}: {error}", self.program),
            ),
        }
    }
}

#[derive(Debug)]
pub struct BellNotifier {
    log: Arc<CommandLog>,
}

impl BellNotifier {
    pub fn new(log: Arc<CommandLog>) -> Self {
        Self { log }
    }
}

impl PhaseNotifier for BellNotifier {
    fn phase_completed(&self) {
        let mut stderr = std::io::stderr();
        if let Err(error) = stderr.write_all(b"\x07").and_then(|()| stderr.flush()) {
            self.log
                .error(NOTIFY_LOG_COMMAND, &format!("failed to ring terminal bell: {error}"));
        }
    }
}

/// Prefers the configured command and falls back to the terminal bell when
/// it cannot be set up.
pub fn build_notifier(command: Option<Vec<String>>, log: Arc<CommandLog>) -> Arc<dyn PhaseNotifier> {
    let Some(parts) = command else {
        log.info(NOTIFY_LOG_COMMAND, "no notification command configured; using terminal bell");
        return Arc::new(BellNotifier::new(log));
    };

    match CommandNotifier::from_parts(parts, Arc::clone(&log)) {
        Ok(notifier) => {
            log.info(
                NOTIFY_LOG_COMMAND,
                &format!("using notification command {}", notifier.program),
            );
            Arc::new(notifier)
        }
        Err(error) => {
            log.error(
                NOTIFY_LOG_COMMAND,
                &format!("{error}; falling back to terminal bell"),
            );
            Arc::new(BellNotifier::new(log))
        }
    }
}
