use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const COMMAND_LOG_FILE: &str = "commands.log";

/// JSON-lines log shared by commands, the ticker and notifiers.
#[derive(Debug)]
pub struct CommandLog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl CommandLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join(COMMAND_LOG_FILE),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, command: &str, message: &str) {
        self.append("info", command, message);
    }

    pub fn error(&self, command: &str, message: &str) {
        self.append("error", command, message);
    }

    fn append(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appends_one_json_object_per_line() {
        let dir = std::env::temp_dir().join(format!("pomocycle-log-tests-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create log dir");
        let log = CommandLog::new(&dir);

        log.info("start_timer", "started work phase");
        log.error("pause_timer", "lock poisoned");

        let raw = fs::read_to_string(log.path()).expect("read log");
        let lines = raw
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("json line"))
            .collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[0]["command"], "start_timer");
        assert_eq!(lines[1]["level"], "error");
        assert!(lines[1]["timestamp"].as_str().is_some());

        let _ = fs::remove_dir_all(&dir);
    }
}
