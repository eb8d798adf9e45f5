use crate::infrastructure::config::{ensure_default_configs, load_configs, ConfigBundle};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::history_repository::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "pomocycle.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub config: ConfigBundle,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_configs(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        config_dir,
        logs_dir,
        database_path,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CycleDurations;

    #[test]
    fn bootstrap_creates_layout_and_is_repeatable() {
        let root = std::env::temp_dir().join(format!("pomocycle-bootstrap-tests-{}", std::process::id()));
        let first = bootstrap_workspace(&root).expect("bootstrap");
        assert!(first.config_dir.starts_with(&root));
        assert!(first.config_dir.join("app.json").exists());
        assert!(first.config_dir.join("timer.json").exists());
        assert!(first.logs_dir.is_dir());
        assert!(first.database_path.exists());
        assert_eq!(first.config.timer.durations(), CycleDurations::default());

        let second = bootstrap_workspace(&root).expect("bootstrap again");
        assert_eq!(second.database_path, first.database_path);

        let _ = fs::remove_dir_all(&root);
    }
}
