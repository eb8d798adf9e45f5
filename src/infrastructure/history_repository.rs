use crate::domain::models::{Phase, PhaseRecord, TransitionCause};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Fixed-width UTC text so `ended_at` compares lexically in SQL.
fn sortable_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub trait PhaseHistoryRepository: Send + Sync {
    fn append(&self, record: &PhaseRecord) -> Result<(), InfraError>;
    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PhaseRecord>, InfraError>;
}

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqlitePhaseHistoryRepository {
    db_path: PathBuf,
}

impl SqlitePhaseHistoryRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

type HistoryRow = (String, String, String, u32, u32, String);

fn record_from_row(row: HistoryRow) -> Result<PhaseRecord, InfraError> {
    let (id, phase_raw, cause_raw, elapsed_seconds, completed_work_units, ended_at_raw) = row;
    let phase = Phase::parse(&phase_raw).ok_or_else(|| {
        InfraError::InvalidRecord(format!("invalid phase_history.phase '{phase_raw}'"))
    })?;
    let cause = TransitionCause::parse(&cause_raw).ok_or_else(|| {
        InfraError::InvalidRecord(format!("invalid phase_history.cause '{cause_raw}'"))
    })?;
    let ended_at = DateTime::parse_from_rfc3339(&ended_at_raw).map_err(|error| {
        InfraError::InvalidRecord(format!(
            "invalid phase_history.ended_at '{ended_at_raw}': {error}"
        ))
    })?;
    Ok(PhaseRecord {
        id,
        phase,
        cause,
        elapsed_seconds,
        completed_work_units,
        ended_at: ended_at.with_timezone(&Utc),
    })
}

impl PhaseHistoryRepository for SqlitePhaseHistoryRepository {
    fn append(&self, record: &PhaseRecord) -> Result<(), InfraError> {
        record.validate().map_err(InfraError::InvalidRecord)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO phase_history
               (id, phase, cause, elapsed_seconds, completed_work_units, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.phase.as_str(),
                record.cause.as_str(),
                record.elapsed_seconds,
                record.completed_work_units,
                sortable_timestamp(record.ended_at),
            ],
        )?;
        Ok(())
    }

    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PhaseRecord>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, phase, cause, elapsed_seconds, completed_work_units, ended_at
             FROM phase_history
             WHERE ended_at >= ?1 AND ended_at <= ?2
             ORDER BY ended_at ASC",
        )?;
        let rows = statement
            .query_map(params![sortable_timestamp(start), sortable_timestamp(end)], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<Result<Vec<HistoryRow>, _>>()?;

        rows.into_iter().map(record_from_row).collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPhaseHistoryRepository {
    records: Mutex<Vec<PhaseRecord>>,
}

impl PhaseHistoryRepository for InMemoryPhaseHistoryRepository {
    fn append(&self, record: &PhaseRecord) -> Result<(), InfraError> {
        record.validate().map_err(InfraError::InvalidRecord)?;
        let mut records = self
            .records
            .lock()
            .map_err(|error| InfraError::Runtime(format!("phase history lock poisoned: {error}")))?;
        records.push(record.clone());
        Ok(())
    }

    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PhaseRecord>, InfraError> {
        let records = self
            .records
            .lock()
            .map_err(|error| InfraError::Runtime(format!("phase history lock poisoned: {error}")))?;
        Ok(records
            .iter()
            .filter(|record| record.ended_at >= start && record.ended_at <= end)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DATABASE: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_DATABASE.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "pomocycle-history-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("history.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn record(id: &str, phase: Phase, ended_at: &str) -> PhaseRecord {
        PhaseRecord {
            id: id.to_string(),
            phase,
            cause: TransitionCause::Expired,
            elapsed_seconds: 1500,
            completed_work_units: 1,
            ended_at: fixed_time(ended_at),
        }
    }

    #[test]
    fn sqlite_repository_persists_and_filters_by_window() {
        let database = TempDatabase::new();
        let repository = SqlitePhaseHistoryRepository::new(&database.path);

        repository
            .append(&record("phase-1", Phase::Work, "2026-10-18T09:25:00Z"))
            .expect("append first");
        repository
            .append(&record("phase-2", Phase::ShortBreak, "2026-10-19T09:30:00Z"))
            .expect("append second");

        let reopened = SqlitePhaseHistoryRepository::new(&database.path);
        let today = reopened
            .list_between(
                fixed_time("2026-10-19T00:00:00Z"),
                fixed_time("2026-10-19T23:59:59Z"),
            )
            .expect("list");
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].id, "phase-2");
        assert_eq!(today[0].phase, Phase::ShortBreak);
    }

    #[test]
    fn sqlite_window_bounds_are_inclusive_to_the_microsecond() {
        let database = TempDatabase::new();
        let repository = SqlitePhaseHistoryRepository::new(&database.path);
        repository
            .append(&record("at-start", Phase::Work, "2026-10-19T09:00:00Z"))
            .expect("append");
        repository
            .append(&record("inside", Phase::Work, "2026-10-19T09:30:00.250Z"))
            .expect("append");
        repository
            .append(&record("at-end", Phase::Work, "2026-10-19T10:00:00Z"))
            .expect("append");
        repository
            .append(&record("after-end", Phase::Work, "2026-10-19T10:00:00.000001Z"))
            .expect("append");

        let records = repository
            .list_between(
                fixed_time("2026-10-19T09:00:00Z"),
                fixed_time("2026-10-19T10:00:00Z"),
            )
            .expect("list");
        let ids = records.iter().map(|record| record.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["at-start", "inside", "at-end"]);
        assert_eq!(records[1].ended_at, fixed_time("2026-10-19T09:30:00.250Z"));
    }

    #[test]
    fn sqlite_repository_rejects_duplicate_ids() {
        let database = TempDatabase::new();
        let repository = SqlitePhaseHistoryRepository::new(&database.path);
        let entry = record("phase-1", Phase::Work, "2026-10-19T09:25:00Z");
        repository.append(&entry).expect("append");
        assert!(matches!(repository.append(&entry), Err(InfraError::Sqlite(_))));
    }

    #[test]
    fn repositories_reject_invalid_records() {
        let memory = InMemoryPhaseHistoryRepository::default();
        let invalid = record(" ", Phase::Work, "2026-10-19T09:25:00Z");
        assert!(matches!(memory.append(&invalid), Err(InfraError::InvalidRecord(_))));
    }

    #[test]
    fn in_memory_repository_filters_by_window() {
        let repository = InMemoryPhaseHistoryRepository::default();
        repository
            .append(&record("phase-1", Phase::Work, "2026-10-19T09:25:00Z"))
            .expect("append");
        let records = repository
            .list_between(
                fixed_time("2026-10-19T09:00:00Z"),
                fixed_time("2026-10-19T10:00:00Z"),
            )
            .expect("list");
        assert_eq!(records.len(), 1);
        let none = repository
            .list_between(
                fixed_time("2026-10-20T00:00:00Z"),
                fixed_time("2026-10-21T00:00:00Z"),
            )
            .expect("list");
        assert!(none.is_empty());
    }
}
