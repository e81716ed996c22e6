use crate::app_dirs::AppDirs;
use crate::error::ProgressError;
use crate::scoring::Outcome;
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub type Result<T> = std::result::Result<T, ProgressError>;

/// Best and most recent results per task.
pub trait ProgressStore {
    fn get_best(&self, task_id: &str) -> Result<Option<Outcome>>;

    fn get_last(&self, task_id: &str) -> Result<Option<Outcome>>;

    /// Always remembers `outcome` as the latest attempt. Replaces the best
    /// record only when none exists or the star rating is strictly higher;
    /// returns whether it did.
    fn record_if_better(&mut self, outcome: &Outcome) -> Result<bool>;

    fn all_best(&self) -> Result<Vec<Outcome>>;
}

fn improves(existing: Option<&Outcome>, candidate: &Outcome) -> bool {
    existing.map_or(true, |best| candidate.star_rating > best.star_rating)
}

#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    best: HashMap<String, Outcome>,
    last: HashMap<String, Outcome>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn get_best(&self, task_id: &str) -> Result<Option<Outcome>> {
        Ok(self.best.get(task_id).cloned())
    }

    fn get_last(&self, task_id: &str) -> Result<Option<Outcome>> {
        Ok(self.last.get(task_id).cloned())
    }

    fn record_if_better(&mut self, outcome: &Outcome) -> Result<bool> {
        self.last.insert(outcome.task_id.clone(), outcome.clone());
        if improves(self.best.get(&outcome.task_id), outcome) {
            self.best.insert(outcome.task_id.clone(), outcome.clone());
            return Ok(true);
        }
        Ok(false)
    }

    fn all_best(&self) -> Result<Vec<Outcome>> {
        let mut all: Vec<Outcome> = self.best.values().cloned().collect();
        all.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(all)
    }
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS best_results (
        task_id TEXT PRIMARY KEY,
        final_score INTEGER NOT NULL,
        star_rating INTEGER NOT NULL,
        elapsed_secs REAL NOT NULL,
        error_count INTEGER NOT NULL,
        completed_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL,
        final_score INTEGER NOT NULL,
        star_rating INTEGER NOT NULL,
        elapsed_secs REAL NOT NULL,
        error_count INTEGER NOT NULL,
        completed_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_attempts_task ON attempts(task_id);
"#;

const COLUMNS: &str = "task_id, final_score, star_rating, elapsed_secs, error_count, completed_at";

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<Outcome> {
    let completed_at: String = row.get(5)?;
    let completed_at = DateTime::parse_from_rfc3339(&completed_at)
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                5,
                "completed_at".to_string(),
                rusqlite::types::Type::Text,
            )
        })?
        .with_timezone(&Local);

    Ok(Outcome {
        task_id: row.get(0)?,
        final_score: row.get(1)?,
        star_rating: row.get(2)?,
        elapsed_secs: row.get(3)?,
        error_count: row.get(4)?,
        completed_at,
    })
}

/// SQLite-backed progress under `$HOME/.local/state/mousedrill`.
#[derive(Debug)]
pub struct SqliteProgressStore {
    conn: Connection,
}

impl SqliteProgressStore {
    pub fn open_default() -> Result<Self> {
        Self::open(AppDirs::db_path())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "opening progress database");
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Every recorded attempt, oldest first.
    pub fn attempts(&self) -> Result<Vec<Outcome>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM attempts ORDER BY id"))?;
        let rows = stmt.query_map([], outcome_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Write the attempt history as CSV.
    pub fn export_csv<W: std::io::Write>(&self, writer: W) -> Result<usize> {
        let attempts = self.attempts()?;
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            "task_id",
            "final_score",
            "star_rating",
            "elapsed_secs",
            "error_count",
            "completed_at",
        ])?;
        for a in &attempts {
            csv.write_record([
                a.task_id.clone(),
                a.final_score.to_string(),
                a.star_rating.to_string(),
                format!("{:.2}", a.elapsed_secs),
                a.error_count.to_string(),
                a.completed_at.to_rfc3339(),
            ])?;
        }
        csv.flush()?;
        Ok(attempts.len())
    }
}

impl ProgressStore for SqliteProgressStore {
    fn get_best(&self, task_id: &str) -> Result<Option<Outcome>> {
        let outcome = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM best_results WHERE task_id = ?1"),
                [task_id],
                outcome_from_row,
            )
            .optional()?;
        Ok(outcome)
    }

    fn get_last(&self, task_id: &str) -> Result<Option<Outcome>> {
        let outcome = self
            .conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM attempts WHERE task_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                [task_id],
                outcome_from_row,
            )
            .optional()?;
        Ok(outcome)
    }

    fn record_if_better(&mut self, outcome: &Outcome) -> Result<bool> {
        let existing = self.get_best(&outcome.task_id)?;
        let replace = improves(existing.as_ref(), outcome);
        let completed_at = outcome.completed_at.to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("INSERT INTO attempts ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                outcome.task_id,
                outcome.final_score,
                outcome.star_rating,
                outcome.elapsed_secs,
                outcome.error_count,
                completed_at,
            ],
        )?;
        if replace {
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO best_results ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    outcome.task_id,
                    outcome.final_score,
                    outcome.star_rating,
                    outcome.elapsed_secs,
                    outcome.error_count,
                    completed_at,
                ],
            )?;
        }
        tx.commit()?;

        debug!(task = %outcome.task_id, stars = outcome.star_rating, replace, "recorded outcome");
        Ok(replace)
    }

    fn all_best(&self) -> Result<Vec<Outcome>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM best_results ORDER BY task_id"
        ))?;
        let rows = stmt.query_map([], outcome_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn outcome(task_id: &str, stars: u8, score: u32) -> Outcome {
        Outcome {
            task_id: task_id.to_string(),
            final_score: score,
            star_rating: stars,
            elapsed_secs: 12.5,
            error_count: 1,
            completed_at: Local::now(),
        }
    }

    fn check_best_only_improves(store: &mut dyn ProgressStore) {
        assert!(store.get_best("click_01").unwrap().is_none());

        assert!(store.record_if_better(&outcome("click_01", 4, 75)).unwrap());
        assert!(!store.record_if_better(&outcome("click_01", 3, 55)).unwrap());
        assert_eq!(store.get_best("click_01").unwrap().unwrap().star_rating, 4);
        assert_eq!(store.get_last("click_01").unwrap().unwrap().star_rating, 3);

        // ties keep the existing record
        assert!(!store.record_if_better(&outcome("click_01", 4, 88)).unwrap());
        assert_eq!(store.get_best("click_01").unwrap().unwrap().final_score, 75);

        assert!(store.record_if_better(&outcome("click_01", 5, 95)).unwrap());
        assert_eq!(store.get_best("click_01").unwrap().unwrap().star_rating, 5);
    }

    #[test]
    fn memory_store_keeps_best() {
        check_best_only_improves(&mut MemoryProgressStore::new());
    }

    #[test]
    fn sqlite_store_keeps_best() {
        check_best_only_improves(&mut SqliteProgressStore::in_memory().unwrap());
    }

    #[test]
    fn three_stars_replaced_by_five() {
        let mut store = SqliteProgressStore::in_memory().unwrap();
        store.record_if_better(&outcome("hover_01", 3, 55)).unwrap();
        assert!(store.record_if_better(&outcome("hover_01", 5, 92)).unwrap());
        assert_eq!(store.get_best("hover_01").unwrap().unwrap().final_score, 92);
    }

    #[test]
    fn sqlite_store_persists_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("progress.db");
        {
            let mut store = SqliteProgressStore::open(&path).unwrap();
            store.record_if_better(&outcome("trace_star", 2, 40)).unwrap();
        }
        let store = SqliteProgressStore::open(&path).unwrap();
        let best = store.get_best("trace_star").unwrap().unwrap();
        assert_eq!(best.star_rating, 2);
        assert_eq!(best.elapsed_secs, 12.5);
        assert_eq!(store.all_best().unwrap().len(), 1);
    }

    #[test]
    fn all_best_sorted_by_task() {
        let mut store = SqliteProgressStore::in_memory().unwrap();
        store.record_if_better(&outcome("trace_circle", 2, 40)).unwrap();
        store.record_if_better(&outcome("click_01", 4, 80)).unwrap();
        let ids: Vec<String> = store.all_best().unwrap().into_iter().map(|o| o.task_id).collect();
        assert_eq!(ids, vec!["click_01", "trace_circle"]);
    }

    #[test]
    fn export_writes_every_attempt() {
        let mut store = SqliteProgressStore::in_memory().unwrap();
        store.record_if_better(&outcome("click_01", 4, 80)).unwrap();
        store.record_if_better(&outcome("click_01", 2, 35)).unwrap();

        let mut buf = Vec::new();
        assert_eq!(store.export_csv(&mut buf).unwrap(), 2);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("task_id,final_score"));
        assert!(lines[2].starts_with("click_01,35,2,12.50,1,"));
    }
}
