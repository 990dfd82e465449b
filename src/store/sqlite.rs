use std::fs;
use std::path::Path;
use std::time::Duration;
use log::debug;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use crate::scanner::selector::LastKnownCommit;
use super::{MetricRow, MetricStore, StoreResult};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        debug!("Opened metric store at {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Total rows stored for a repository
    pub fn count_rows(&self, repo_id: i64) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM metrics WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl MetricStore for SqliteStore {
    fn get_repo_id(&self, owner: &str, name: &str) -> StoreResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO repositories (owner, name) VALUES (?1, ?2)",
            params![owner, name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM repositories WHERE owner = ?1 AND name = ?2",
            params![owner, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_last_commit(&self, repo_id: i64) -> StoreResult<Option<LastKnownCommit>> {
        let conn = self.conn.lock();
        let last = conn
            .query_row(
                "SELECT commit_id, commit_date FROM metrics
                 WHERE repo_id = ?1
                 ORDER BY commit_date DESC, rowid DESC
                 LIMIT 1",
                params![repo_id],
                |row| {
                    Ok(LastKnownCommit {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(last)
    }

    fn get_rows_up_to(&self, repo_id: i64, timestamp: i64) -> StoreResult<Vec<MetricRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT repo_id, commit_id, commit_date, file_extension, metric, value
             FROM metrics
             WHERE repo_id = ?1 AND commit_date <= ?2
             ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map(params![repo_id, timestamp], |row| {
                Ok(MetricRow {
                    repo_id: row.get(0)?,
                    commit_id: row.get(1)?,
                    commit_date: row.get(2)?,
                    file_extension: row.get(3)?,
                    metric: row.get(4)?,
                    value: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_rows_if_absent(&self, rows: &[MetricRow]) -> StoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO metrics
                 (repo_id, commit_id, commit_date, file_extension, metric, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for row in rows {
                inserted += stmt.execute(params![
                    row.repo_id,
                    row.commit_id,
                    row.commit_date,
                    row.file_extension,
                    row.metric,
                    row.value,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Inserted {} of {} metric rows", inserted, rows.len());
        Ok(inserted)
    }
}

fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE (owner, name)
        );

        CREATE TABLE IF NOT EXISTS metrics (
            repo_id INTEGER NOT NULL REFERENCES repositories(id),
            commit_id TEXT NOT NULL,
            commit_date INTEGER NOT NULL,
            file_extension TEXT NOT NULL,
            metric TEXT NOT NULL,
            value REAL NOT NULL,
            UNIQUE (repo_id, commit_id, file_extension, metric)
        );

        CREATE INDEX IF NOT EXISTS metrics_repo_date ON metrics (repo_id, commit_date);
        "#,
    )?;

    Ok(())
}
