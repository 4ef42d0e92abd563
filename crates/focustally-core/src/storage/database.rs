//! SQLite-backed document store.
//!
//! Provides persistent storage for every document the engine writes:
//! - Topic ledgers and the session log
//! - Daily/weekly/monthly/yearly bucket aggregates
//! - The per-user global rollup

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::document::{DocPath, Document, Patch, WriteMode};
use super::migrations;
use super::store::DocumentStore;
use crate::error::StoreError;

/// SQLite database holding one JSON document per row.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database connection lock poisoned".into()))
    }
}

fn collection_of(path: &DocPath) -> String {
    path.parent().map(|p| p.to_string()).unwrap_or_default()
}

fn decode(path: &str, body: &str) -> Result<Document, StoreError> {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(StoreError::Corrupt {
            path: path.to_string(),
            message: "body is not a JSON object".into(),
        }),
        Err(e) => Err(StoreError::Corrupt {
            path: path.to_string(),
            message: e.to_string(),
        }),
    }
}

fn read(conn: &Connection, path: &DocPath) -> Result<Option<Document>, StoreError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE path = ?1",
            params![path.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| decode(path.as_str(), &b)).transpose()
}

fn write(conn: &Connection, path: &DocPath, doc: &Document) -> Result<(), StoreError> {
    let body = serde_json::to_string(doc).map_err(|e| StoreError::Corrupt {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    conn.execute(
        "INSERT INTO documents (path, collection, body, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(path) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        params![
            path.as_str(),
            collection_of(path),
            body,
            Utc::now().to_rfc3339()
        ],
    )?;
    debug!("wrote {path}");
    Ok(())
}

impl DocumentStore for SqliteStore {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let conn = self.lock()?;
        read(&conn, path)
    }

    fn set(&self, path: &DocPath, patch: &Patch, mode: WriteMode) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut doc = match mode {
            WriteMode::Merge => read(&tx, path)?.unwrap_or_default(),
            WriteMode::Replace => Document::new(),
        };
        patch.apply(&mut doc)?;
        write(&tx, path, &doc)?;
        tx.commit()?;
        Ok(())
    }

    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut doc = read(&tx, path)?.ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        patch.apply(&mut doc)?;
        write(&tx, path, &doc)?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM documents WHERE path = ?1", params![path.as_str()])?;
        Ok(())
    }

    fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT path, body FROM documents WHERE collection = ?1 ORDER BY path",
        )?;
        let rows = stmt.query_map(params![collection.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (raw_path, body) = row?;
            let path = DocPath::parse(&raw_path).map_err(|e| StoreError::Corrupt {
                path: raw_path.clone(),
                message: e.to_string(),
            })?;
            docs.push((path, decode(&raw_path, &body)?));
        }
        Ok(docs)
    }

    fn transaction(
        &self,
        path: &DocPath,
        f: &mut dyn FnMut(Option<&Document>) -> Option<Patch>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = read(&tx, path)?;
        let Some(patch) = f(current.as_ref()) else {
            return Ok(false);
        };
        let mut doc = current.unwrap_or_default();
        patch.apply(&mut doc)?;
        write(&tx, path, &doc)?;
        tx.commit()?;
        Ok(true)
    }
}
