// Durable append-only message log backed by SQLite

use crate::error::StoreError;
use crate::event::Message;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// The durable message log.
///
/// Ids are assigned from a counter row persisted in the same transaction
/// as each insert, so they stay strictly increasing across restarts and
/// are never reused, including after the highest-id row is deleted.
///
/// A single guarded connection serializes all access: id assignment plus
/// insert is one critical section, and a scan can never observe a
/// half-written row.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    /// Open (or create) the log at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory log, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL,
                nickname TEXT NOT NULL,
                body TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS id_counter (
                slot INTEGER PRIMARY KEY CHECK (slot = 0),
                last_id INTEGER NOT NULL
            );",
        )?;

        // Seed the counter from existing rows when it is absent (first
        // open, or a database created before the counter table existed).
        conn.execute(
            "INSERT OR IGNORE INTO id_counter (slot, last_id)
             VALUES (0, COALESCE((SELECT MAX(id) FROM messages), 0))",
            [],
        )?;

        Ok(())
    }

    /// Append a message: assign the next id, stamp the current time,
    /// persist, and return the stored record.
    pub fn append(&self, nickname: &str, body: &str) -> Result<Message, StoreError> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE id_counter SET last_id = last_id + 1 WHERE slot = 0",
            [],
        )?;
        let id: i64 = tx.query_row(
            "SELECT last_id FROM id_counter WHERE slot = 0",
            [],
            |row| row.get(0),
        )?;

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        tx.execute(
            "INSERT INTO messages (id, created_at, nickname, body)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, timestamp, nickname, body],
        )?;
        tx.commit()?;

        Ok(Message {
            id,
            timestamp,
            nickname: nickname.to_string(),
            body: body.to_string(),
        })
    }

    /// Delete the message with the given id.
    ///
    /// Returns whether a row was actually removed; an absent id is the
    /// "not found" signal, not a storage failure. The id is never
    /// reassigned.
    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let removed = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// All stored messages in ascending id order.
    pub fn scan_all(&self) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, created_at, nickname, body FROM messages ORDER BY id ASC",
        )?;

        let messages = stmt
            .query_map([], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    nickname: row.get(2)?,
                    body: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }
}
