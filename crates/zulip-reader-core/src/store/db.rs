use std::collections::BTreeSet;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{FeedError, Result};
use crate::models::{Message, MessageKind};
use crate::store::{CursorStore, MessageStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    sender_full_name TEXT NOT NULL,
    sender_email TEXT NOT NULL,
    kind TEXT NOT NULL,
    recipients TEXT NOT NULL,
    subject TEXT NOT NULL,
    content TEXT NOT NULL,
    mentioned INTEGER NOT NULL,
    avatar_url TEXT
);
CREATE TABLE IF NOT EXISTS cursors (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

/// SQLite-backed message and cursor store.
///
/// A single connection behind a mutex: readers and the fetch writer take
/// turns, so a query issued during a pending insert sees whatever was
/// committed last.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) `<data_dir>/messages.db`.
    ///
    /// Failure here is fatal for the application: without a store no feed
    /// can be materialized.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let path = data_dir.join("messages.db");
        let init_failed = |source: Box<dyn std::error::Error + Send + Sync>| {
            FeedError::StorageInit {
                path: path.clone(),
                source,
            }
        };

        std::fs::create_dir_all(data_dir).map_err(|e| init_failed(e.into()))?;
        let conn = Connection::open(&path).map_err(|e| init_failed(e.into()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| init_failed(e.into()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway store, used in tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(4)?;
    let recipients: String = row.get(5)?;
    let mentioned: i64 = row.get(8)?;

    let recipients: BTreeSet<String> = serde_json::from_str(&recipients).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id: id as u64,
        timestamp: row.get(1)?,
        sender_full_name: row.get(2)?,
        sender_email: row.get(3)?,
        kind: MessageKind::parse(&kind).unwrap_or(MessageKind::Stream),
        recipients,
        subject: row.get(6)?,
        content: row.get(7)?,
        mentioned: mentioned != 0,
        avatar_url: row.get(9)?,
    })
}

impl MessageStore for Database {
    fn query(&self, lower: u64, upper: u64) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, sender_full_name, sender_email, kind, recipients, subject,
                    content, mentioned, avatar_url
             FROM messages WHERE id >= ?1 AND id <= ?2 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![lower as i64, upper as i64], message_from_row)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    fn insert_messages(&self, messages: &[Message]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO messages (id, timestamp, sender_full_name, sender_email,
                     kind, recipients, subject, content, mentioned, avatar_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for message in messages {
                let recipients = serde_json::to_string(&message.recipients)?;
                inserted += stmt.execute(params![
                    message.id as i64,
                    message.timestamp,
                    message.sender_full_name,
                    message.sender_email,
                    message.kind.as_str(),
                    recipients,
                    message.subject,
                    message.content,
                    message.mentioned as i64,
                    message.avatar_url,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn message_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn clear_messages(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM messages", [])?;
        Ok(())
    }
}

impl CursorStore for Database {
    fn cursor(&self, key: &str) -> Result<Option<u64>> {
        let conn = self.conn.lock();
        let value: Option<i64> = conn
            .query_row("SELECT value FROM cursors WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value.map(|v| v as u64))
    }

    fn set_cursor(&self, key: &str, value: u64) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO cursors (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value as i64],
        )?;
        Ok(())
    }

    fn clear_cursors(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM cursors", [])?;
        Ok(())
    }
}
