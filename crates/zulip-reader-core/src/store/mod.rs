pub mod db;

pub use db::Database;

use crate::constants::{CURSOR_HOME_MAX, CURSOR_HOME_MIN, CURSOR_NARROW_PREFIX};
use crate::error::Result;
use crate::models::Message;

/// Local message storage. Writes are append-only; a message id is stored
/// at most once and never rewritten.
pub trait MessageStore: Send + Sync {
    /// Messages with `lower <= id <= upper`, ascending by id
    fn query(&self, lower: u64, upper: u64) -> Result<Vec<Message>>;

    /// Returns how many of `messages` were new
    fn insert_messages(&self, messages: &[Message]) -> Result<usize>;

    fn message_count(&self) -> Result<usize>;

    fn clear_messages(&self) -> Result<()>;
}

/// Persisted fetch cursors: the global `homeMin`/`homeMax` bounds and one
/// lower-bound cursor per narrow cache key.
///
/// Read when resolving query bounds; written only after a successful fetch.
pub trait CursorStore: Send + Sync {
    fn cursor(&self, key: &str) -> Result<Option<u64>>;

    fn set_cursor(&self, key: &str, value: u64) -> Result<()>;

    fn clear_cursors(&self) -> Result<()>;

    fn home_min(&self) -> Result<Option<u64>> {
        self.cursor(CURSOR_HOME_MIN)
    }

    fn home_max(&self) -> Result<Option<u64>> {
        self.cursor(CURSOR_HOME_MAX)
    }

    fn set_home_min(&self, value: u64) -> Result<()> {
        self.set_cursor(CURSOR_HOME_MIN, value)
    }

    fn set_home_max(&self, value: u64) -> Result<()> {
        self.set_cursor(CURSOR_HOME_MAX, value)
    }

    fn narrow_cursor(&self, cache_key: &str) -> Result<Option<u64>> {
        self.cursor(&format!("{}{}", CURSOR_NARROW_PREFIX, cache_key))
    }

    fn set_narrow_cursor(&self, cache_key: &str, value: u64) -> Result<()> {
        self.set_cursor(&format!("{}{}", CURSOR_NARROW_PREFIX, cache_key), value)
    }
}
