//! Application-wide constants
//!
//! Centralized location for window sizes, cursor keys and placeholder
//! strings shared by the feed engine, the store and the network client.

/// Number of messages a Focus pass wants visible, and the extra amount
/// every ScrollUp asks for on top of what is already shown.
pub const DEFAULT_WINDOW_SIZE: usize = 30;

/// Background refresh timer period.
pub const REFRESH_INTERVAL_SECS: u64 = 3;

/// How many newer messages a single refresh fetch asks the server for.
pub const DEFAULT_REFRESH_BATCH: u32 = 100;

// Persisted cursor keys
pub const CURSOR_HOME_MIN: &str = "homeMin";
pub const CURSOR_HOME_MAX: &str = "homeMax";
/// Prefix for per-narrow lower-bound cursors; the narrow's cache key follows.
pub const CURSOR_NARROW_PREFIX: &str = "narrow:";

// Placeholder shown when a Focus finds nothing
pub const EMPTY_FEED_TEXT: &str = "No messages found. Start a conversation!";
pub const DEFAULT_TOPIC: &str = "new topic";

/// Zulip flag marking a message that mentions the current user
pub const FLAG_MENTIONED: &str = "mentioned";
