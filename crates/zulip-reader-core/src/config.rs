use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{DEFAULT_REFRESH_BATCH, DEFAULT_WINDOW_SIZE, REFRESH_INTERVAL_SECS};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    /// Base number of messages a Focus pass wants visible
    pub window_size: usize,
    /// Period of the background refresh timer; zero disables it
    pub refresh_interval: Duration,
    /// Newer messages requested per refresh fetch
    pub refresh_batch: u32,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            window_size: DEFAULT_WINDOW_SIZE,
            refresh_interval: Duration::from_secs(REFRESH_INTERVAL_SECS),
            refresh_batch: DEFAULT_REFRESH_BATCH,
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_refresh_batch(mut self, refresh_batch: u32) -> Self {
        self.refresh_batch = refresh_batch;
        self
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new("zulip_reader_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.window_size, 30);
        assert_eq!(config.refresh_interval, Duration::from_secs(3));
        assert_eq!(config.refresh_batch, 100);
        assert_eq!(config.data_dir, PathBuf::from("zulip_reader_data"));
    }

    #[test]
    fn test_window_size_never_zero() {
        let config = CoreConfig::default().with_window_size(0);
        assert_eq!(config.window_size, 1);
    }
}
