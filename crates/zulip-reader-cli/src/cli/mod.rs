pub mod commands;
pub mod config;
pub mod output;
pub mod watch;

pub use commands::WatchCommand;
pub use config::CliConfig;
pub use output::{format_event, format_update};
pub use watch::{run_watch, WatchSession};
