use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::Result;

pub fn init_tracing() -> Result<()> {
    init_tracing_with_default("info")
}

/// Install the global subscriber.
///
/// Console output honours `RUST_LOG` (falling back to `default_directive`).
/// Setting `ZULIP_READER_LOG_FILE` adds a debug-level file layer, which is the
/// easiest way to follow lane scheduling while a terminal UI owns stderr.
pub fn init_tracing_with_default(default_directive: &str) -> Result<()> {
    let file_logging = std::env::var("ZULIP_READER_LOG_FILE").ok();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(console_layer);

    if let Some(log_path) = file_logging {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG);

        // try_init so a second call (tests, embedding apps) is not a panic
        let _ = registry.with(file_layer).try_init();
        eprintln!("File logging enabled: {}", log_path);
    } else {
        let _ = registry.try_init();
    }

    Ok(())
}
